use crate::plan::PlanOptions;
use crate::process::LaunchOptions;
use crate::sink::{CaptureMode, OutputSink};
use crate::supervisor::SupervisorConfig;
use crate::{Error, Result};
use flap_types::{ResolverKind, TimeZoneMode, UnparsedPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "FLAP_CONFIG";

/// Config file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "flap.toml";

/// Resolve the config file path based on priority:
/// 1. Explicit path
/// 2. FLAP_CONFIG environment variable
/// 3. ./flap.toml when it exists
/// 4. flap/config.toml under the user config directory
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(path.to_path_buf());
    }

    if let Some(env_path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(env_path));
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("flap").join("config.toml"))
        .ok_or_else(|| {
            Error::Config("Could not determine config path: no user config directory".to_string())
        })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    pub binary: String,
    pub scripts_dir: PathBuf,
    pub max_str_len: u32,
    pub termination_timeout_ms: u64,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            binary: "bpftrace".to_string(),
            scripts_dir: PathBuf::from("bpftrace"),
            max_str_len: 64,
            termination_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSection {
    pub interrupt_grace_ms: u64,
    pub terminate_grace_ms: u64,
    pub kill_grace_ms: u64,
    pub poll_interval_ms: u64,
    pub shutdown_poll_ms: u64,
    /// Shut everything down when any tracer fails to start
    pub fail_fast: bool,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            interrupt_grace_ms: 5000,
            terminate_grace_ms: 3000,
            kill_grace_ms: 2000,
            poll_interval_ms: 200,
            shutdown_poll_ms: 100,
            fail_fast: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub mode: CaptureMode,
    pub rotate_bytes: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Rotate,
            rotate_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    pub unparsed: UnparsedPolicy,
    pub timezone: TimeZoneMode,
    pub resolver: ResolverKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver_command: Option<PathBuf>,
    /// Per-lookup limit for `resolver_command`
    pub resolver_timeout_ms: u64,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            unparsed: UnparsedPolicy::default(),
            timezone: TimeZoneMode::default(),
            resolver: ResolverKind::default(),
            resolver_command: None,
            resolver_timeout_ms: 2000,
        }
    }
}

impl DecodeConfig {
    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracer: TracerConfig,
    pub supervisor: SupervisorSection,
    pub capture: CaptureConfig,
    pub decode: DecodeConfig,
}

impl Config {
    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.tracer.binary.trim().is_empty() {
            return Err(Error::Config("tracer.binary must not be empty".to_string()));
        }
        if self.capture.mode == CaptureMode::Rotate && self.capture.rotate_bytes == 0 {
            return Err(Error::Config(
                "capture.rotate_bytes must be positive in rotate mode".to_string(),
            ));
        }
        if self.supervisor.poll_interval_ms == 0 || self.supervisor.shutdown_poll_ms == 0 {
            return Err(Error::Config("poll intervals must be positive".to_string()));
        }
        if self.decode.resolver_timeout_ms == 0 {
            return Err(Error::Config(
                "decode.resolver_timeout_ms must be positive".to_string(),
            ));
        }
        if self.decode.resolver == ResolverKind::Command && self.decode.resolver_command.is_none()
        {
            return Err(Error::Config(
                "decode.resolver = \"command\" requires decode.resolver_command".to_string(),
            ));
        }
        Ok(())
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        let s = &self.supervisor;
        SupervisorConfig {
            interrupt_grace: Duration::from_millis(s.interrupt_grace_ms),
            terminate_grace: Duration::from_millis(s.terminate_grace_ms),
            kill_grace: Duration::from_millis(s.kill_grace_ms),
            poll_interval: Duration::from_millis(s.poll_interval_ms),
            shutdown_poll: Duration::from_millis(s.shutdown_poll_ms),
        }
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            max_str_len: self.tracer.max_str_len,
            termination_timeout: Duration::from_millis(self.tracer.termination_timeout_ms),
        }
    }

    /// Launch options writing captures into `output_dir`
    pub fn launch_options(&self, output_dir: &Path) -> LaunchOptions {
        let sink: OutputSink = self
            .capture
            .mode
            .into_sink(output_dir, self.capture.rotate_bytes);
        LaunchOptions::new(self.tracer.binary.clone(), sink)
    }
}
