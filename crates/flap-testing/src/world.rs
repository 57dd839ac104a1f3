//! TestWorld pattern for declarative CLI test setup.
//!
//! Provides a fluent interface for:
//! - Creating an isolated directory with fake tracer scripts
//! - Writing a `flap.toml` that runs those scripts with `sh`
//! - Executing the `flap` binary with proper context

use anyhow::Result;
use assert_cmd::Command;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::fixtures;

/// Declarative test environment builder.
///
/// # Example
/// ```no_run
/// use flap_testing::TestWorld;
/// use flap_testing::fixtures::scripts;
///
/// let world = TestWorld::new().with_target_scripts("pid", scripts::EXIT_OK);
///
/// let result = world.run(&["trace", "--pid", "1", "-o", "out"]).unwrap();
/// assert!(result.success());
/// ```
pub struct TestWorld {
    temp_dir: TempDir,
    scripts_dir: PathBuf,
    config_path: PathBuf,
    grace_ms: u64,
    capture_mode: String,
    resolver_command: Option<String>,
    resolver_timeout_ms: u64,
    env_vars: HashMap<String, String>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    /// Create a new isolated test environment.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let scripts_dir = temp_dir.path().join("bpftrace");
        let config_path = temp_dir.path().join("flap.toml");
        std::fs::create_dir_all(&scripts_dir).expect("Failed to create scripts dir");

        let world = Self {
            temp_dir,
            scripts_dir,
            config_path,
            grace_ms: 300,
            capture_mode: "rotate".to_string(),
            resolver_command: None,
            resolver_timeout_ms: 2000,
            env_vars: HashMap::new(),
        };
        world.write_config().expect("Failed to write config");
        world
    }

    /// Root of the test environment; also the working directory of commands.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Install the same fake script for every tracer of a target directory.
    pub fn with_target_scripts(self, target_dir: &str, body: &str) -> Self {
        fixtures::write_target_scripts(&self.scripts_dir, target_dir, body)
            .expect("Failed to write scripts");
        self
    }

    /// Install one fake script.
    pub fn with_script(self, target_dir: &str, name: &str, body: &str) -> Self {
        fixtures::write_script(&self.scripts_dir.join(target_dir), name, body)
            .expect("Failed to write script");
        self
    }

    /// Use `grace_ms` for every shutdown tier.
    pub fn with_grace_ms(mut self, grace_ms: u64) -> Self {
        self.grace_ms = grace_ms;
        self.write_config().expect("Failed to write config");
        self
    }

    pub fn with_capture_mode(mut self, mode: &str) -> Self {
        self.capture_mode = mode.to_string();
        self.write_config().expect("Failed to write config");
        self
    }

    /// Resolve fds by running `program <pid> <fd>` instead of reading `/proc`.
    pub fn with_resolver_command(mut self, program: &str) -> Self {
        self.resolver_command = Some(program.to_string());
        self.write_config().expect("Failed to write config");
        self
    }

    /// Per-lookup limit for the resolver command.
    pub fn with_resolver_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.resolver_timeout_ms = timeout_ms;
        self.write_config().expect("Failed to write config");
        self
    }

    /// Set an environment variable for CLI execution.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    fn write_config(&self) -> Result<()> {
        let mut content = format!(
            r#"[tracer]
binary = "sh"
scripts_dir = "{scripts}"
termination_timeout_ms = {grace}

[supervisor]
interrupt_grace_ms = {grace}
terminate_grace_ms = {grace}
kill_grace_ms = {grace}
poll_interval_ms = 50
shutdown_poll_ms = 50

[capture]
mode = "{mode}"

[decode]
timezone = "utc"
resolver_timeout_ms = {resolver_timeout}
"#,
            scripts = self.scripts_dir.display(),
            grace = self.grace_ms,
            mode = self.capture_mode,
            resolver_timeout = self.resolver_timeout_ms,
        );
        if let Some(program) = &self.resolver_command {
            content.push_str(&format!(
                "resolver = \"command\"\nresolver_command = \"{}\"\n",
                program
            ));
        }
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }

    /// Configure a CLI command with this test environment's settings.
    pub fn configure_command<'a>(&self, cmd: &'a mut Command) -> &'a mut Command {
        cmd.arg("--config").arg(&self.config_path);
        cmd.current_dir(self.root());
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        cmd
    }

    /// Execute the `flap` binary and return the result.
    #[allow(deprecated)]
    pub fn run(&self, args: &[&str]) -> Result<CliResult> {
        let mut cmd = Command::cargo_bin("flap")
            .map_err(|e| anyhow::anyhow!("Failed to find flap binary: {}", e))?;
        self.configure_command(&mut cmd);
        cmd.args(args);

        let output = cmd.output()?;
        Ok(CliResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Result of a CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    pub status: std::process::ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CliResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }
}
