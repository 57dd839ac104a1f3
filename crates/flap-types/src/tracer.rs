use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default grace period a single tracer gets between terminate and kill
pub const DEFAULT_TERMINATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Description of one tracer invocation: `<binary> <options...> <script> <args...>`
///
/// Built once with the `with_*` methods and never mutated afterwards; the
/// supervisor only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerSpec {
    id: String,
    script: PathBuf,
    options: Vec<String>,
    args: Vec<String>,
    env: Vec<(String, String)>,
    termination_timeout: Duration,
}

impl TracerSpec {
    pub fn new(id: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            script: script.into(),
            options: Vec::new(),
            args: Vec::new(),
            env: Vec::new(),
            termination_timeout: DEFAULT_TERMINATION_TIMEOUT,
        }
    }

    /// Append options placed before the script path
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.extend(options.into_iter().map(Into::into));
        self
    }

    /// Append positional arguments placed after the script path
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_termination_timeout(mut self, timeout: Duration) -> Self {
        self.termination_timeout = timeout;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn termination_timeout(&self) -> Duration {
        self.termination_timeout
    }

    /// Full argument vector handed to the tracer binary
    pub fn command_args(&self) -> Vec<String> {
        let mut argv = self.options.clone();
        argv.push(self.script.to_string_lossy().into_owned());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// One step of the shutdown escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalTier {
    Interrupt,
    Terminate,
    Kill,
}

impl SignalTier {
    /// Tiers in escalation order
    pub const ESCALATION: [SignalTier; 3] =
        [SignalTier::Interrupt, SignalTier::Terminate, SignalTier::Kill];

    pub fn name(&self) -> &'static str {
        match self {
            SignalTier::Interrupt => "SIGINT",
            SignalTier::Terminate => "SIGTERM",
            SignalTier::Kill => "SIGKILL",
        }
    }
}

impl fmt::Display for SignalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of a tracer process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "value")]
pub enum TracerState {
    /// Spawned, not yet observed alive by a poll
    Spawned,
    Running,
    /// Alive after the given tier was delivered
    SignalSent(SignalTier),
    /// Exit code; `128 + signo` when terminated by a signal
    Exited(i32),
}

impl TracerState {
    pub fn is_alive(&self) -> bool {
        !matches!(self, TracerState::Exited(_))
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TracerState::Exited(code) => Some(*code),
            _ => None,
        }
    }
}
