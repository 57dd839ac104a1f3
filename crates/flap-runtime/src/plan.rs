use crate::{Error, Result};
use flap_types::{DEFAULT_TERMINATION_TIMEOUT, TracerSpec};
use std::path::Path;
use std::time::Duration;

/// Tracer ids and the script each one runs, in start order
pub const TRACERS: [(&str, &str); 3] = [
    ("meta_logs", "meta_trace.bt"),
    ("io_logs", "io_trace.bt"),
    ("event_logs", "events_trace.bt"),
];

/// Environment variable bpftrace reads its string size limit from
pub const MAX_STRLEN_ENV: &str = "BPFTRACE_MAX_STRLEN";

/// What a tracing session is attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Launch a command under the tracer
    Execute(String),
    /// Attach to a running process
    Pid(String),
    /// Every process with this command name
    Command(String),
    /// Every process in a cgroup
    Cgroup(String),
    /// Processes in a cgroup filtered by command name
    CgroupCommand { cgroup: String, command: String },
}

impl Target {
    /// Directory under the scripts root holding this target's scripts
    pub fn script_dir_name(&self) -> &'static str {
        match self {
            Target::Execute(_) => "execute",
            Target::Pid(_) => "pid",
            Target::Command(_) => "command",
            Target::Cgroup(_) => "cgroup",
            Target::CgroupCommand { .. } => "cgroup_and_command",
        }
    }

    /// Reject malformed selectors before anything is started
    pub fn validate(&self) -> Result<()> {
        fn numeric(kind: &str, value: &str) -> Result<()> {
            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::InvalidTarget(format!(
                    "{} must be numeric, got '{}'",
                    kind, value
                )));
            }
            Ok(())
        }
        fn non_empty(kind: &str, value: &str) -> Result<()> {
            if value.trim().is_empty() {
                return Err(Error::InvalidTarget(format!("{} must not be empty", kind)));
            }
            Ok(())
        }

        match self {
            Target::Execute(cmd) => non_empty("command to execute", cmd),
            Target::Pid(pid) => numeric("pid", pid),
            Target::Command(name) => non_empty("command name", name),
            Target::Cgroup(cgid) => numeric("cgroup id", cgid),
            Target::CgroupCommand { cgroup, command } => {
                numeric("cgroup id", cgroup)?;
                non_empty("filter command", command)
            }
        }
    }

    fn options(&self) -> Vec<String> {
        match self {
            Target::Execute(cmd) => vec!["-c".to_string(), cmd.clone()],
            _ => Vec::new(),
        }
    }

    fn args(&self) -> Vec<String> {
        match self {
            Target::Execute(_) => Vec::new(),
            Target::Pid(v) | Target::Command(v) | Target::Cgroup(v) => vec![v.clone()],
            Target::CgroupCommand { cgroup, command } => vec![cgroup.clone(), command.clone()],
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Execute(cmd) => write!(f, "execute '{}'", cmd),
            Target::Pid(pid) => write!(f, "pid {}", pid),
            Target::Command(name) => write!(f, "command '{}'", name),
            Target::Cgroup(cgid) => write!(f, "cgroup {}", cgid),
            Target::CgroupCommand { cgroup, command } => {
                write!(f, "cgroup {} filtered by '{}'", cgroup, command)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    pub max_str_len: u32,
    pub termination_timeout: Duration,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            max_str_len: 64,
            termination_timeout: DEFAULT_TERMINATION_TIMEOUT,
        }
    }
}

/// Build the tracer specs for `target` from the scripts under `scripts_dir`
///
/// Script existence is not checked here; a missing script surfaces as a
/// spawn error for that tracer.
pub fn plan_tracers(
    target: &Target,
    scripts_dir: &Path,
    options: &PlanOptions,
) -> Result<Vec<TracerSpec>> {
    target.validate()?;

    let dir = scripts_dir.join(target.script_dir_name());
    let specs = TRACERS
        .iter()
        .map(|(id, script)| {
            TracerSpec::new(*id, dir.join(script))
                .with_options(target.options())
                .with_args(target.args())
                .with_env(MAX_STRLEN_ENV, options.max_str_len.to_string())
                .with_termination_timeout(options.termination_timeout)
        })
        .collect();
    Ok(specs)
}
