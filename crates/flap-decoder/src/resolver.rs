use flap_types::UNKNOWN_PATH;
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// How long a helper may run before its lookup counts as failed
pub const DEFAULT_RESOLVER_TIMEOUT: Duration = Duration::from_secs(2);

/// Side-channel lookup of the path behind a process's file descriptor
///
/// `None` means the lookup failed; callers turn that into `UNKNOWN`.
pub trait FdResolver: Send {
    fn resolve(&mut self, pid: u32, fd: &str) -> Option<String>;
}

impl<F> FdResolver for F
where
    F: FnMut(u32, &str) -> Option<String> + Send,
{
    fn resolve(&mut self, pid: u32, fd: &str) -> Option<String> {
        self(pid, fd)
    }
}

/// Reads the `/proc/<pid>/fd/<fd>` symlink
#[derive(Debug, Clone)]
pub struct ProcFdResolver {
    proc_root: PathBuf,
}

impl Default for ProcFdResolver {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl ProcFdResolver {
    /// Resolve against another procfs mount, e.g. a host's `/proc` in a container
    pub fn with_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl FdResolver for ProcFdResolver {
    fn resolve(&mut self, pid: u32, fd: &str) -> Option<String> {
        let link = self.proc_root.join(pid.to_string()).join("fd").join(fd);
        std::fs::read_link(&link)
            .ok()
            .map(|target| target.to_string_lossy().into_owned())
    }
}

/// Runs `<helper> <pid> <fd>` and takes the trimmed first stdout line
///
/// A helper still running after the timeout is killed and the lookup fails.
#[derive(Debug, Clone)]
pub struct CommandResolver {
    program: PathBuf,
    timeout: Duration,
}

impl CommandResolver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_RESOLVER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl FdResolver for CommandResolver {
    fn resolve(&mut self, pid: u32, fd: &str) -> Option<String> {
        let spawned = Command::new(&self.program)
            .arg(pid.to_string())
            .arg(fd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!("fd helper {} failed: {}", self.program.display(), e);
                return None;
            }
        };

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                tracing::warn!(
                    "fd helper {} timed out after {:?} for pid {} fd {}",
                    self.program.display(),
                    self.timeout,
                    pid,
                    fd
                );
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
            Err(e) => {
                tracing::debug!("waiting for fd helper {} failed: {}", self.program.display(), e);
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
        };
        if !status.success() {
            return None;
        }

        let mut stdout = Vec::new();
        child.stdout.take()?.read_to_end(&mut stdout).ok()?;

        String::from_utf8_lossy(&stdout)
            .lines()
            .next()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(str::to_string)
    }
}

/// Memoizes `(pid, fd)` lookups for one decode run
///
/// Entries are written once and never invalidated, failures included. A fd
/// reused for another file by the same pid keeps the first path.
pub struct FdPathCache {
    resolver: Box<dyn FdResolver>,
    entries: HashMap<(u32, String), String>,
    lookups: usize,
}

impl FdPathCache {
    pub fn new(resolver: Box<dyn FdResolver>) -> Self {
        Self {
            resolver,
            entries: HashMap::new(),
            lookups: 0,
        }
    }

    /// Path for `(pid, fd)`, or `UNKNOWN` when the lookup fails
    pub fn resolve(&mut self, pid: u32, fd: &str) -> &str {
        let key = (pid, fd.to_string());
        if !self.entries.contains_key(&key) {
            self.lookups += 1;
            let path = self
                .resolver
                .resolve(pid, fd)
                .unwrap_or_else(|| UNKNOWN_PATH.to_string());
            self.entries.insert(key.clone(), path);
        }
        self.entries
            .get(&key)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_PATH)
    }

    /// Number of times the underlying resolver was invoked
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
