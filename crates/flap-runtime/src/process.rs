use crate::error::{Error, Result, SpawnError};
use crate::sink::{OutputSink, pump_lines};
use flap_types::{SignalTier, TracerSpec, TracerState};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Interval used while waiting on a single tracer
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How tracers are launched: which binary, and where their stdout goes
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub binary: String,
    pub sink: OutputSink,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            binary: "bpftrace".to_string(),
            sink: OutputSink::Passthrough,
        }
    }
}

impl LaunchOptions {
    pub fn new(binary: impl Into<String>, sink: OutputSink) -> Self {
        Self {
            binary: binary.into(),
            sink,
        }
    }
}

/// Locate the tracer binary the way a shell would
///
/// Names containing `/` are taken as paths; bare names are searched in `PATH`.
pub fn resolve_binary(binary: &str) -> Option<PathBuf> {
    if binary.is_empty() {
        return None;
    }
    if binary.contains('/') {
        let path = PathBuf::from(binary);
        return is_executable(&path).then_some(path);
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

fn signal_number(tier: SignalTier) -> libc::c_int {
    match tier {
        SignalTier::Interrupt => libc::SIGINT,
        SignalTier::Terminate => libc::SIGTERM,
        SignalTier::Kill => libc::SIGKILL,
    }
}

/// One running tracer, leader of its own process group
///
/// All methods take `&self`; the child handle and state sit behind short-lived
/// locks so the completion loop and the shutdown path can share an instance.
pub struct TracerProcess {
    spec: TracerSpec,
    pid: u32,
    pgid: libc::pid_t,
    child: Mutex<Child>,
    state: Mutex<TracerState>,
    capture: Mutex<Option<JoinHandle<u64>>>,
    started_at: Instant,
}

impl std::fmt::Debug for TracerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracerProcess")
            .field("id", &self.spec.id())
            .field("pid", &self.pid)
            .field("state", &*lock(&self.state))
            .finish()
    }
}

impl TracerProcess {
    /// Validate and spawn the tracer described by `spec`
    ///
    /// A missing script or binary is reported here, before anything is spawned.
    pub fn start(spec: TracerSpec, launch: &LaunchOptions) -> std::result::Result<Self, SpawnError> {
        let tracer_id = spec.id().to_string();

        if !spec.script().is_file() {
            return Err(SpawnError::ScriptMissing {
                tracer_id,
                path: spec.script().to_path_buf(),
            });
        }

        let binary = resolve_binary(&launch.binary).ok_or_else(|| SpawnError::BinaryNotFound {
            tracer_id: tracer_id.clone(),
            binary: launch.binary.clone(),
        })?;

        let line_sink = launch.sink.open(&tracer_id).map_err(|source| SpawnError::Io {
            tracer_id: tracer_id.clone(),
            source,
        })?;

        let mut command = Command::new(&binary);
        command
            .args(spec.command_args())
            .envs(spec.env().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .process_group(0);
        if line_sink.is_some() {
            command.stdout(Stdio::piped());
        } else {
            command.stdout(Stdio::inherit());
        }

        tracing::debug!(
            "[{}] starting tracer: {} {}",
            tracer_id,
            binary.display(),
            spec.command_args().join(" ")
        );

        let mut child = command.spawn().map_err(|source| SpawnError::Io {
            tracer_id: tracer_id.clone(),
            source,
        })?;
        let pid = child.id();

        let capture = match (line_sink, child.stdout.take()) {
            (Some(sink), Some(stdout)) => {
                let id = tracer_id.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("capture-{}", tracer_id))
                    .spawn(move || pump_lines(&id, stdout, sink));
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(source) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(SpawnError::Io { tracer_id, source });
                    }
                }
            }
            _ => None,
        };

        tracing::info!("[{}] started pid {}", tracer_id, pid);

        Ok(Self {
            spec,
            pid,
            pgid: pid as libc::pid_t,
            child: Mutex::new(child),
            state: Mutex::new(TracerState::Spawned),
            capture: Mutex::new(capture),
            started_at: Instant::now(),
        })
    }

    pub fn id(&self) -> &str {
        self.spec.id()
    }

    pub fn spec(&self) -> &TracerSpec {
        &self.spec
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Process group id; equal to the pid since the tracer leads its group
    pub fn pgid(&self) -> libc::pid_t {
        self.pgid
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Non-blocking state check; reaps the child once it has exited
    pub fn poll(&self) -> TracerState {
        let mut child = lock(&self.child);
        self.poll_locked(&mut child)
    }

    fn poll_locked(&self, child: &mut Child) -> TracerState {
        let mut state = lock(&self.state);
        if let TracerState::Exited(_) = *state {
            return *state;
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                let code = exit_code(status);
                tracing::debug!("[{}] exited with code {}", self.spec.id(), code);
                *state = TracerState::Exited(code);
            }
            Ok(None) => {
                if *state == TracerState::Spawned {
                    *state = TracerState::Running;
                }
            }
            Err(e) => {
                tracing::warn!("[{}] failed to poll pid {}: {}", self.spec.id(), self.pid, e);
            }
        }
        *state
    }

    pub fn is_alive(&self) -> bool {
        self.poll().is_alive()
    }

    /// Deliver `tier` to the whole process group
    ///
    /// Returns `Ok(false)` without touching the state when the tracer has
    /// already exited or its group is gone.
    pub fn signal(&self, tier: SignalTier) -> Result<bool> {
        // Holding the child lock keeps the pid from being reaped (and reused)
        // between the liveness check and the kill.
        let mut child = lock(&self.child);
        if !self.poll_locked(&mut child).is_alive() {
            tracing::debug!("[{}] already exited, not sending {}", self.spec.id(), tier);
            return Ok(false);
        }

        let rc = unsafe { libc::killpg(self.pgid, signal_number(tier)) };
        if rc == 0 {
            let mut state = lock(&self.state);
            if state.is_alive() {
                *state = TracerState::SignalSent(tier);
            }
            return Ok(true);
        }

        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            tracing::debug!("[{}] process group {} is gone", self.spec.id(), self.pgid);
            return Ok(false);
        }
        Err(Error::SignalDelivery {
            tracer_id: self.spec.id().to_string(),
            tier,
            source: err,
        })
    }

    /// Wait up to `timeout` for the tracer to exit; `Some(code)` if it did
    pub fn wait(&self, timeout: Duration) -> Option<i32> {
        let deadline = Instant::now() + timeout;
        loop {
            if let TracerState::Exited(code) = self.poll() {
                return Some(code);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            std::thread::sleep(WAIT_POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Stop this tracer alone: terminate, then kill after its grace timeout
    pub fn stop(&self) -> Option<i32> {
        let grace = self.spec.termination_timeout();
        tracing::debug!("[{}] stopping tracer", self.spec.id());

        for tier in [SignalTier::Terminate, SignalTier::Kill] {
            if let Err(e) = self.signal(tier) {
                tracing::warn!("{}", e);
            }
            if let Some(code) = self.wait(grace) {
                return Some(code);
            }
            tracing::debug!("[{}] still alive after {:?}", self.spec.id(), grace);
        }
        None
    }

    /// Wait up to `timeout` for the capture thread to drain and close its sink
    ///
    /// Returns `true` when there is no capture thread left.
    pub fn finish_capture(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = lock(&self.capture);
        let Some(handle) = slot.take() else {
            return true;
        };

        while !handle.is_finished() {
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!("[{}] capture still draining after {:?}", self.spec.id(), timeout);
                *slot = Some(handle);
                return false;
            }
            std::thread::sleep(Duration::from_millis(20).min(deadline - now));
        }

        match handle.join() {
            Ok(lines) => tracing::debug!("[{}] captured {} lines", self.spec.id(), lines),
            Err(_) => tracing::error!("[{}] capture thread panicked", self.spec.id()),
        }
        true
    }
}

impl Drop for TracerProcess {
    fn drop(&mut self) {
        let child = self.child.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Ok(None) = child.try_wait() {
            tracing::warn!("[{}] dropped while alive, killing group {}", self.spec.id(), self.pgid);
            unsafe {
                libc::killpg(self.pgid, libc::SIGKILL);
            }
            let _ = child.wait();
        }
    }
}
