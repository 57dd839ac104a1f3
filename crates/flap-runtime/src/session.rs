use crate::clock::SessionClock;
use crate::config::Config;
use crate::error::SpawnError;
use crate::process::LaunchOptions;
use crate::supervisor::{Completion, ShutdownReport, SupervisorConfig, TracerSupervisor};
use crate::{Error, Result};
use flap_types::{SessionMetadata, TracerSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Exit code reported when tracers could not be started
pub const STARTUP_FAILURE_EXIT_CODE: i32 = 2;

const CAPTURE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a finished session reports back
#[derive(Debug)]
pub struct SessionOutcome {
    pub output_dir: PathBuf,
    pub metadata: SessionMetadata,
    /// Ids of the tracers that started, in start order
    pub started: Vec<String>,
    pub failures: Vec<SpawnError>,
    /// `None` when the session was aborted at startup
    pub completion: Option<Completion>,
    pub shutdown: ShutdownReport,
    pub exit_code: i32,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn was_cancelled(&self) -> bool {
        matches!(self.completion, Some(Completion::Cancelled(_)))
    }
}

/// One tracing run: output directory, reference pair, tracers, shutdown
pub struct TraceSession {
    output_dir: PathBuf,
    clock: SessionClock,
    fail_fast: bool,
    supervisor: Arc<TracerSupervisor>,
}

impl TraceSession {
    pub fn new(output_dir: impl Into<PathBuf>, config: SupervisorConfig, launch: LaunchOptions) -> Self {
        Self {
            output_dir: output_dir.into(),
            clock: SessionClock::default(),
            fail_fast: true,
            supervisor: Arc::new(TracerSupervisor::new(config, launch)),
        }
    }

    pub fn from_config(config: &Config, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        let launch = config.launch_options(&output_dir);
        Self::new(output_dir, config.supervisor_config(), launch)
            .with_fail_fast(config.supervisor.fail_fast)
    }

    pub fn with_clock(mut self, clock: SessionClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Shared handle, e.g. for a signal handler that triggers the shutdown
    pub fn supervisor(&self) -> Arc<TracerSupervisor> {
        Arc::clone(&self.supervisor)
    }

    /// Wipe and recreate the output directory
    pub fn prepare_output_dir(&self) -> Result<()> {
        if self.output_dir.exists() {
            let target = self.output_dir.canonicalize()?;
            let cwd = std::env::current_dir()?.canonicalize()?;
            if target.parent().is_none() || cwd.starts_with(&target) {
                return Err(Error::Config(format!(
                    "refusing to wipe output directory {}",
                    target.display()
                )));
            }
            std::fs::remove_dir_all(&self.output_dir)?;
        }
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// Run the session to completion
    ///
    /// The reference pair is written before any tracer starts. With fail-fast
    /// enabled a partial startup failure stops the tracers that did start.
    pub fn run(&self, specs: Vec<TracerSpec>) -> Result<SessionOutcome> {
        self.prepare_output_dir()?;
        let metadata = self.clock.capture_into(&self.output_dir)?;

        tracing::info!(
            "Starting {} tracer(s), output in {}",
            specs.len(),
            self.output_dir.display()
        );
        let outcomes = self.supervisor.start_all(specs);

        let mut started = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(_) => started.push(outcome.tracer_id),
                Err(e) => failures.push(e),
            }
        }

        let aborted = !failures.is_empty() && (self.fail_fast || started.is_empty());
        let completion = if aborted {
            tracing::error!(
                "{} tracer(s) failed to start, stopping the session",
                failures.len()
            );
            None
        } else {
            Some(self.supervisor.await_completion())
        };

        // Completion-path fallthrough; a no-op when a cancellation already ran it
        let shutdown = self.supervisor.graceful_shutdown();

        if !self.supervisor.finish_captures(CAPTURE_DRAIN_TIMEOUT) {
            tracing::warn!("Some captures did not finish draining");
        }

        let exit_code = if aborted {
            STARTUP_FAILURE_EXIT_CODE
        } else {
            self.supervisor.exit_code()
        };
        tracing::info!("Session finished with exit code {}", exit_code);

        Ok(SessionOutcome {
            output_dir: self.output_dir.clone(),
            metadata,
            started,
            failures,
            completion,
            shutdown,
            exit_code,
        })
    }
}
