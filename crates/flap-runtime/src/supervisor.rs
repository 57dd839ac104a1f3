use crate::error::SpawnError;
use crate::process::{LaunchOptions, TracerProcess, lock};
use flap_types::{SignalTier, TracerSpec};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::channel;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Grace periods and polling intervals of a supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub interrupt_grace: Duration,
    pub terminate_grace: Duration,
    pub kill_grace: Duration,
    /// Completion loop interval
    pub poll_interval: Duration,
    /// Interval used while waiting out a shutdown tier
    pub shutdown_poll: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interrupt_grace: Duration::from_secs(5),
            terminate_grace: Duration::from_secs(3),
            kill_grace: Duration::from_secs(2),
            poll_interval: Duration::from_millis(200),
            shutdown_poll: Duration::from_millis(100),
        }
    }
}

impl SupervisorConfig {
    pub fn grace(&self, tier: SignalTier) -> Duration {
        match tier {
            SignalTier::Interrupt => self.interrupt_grace,
            SignalTier::Terminate => self.terminate_grace,
            SignalTier::Kill => self.kill_grace,
        }
    }

    /// Upper bound of one full escalation, polling slack excluded
    pub fn escalation_budget(&self) -> Duration {
        self.interrupt_grace + self.terminate_grace + self.kill_grace
    }
}

/// Cloneable handle that requests cancellation of one supervisor
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Result of starting one tracer in a batch
#[derive(Debug)]
pub struct StartOutcome {
    pub tracer_id: String,
    pub result: Result<Arc<TracerProcess>, SpawnError>,
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        self.result.is_ok()
    }
}

/// What happened during one escalation tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierReport {
    pub tier: SignalTier,
    /// Groups that received the signal
    pub signaled: usize,
    /// Deliveries that failed (logged, not retried)
    pub failures: usize,
}

/// Summary of a graceful shutdown
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    /// `false` for callers that found the shutdown already run or running
    pub executed: bool,
    pub tiers: Vec<TierReport>,
    /// Tracers still alive after the last tier, or when a waiting caller gave up
    pub survivors: Vec<String>,
    pub elapsed: Duration,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.survivors.is_empty()
    }

    fn observed(&self) -> Self {
        Self {
            executed: false,
            ..self.clone()
        }
    }
}

/// How `await_completion` ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Every tracer exited on its own
    Finished,
    /// Cancellation was requested and the escalation ran
    Cancelled(ShutdownReport),
}

#[derive(Debug)]
enum ShutdownPhase {
    Idle,
    Running,
    Done(ShutdownReport),
}

/// Owns a set of tracers and the single shutdown sequence that ends them
///
/// Cancellation and the shutdown gate belong to the instance, so independent
/// supervisors in one process never interfere.
pub struct TracerSupervisor {
    config: SupervisorConfig,
    launch: LaunchOptions,
    processes: Mutex<Vec<Arc<TracerProcess>>>,
    cancel: Arc<AtomicBool>,
    shutdown: Mutex<ShutdownPhase>,
    shutdown_done: Condvar,
    signals_sent: AtomicUsize,
}

impl TracerSupervisor {
    pub fn new(config: SupervisorConfig, launch: LaunchOptions) -> Self {
        Self {
            config,
            launch,
            processes: Mutex::new(Vec::new()),
            cancel: Arc::new(AtomicBool::new(false)),
            shutdown: Mutex::new(ShutdownPhase::Idle),
            shutdown_done: Condvar::new(),
            signals_sent: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn launch_options(&self) -> &LaunchOptions {
        &self.launch
    }

    /// Snapshot of every started tracer, in start order
    pub fn processes(&self) -> Vec<Arc<TracerProcess>> {
        lock(&self.processes).clone()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancel),
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Number of successful group signal deliveries so far
    pub fn signals_sent(&self) -> usize {
        self.signals_sent.load(Ordering::SeqCst)
    }

    fn shutdown_started(&self) -> bool {
        !matches!(*lock(&self.shutdown), ShutdownPhase::Idle)
    }

    /// Start every tracer on its own thread and collect the outcomes
    ///
    /// Outcomes come back in input order. A failed start affects only that
    /// tracer; the caller decides what a partial failure means.
    pub fn start_all(&self, specs: Vec<TracerSpec>) -> Vec<StartOutcome> {
        let mut seen: HashSet<String> = self
            .processes()
            .iter()
            .map(|p| p.id().to_string())
            .collect();

        let (tx, rx) = channel();
        let mut ids = Vec::with_capacity(specs.len());
        let mut results: Vec<Option<Result<Arc<TracerProcess>, SpawnError>>> = Vec::new();

        for (index, spec) in specs.into_iter().enumerate() {
            let tracer_id = spec.id().to_string();
            ids.push(tracer_id.clone());
            results.push(None);

            if !seen.insert(tracer_id.clone()) {
                results[index] = Some(Err(SpawnError::DuplicateId { tracer_id }));
                continue;
            }
            if self.is_cancelled() {
                results[index] = Some(Err(SpawnError::Cancelled { tracer_id }));
                continue;
            }

            let tx = tx.clone();
            let launch = self.launch.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("start-{}", tracer_id))
                .spawn(move || {
                    let result = TracerProcess::start(spec, &launch).map(Arc::new);
                    let _ = tx.send((index, result));
                });
            if let Err(source) = spawned {
                results[index] = Some(Err(SpawnError::Io { tracer_id, source }));
            }
        }
        drop(tx);

        for (index, result) in rx {
            results[index] = Some(result);
        }

        let mut started = Vec::new();
        let outcomes: Vec<StartOutcome> = ids
            .into_iter()
            .zip(results)
            .map(|(tracer_id, result)| {
                let result = result.unwrap_or_else(|| {
                    Err(SpawnError::Io {
                        tracer_id: tracer_id.clone(),
                        source: std::io::Error::other("start thread exited without a result"),
                    })
                });
                match &result {
                    Ok(process) => started.push(Arc::clone(process)),
                    Err(e) => tracing::error!("{}", e),
                }
                StartOutcome { tracer_id, result }
            })
            .collect();

        lock(&self.processes).extend(started.iter().cloned());

        // A shutdown that began while these were starting may have missed them.
        if self.shutdown_started() {
            for process in &started {
                tracing::warn!("[{}] started during shutdown, stopping it", process.id());
                process.stop();
            }
        }

        outcomes
    }

    /// Block until every tracer has exited or cancellation is requested
    ///
    /// Cancellation is observed within one poll interval and hands over to
    /// [`graceful_shutdown`](Self::graceful_shutdown).
    pub fn await_completion(&self) -> Completion {
        loop {
            if self.is_cancelled() {
                tracing::info!("Cancellation requested, shutting down tracers");
                return Completion::Cancelled(self.graceful_shutdown());
            }

            let alive = self.processes().iter().filter(|p| p.is_alive()).count();
            if alive == 0 {
                tracing::info!("All tracers exited");
                return Completion::Finished;
            }

            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// Escalate SIGINT → SIGTERM → SIGKILL across every live tracer group
    ///
    /// Runs at most once per supervisor. Concurrent callers wait for the
    /// running sequence (bounded) and get its report with `executed == false`.
    /// A caller that stops waiting gets the tracers alive at that moment as
    /// survivors.
    /// Always returns within the escalation budget plus polling slack.
    pub fn graceful_shutdown(&self) -> ShutdownReport {
        self.cancel();

        {
            let mut phase = lock(&self.shutdown);
            let deadline =
                Instant::now() + self.config.escalation_budget() + self.config.shutdown_poll * 10;
            loop {
                if let ShutdownPhase::Done(report) = &*phase {
                    return report.observed();
                }
                if matches!(*phase, ShutdownPhase::Idle) {
                    *phase = ShutdownPhase::Running;
                    break;
                }

                let now = Instant::now();
                if now >= deadline {
                    let survivors = self.alive_ids();
                    tracing::warn!(
                        "Gave up waiting for the running shutdown, {} tracer(s) still alive",
                        survivors.len()
                    );
                    return ShutdownReport {
                        survivors,
                        ..ShutdownReport::default()
                    };
                }
                phase = match self.shutdown_done.wait_timeout(phase, deadline - now) {
                    Ok((guard, _)) => guard,
                    Err(poisoned) => poisoned.into_inner().0,
                };
            }
        }

        let report = self.escalate();

        *lock(&self.shutdown) = ShutdownPhase::Done(report.clone());
        self.shutdown_done.notify_all();
        report
    }

    fn escalate(&self) -> ShutdownReport {
        let started = Instant::now();
        let mut tiers = Vec::new();

        for tier in SignalTier::ESCALATION {
            let alive: Vec<_> = self
                .processes()
                .into_iter()
                .filter(|p| p.is_alive())
                .collect();
            if alive.is_empty() {
                break;
            }

            tracing::info!("Sending {} to {} tracer(s)", tier, alive.len());
            let mut report = TierReport {
                tier,
                signaled: 0,
                failures: 0,
            };
            for process in &alive {
                match process.signal(tier) {
                    Ok(true) => {
                        report.signaled += 1;
                        self.signals_sent.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        report.failures += 1;
                        tracing::warn!("{}", e);
                    }
                }
            }
            tiers.push(report);

            self.wait_for_exit(&alive, self.config.grace(tier));
        }

        let survivors = self.alive_ids();
        if !survivors.is_empty() {
            tracing::error!(
                "Tracers still alive after SIGKILL: {}",
                survivors.join(", ")
            );
        }

        let elapsed = started.elapsed();
        tracing::info!("Shutdown finished in {:?}", elapsed);
        ShutdownReport {
            executed: true,
            tiers,
            survivors,
            elapsed,
        }
    }

    fn alive_ids(&self) -> Vec<String> {
        self.processes()
            .iter()
            .filter(|p| p.is_alive())
            .map(|p| p.id().to_string())
            .collect()
    }

    fn wait_for_exit(&self, group: &[Arc<TracerProcess>], grace: Duration) {
        let deadline = Instant::now() + grace;
        loop {
            if group.iter().all(|p| !p.is_alive()) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep(self.config.shutdown_poll.min(deadline - now));
        }
    }

    /// 0 when every exited tracer returned 0, else the first non-zero code
    pub fn exit_code(&self) -> i32 {
        self.processes()
            .iter()
            .filter_map(|p| p.poll().exit_code())
            .find(|code| *code != 0)
            .unwrap_or(0)
    }

    /// Drain every capture pump, sharing one overall timeout
    pub fn finish_captures(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.processes().iter().fold(true, |done, p| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            p.finish_capture(remaining) && done
        })
    }
}
