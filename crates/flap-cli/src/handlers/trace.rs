use crate::args::DecodeArgs;
use crate::handlers::decode;
use anyhow::{Context, Result};
use flap_runtime::config::Config;
use flap_runtime::{
    CaptureMode, SessionOutcome, Target, TraceSession, TracerSupervisor, plan_tracers,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Exit status when a signal ends `flap` after its tracers are gone
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

pub fn handle(
    config: &Config,
    target: &Target,
    output: &Path,
    no_decode: bool,
    decode_args: &DecodeArgs,
) -> Result<i32> {
    let specs = plan_tracers(target, &config.tracer.scripts_dir, &config.plan_options())?;
    tracing::info!("Tracing {} with {} tracer(s)", target, specs.len());

    let session = TraceSession::from_config(config, output);
    let session_over = Arc::new(AtomicBool::new(false));
    install_shutdown_handler(session.supervisor(), Arc::clone(&session_over))?;

    let outcome = session.run(specs);
    session_over.store(true, Ordering::SeqCst);
    let outcome = outcome?;
    report(&outcome);

    if should_decode(config, &outcome, no_decode) {
        decode::handle(config, output, decode_args)
            .with_context(|| format!("failed to decode {}", output.display()))?;
    }

    Ok(outcome.exit_code)
}

/// SIGINT/SIGTERM cancel the session and run the shutdown escalation
///
/// The handler thread blocks until the escalation finishes. Once the session
/// is over, or on any later signal, there is nothing left to stop gracefully
/// and the process exits instead.
fn install_shutdown_handler(
    supervisor: Arc<TracerSupervisor>,
    session_over: Arc<AtomicBool>,
) -> Result<()> {
    let signals = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        let repeated = signals.fetch_add(1, Ordering::SeqCst) > 0;
        if repeated || session_over.load(Ordering::SeqCst) {
            eprintln!("Interrupted, exiting");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }

        tracing::info!("Interrupted, stopping tracers");
        supervisor.cancel();
        let report = supervisor.graceful_shutdown();
        if !report.is_clean() {
            tracing::error!("{} tracer(s) survived the shutdown", report.survivors.len());
        }
    })
    .context("failed to install signal handler")
}

fn should_decode(config: &Config, outcome: &SessionOutcome, no_decode: bool) -> bool {
    if no_decode || outcome.started.is_empty() || outcome.completion.is_none() {
        return false;
    }
    if config.capture.mode == CaptureMode::Passthrough {
        tracing::info!("Output was not captured, nothing to decode");
        return false;
    }
    true
}

fn report(outcome: &SessionOutcome) {
    for failure in &outcome.failures {
        eprintln!("failed to start tracer: {}", failure);
    }
    if outcome.was_cancelled() {
        eprintln!("Session interrupted");
    }
    if !outcome.shutdown.survivors.is_empty() {
        eprintln!(
            "tracers still running after shutdown: {}",
            outcome.shutdown.survivors.join(", ")
        );
    }
}
