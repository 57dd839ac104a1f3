use crate::types::LogLevel;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the stderr subscriber
///
/// `RUST_LOG` wins over `--log-level` when set. Stdout is left to tracers
/// running in passthrough mode.
pub fn init(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    // A subscriber may already be installed when embedded; keep that one
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
