use super::args::{Cli, Commands};
use super::handlers;
use crate::logging;
use anyhow::{Context, Result};
use flap_runtime::Config;
use flap_runtime::config::resolve_config_path;

/// Run one command; the returned code becomes the process exit status
pub fn run(cli: Cli) -> Result<i32> {
    logging::init(cli.log_level);

    let config_path = resolve_config_path(cli.config.as_deref())?;
    let config = Config::load_from(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    tracing::debug!("Using config {}", config_path.display());

    match cli.command {
        Commands::Trace {
            target,
            filter_command,
            output,
            no_decode,
            decode,
        } => {
            let target = target
                .into_target(filter_command)
                .context("no trace target given")?;
            handlers::trace::handle(&config, &target, &output, no_decode, &decode)
        }

        Commands::Decode { dir, decode } => {
            handlers::decode::handle(&config, &dir, &decode)?;
            Ok(0)
        }
    }
}
