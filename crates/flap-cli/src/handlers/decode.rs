use crate::args::DecodeArgs;
use anyhow::Result;
use flap_decoder::{DecodeOptions, DecodedTrace, build_resolver, decode_session_dir};
use flap_runtime::Config;
use std::path::Path;

/// Config `[decode]` section with command-line overrides applied
pub fn decode_options(config: &Config, args: &DecodeArgs) -> DecodeOptions {
    DecodeOptions {
        unparsed: args
            .unparsed
            .map(Into::into)
            .unwrap_or(config.decode.unparsed),
        timezone: args
            .timezone
            .map(Into::into)
            .unwrap_or(config.decode.timezone),
    }
}

pub fn handle(config: &Config, dir: &Path, args: &DecodeArgs) -> Result<Vec<DecodedTrace>> {
    let options = decode_options(config, args);
    let resolver_command = config.decode.resolver_command.as_deref();

    let decoded = decode_session_dir(dir, options, || {
        build_resolver(
            config.decode.resolver,
            resolver_command,
            config.decode.resolver_timeout(),
        )
    })?;

    for trace in &decoded {
        println!(
            "{}: {} event(s) -> {}",
            trace.tracer_id,
            trace.stats.decoded,
            trace.output.display()
        );
    }
    Ok(decoded)
}
