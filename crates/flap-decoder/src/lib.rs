//! Offline decoding of raw tracer output.
//!
//! Lines are parsed into [`flap_types::RawEvent`]s, file descriptors are
//! resolved to paths through a memoizing [`FdPathCache`], and monotonic
//! timestamps are converted to wall-clock time with the session's reference
//! pair. Output is NDJSON, streamed in input order.

pub mod decoder;
pub mod error;
pub mod parser;
pub mod resolver;
pub mod session;
pub mod timestamp;

pub use decoder::{DecodeOptions, DecodeStats, DecodedLine, EventDecoder};
pub use error::{Error, ParseError, Result};
pub use parser::{parse_attributes, parse_line};
pub use resolver::{
    CommandResolver, DEFAULT_RESOLVER_TIMEOUT, FdPathCache, FdResolver, ProcFdResolver,
};
pub use session::{DecodedTrace, TraceFiles, decode_session_dir, discover_traces};
pub use timestamp::WallClockConverter;

use flap_types::ResolverKind;
use std::path::Path;
use std::time::Duration;

/// Build the resolver selected in configuration
///
/// `Command` without a helper path falls back to reading `/proc`. `timeout`
/// bounds each helper run.
pub fn build_resolver(
    kind: ResolverKind,
    helper: Option<&Path>,
    timeout: Duration,
) -> Box<dyn FdResolver> {
    match (kind, helper) {
        (ResolverKind::Command, Some(helper)) => {
            Box::new(CommandResolver::new(helper).with_timeout(timeout))
        }
        (ResolverKind::Command, None) => {
            tracing::warn!("No fd resolver command configured, reading /proc instead");
            Box::new(ProcFdResolver::default())
        }
        (ResolverKind::Proc, _) => Box::new(ProcFdResolver::default()),
    }
}
