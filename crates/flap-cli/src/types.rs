use clap::ValueEnum;
use flap_types::{TimeZoneMode, UnparsedPolicy};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// What to do with lines that are not tracer events
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UnparsedArg {
    /// Copy them to the output unchanged
    Passthrough,
    /// Leave them out
    Drop,
}

impl From<UnparsedArg> for UnparsedPolicy {
    fn from(arg: UnparsedArg) -> Self {
        match arg {
            UnparsedArg::Passthrough => UnparsedPolicy::Passthrough,
            UnparsedArg::Drop => UnparsedPolicy::Drop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TimeZoneArg {
    Local,
    Utc,
}

impl From<TimeZoneArg> for TimeZoneMode {
    fn from(arg: TimeZoneArg) -> Self {
        match arg {
            TimeZoneArg::Local => TimeZoneMode::Local,
            TimeZoneArg::Utc => TimeZoneMode::Utc,
        }
    }
}
