use std::fmt;

/// Result type for flap-decoder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the decoder layer
///
/// Malformed lines and failed fd lookups are not errors at this level; they
/// degrade to passthrough output and the `UNKNOWN` path respectively.
#[derive(Debug)]
pub enum Error {
    /// Types layer error (session metadata)
    Types(flap_types::Error),

    /// IO operation failed
    Io(std::io::Error),

    /// JSON serialization failed
    Json(serde_json::Error),

    /// Walkdir error
    WalkDir(walkdir::Error),

    /// Session directory lacks `meta.json` or trace files
    InvalidSession(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Types(err) => write!(f, "{}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
            Error::WalkDir(err) => write!(f, "Directory traversal error: {}", err),
            Error::InvalidSession(msg) => write!(f, "Invalid session: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Types(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::InvalidSession(_) => None,
        }
    }
}

impl From<flap_types::Error> for Error {
    fn from(err: flap_types::Error) -> Self {
        Error::Types(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::WalkDir(err)
    }
}

/// Why a raw line could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Line does not have the event structure
    NoMatch,
    /// Structure matched but a numeric field is out of range
    InvalidNumber { field: &'static str, value: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NoMatch => write!(f, "line does not match the event pattern"),
            ParseError::InvalidNumber { field, value } => {
                write!(f, "invalid {} '{}'", field, value)
            }
        }
    }
}

impl std::error::Error for ParseError {}
