use flap_types::SignalTier;
use std::fmt;
use std::path::PathBuf;

/// Result type for flap-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the runtime layer
#[derive(Debug)]
pub enum Error {
    /// Types layer error (session metadata)
    Types(flap_types::Error),

    /// IO operation failed
    Io(std::io::Error),

    /// A tracer could not be started
    Spawn(SpawnError),

    /// A signal could not be delivered to a tracer's process group
    SignalDelivery {
        tracer_id: String,
        tier: SignalTier,
        source: std::io::Error,
    },

    /// Configuration error
    Config(String),

    /// Tracing target is malformed (non-numeric pid, etc.)
    InvalidTarget(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Types(err) => write!(f, "{}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Spawn(err) => write!(f, "Spawn error: {}", err),
            Error::SignalDelivery {
                tracer_id,
                tier,
                source,
            } => write!(
                f,
                "Failed to deliver {} to tracer '{}': {}",
                tier, tracer_id, source
            ),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::InvalidTarget(msg) => write!(f, "Invalid target: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Types(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Spawn(err) => Some(err),
            Error::SignalDelivery { source, .. } => Some(source),
            Error::Config(_) | Error::InvalidTarget(_) => None,
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

impl From<SpawnError> for Error {
    fn from(err: SpawnError) -> Self {
        Error::Spawn(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Reasons a single tracer failed to start
///
/// Fatal to that tracer only; the rest of a batch keeps going.
#[derive(Debug)]
pub enum SpawnError {
    /// Script file does not exist
    ScriptMissing { tracer_id: String, path: PathBuf },

    /// Tracer binary is not a file and not on `PATH`
    BinaryNotFound { tracer_id: String, binary: String },

    /// Another tracer in the session already uses this id
    DuplicateId { tracer_id: String },

    /// The supervisor is already shutting down
    Cancelled { tracer_id: String },

    /// The OS refused to spawn the process or set up its output
    Io {
        tracer_id: String,
        source: std::io::Error,
    },
}

impl SpawnError {
    pub fn tracer_id(&self) -> &str {
        match self {
            SpawnError::ScriptMissing { tracer_id, .. }
            | SpawnError::BinaryNotFound { tracer_id, .. }
            | SpawnError::DuplicateId { tracer_id }
            | SpawnError::Cancelled { tracer_id }
            | SpawnError::Io { tracer_id, .. } => tracer_id,
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::ScriptMissing { tracer_id, path } => write!(
                f,
                "[{}] required script '{}' not found",
                tracer_id,
                path.display()
            ),
            SpawnError::BinaryNotFound { tracer_id, binary } => {
                write!(f, "[{}] tracer binary '{}' not found", tracer_id, binary)
            }
            SpawnError::DuplicateId { tracer_id } => {
                write!(f, "[{}] tracer id already in use", tracer_id)
            }
            SpawnError::Cancelled { tracer_id } => {
                write!(f, "[{}] supervisor is shutting down", tracer_id)
            }
            SpawnError::Io { tracer_id, source } => {
                write!(f, "[{}] failed to spawn: {}", tracer_id, source)
            }
        }
    }
}

impl std::error::Error for SpawnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SpawnError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
