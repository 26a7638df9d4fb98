use std::time::Duration;

use thiserror::Error;

/// Error taxonomy shared by every backend adapter and the layers above them.
///
/// Adapters translate their native driver errors into one of these variants
/// before returning, so no driver-specific error type ever crosses the
/// repository boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotesError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Note not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Timed out after {}ms: {operation}", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl NotesError {
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        NotesError::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, NotesError::Connection(_) | NotesError::Timeout { .. })
    }
}

impl From<toml::de::Error> for NotesError {
    fn from(err: toml::de::Error) -> Self {
        NotesError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for NotesError {
    fn from(err: toml::ser::Error) -> Self {
        NotesError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for NotesError {
    fn from(err: serde_json::Error) -> Self {
        NotesError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for notes operations.
pub type Result<T> = std::result::Result<T, NotesError>;
