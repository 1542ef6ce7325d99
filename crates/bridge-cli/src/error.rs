//! Error types and exit codes for the CLI

use std::io;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for CLI operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error on the local channel
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error from the bridge core library
    #[error("{0}")]
    Core(#[from] bridge_core::Error),

    /// JSON serialization error on the local channel
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{message}")]
    #[allow(dead_code)]
    Other { message: String },
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Core(bridge_core::Error::Configuration { .. }) => 2,
            Self::Core(_) => 1,
            Self::Io(_) => 1,
            Self::Json(_) => 1,
            Self::Other { .. } => 1,
        }
    }
}
