//! Error types for the bridge core library
//!
//! Build-time failures (configuration, probing) live here; failures surfaced
//! by a live remote session are `RemoteError` in the `remote` module.

use thiserror::Error;

use crate::remote::RemoteError;
use crate::transport::TransportKind;

/// Main error type for bridge construction and operation
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration inputs, fatal at build time
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Every probe attempt on a transport failed with a transient error
    #[error("unable to establish {kind} connection after {attempts} attempts: {source}")]
    ProbeExhausted {
        kind: TransportKind,
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    /// A non-transient failure observed while probing
    #[error("probe failed: {source}")]
    ProbeFatal {
        #[source]
        source: RemoteError,
    },

    /// Error surfaced by the remote session outside the probe phase
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic internal error with context
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_message() {
        let err = Error::configuration("remote URL missing");
        assert!(err.to_string().contains("remote URL missing"));
    }

    #[test]
    fn test_exhausted_error_names_transport_and_attempts() {
        let err = Error::ProbeExhausted {
            kind: TransportKind::Sse,
            attempts: 3,
            source: RemoteError::ConnectTimeout("connect timed out".to_string()),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("sse"));
        assert!(rendered.contains("3 attempts"));
    }
}
