//! The remote-operation seam
//!
//! Everything the bridge knows about the remote side goes through the
//! `RemoteService` and `Connector` traits defined here. The probe engine and
//! the request retry proxy are written against these traits; the concrete
//! MCP binding in the `mcp` module implements them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::transport::TransportDescriptor;

/// Classification of remote failures for retry logic
///
/// The first seven kinds form the fixed transient set: these, and only
/// these, are ever retried. Everything else propagates on first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Timed out establishing the connection
    ConnectTimeout,
    /// Timed out waiting for response data
    ReadTimeout,
    /// Timed out waiting for a connection from the pool
    PoolTimeout,
    /// Failed to establish the connection
    ConnectError,
    /// Failed reading from an established connection
    ReadError,
    /// Failed writing to an established connection
    WriteError,
    /// The remote side violated the expected streaming protocol
    RemoteProtocol,
    /// Protocol-level application error reported by the remote side
    Application,
    /// The enclosing call was cancelled
    Cancelled,
    /// Anything else
    Other,
}

impl ErrorClass {
    /// Check if this failure kind is in the transient set
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorClass::ConnectTimeout
                | ErrorClass::ReadTimeout
                | ErrorClass::PoolTimeout
                | ErrorClass::ConnectError
                | ErrorClass::ReadError
                | ErrorClass::WriteError
                | ErrorClass::RemoteProtocol
        )
    }
}

/// Failure surfaced by a remote session
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("connect timeout: {0}")]
    ConnectTimeout(String),

    #[error("read timeout: {0}")]
    ReadTimeout(String),

    #[error("connection pool exhausted: {0}")]
    PoolTimeout(String),

    #[error("connect error: {0}")]
    Connect(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    /// The remote endpoint does not speak the expected streaming flavor,
    /// or broke framing mid-stream
    #[error("remote protocol error: {0}")]
    Protocol(String),

    /// An error object returned by the remote application itself
    #[error("remote application error {code}: {message}")]
    Application { code: i64, message: String },

    /// An HTTP status outside the success range
    #[error("unexpected HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("remote call cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RemoteError {
    /// Classify this error for retry decisions
    pub fn class(&self) -> ErrorClass {
        match self {
            RemoteError::ConnectTimeout(_) => ErrorClass::ConnectTimeout,
            RemoteError::ReadTimeout(_) => ErrorClass::ReadTimeout,
            RemoteError::PoolTimeout(_) => ErrorClass::PoolTimeout,
            RemoteError::Connect(_) => ErrorClass::ConnectError,
            RemoteError::Read(_) => ErrorClass::ReadError,
            RemoteError::Write(_) => ErrorClass::WriteError,
            RemoteError::Protocol(_) => ErrorClass::RemoteProtocol,
            RemoteError::Application { .. } | RemoteError::Status { .. } => ErrorClass::Application,
            RemoteError::Cancelled => ErrorClass::Cancelled,
            RemoteError::Other(_) => ErrorClass::Other,
        }
    }

    /// Check if this error should trigger a retry
    pub fn is_transient(&self) -> bool {
        self.class().is_transient()
    }
}

/// One operation the remote side currently offers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        rename = "inputSchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub input_schema: Option<Value>,
}

/// An arbitrary remote call forwarded through the bridge
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: String,
    pub params: Option<Value>,
}

impl RemoteRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// The remote-operation surface republished by the bridge
///
/// `open`/`close` manage the single underlying network session; the other
/// methods issue calls on it. Implementations use interior mutability so a
/// session handle can be shared behind a trait object.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Open the underlying network session
    async fn open(&self) -> Result<(), RemoteError>;

    /// Close the underlying network session
    async fn close(&self) -> Result<(), RemoteError>;

    /// Enumerate the operations the remote side currently offers
    async fn list_capabilities(&self) -> Result<Vec<Capability>, RemoteError>;

    /// Issue an arbitrary remote call
    async fn invoke(&self, request: RemoteRequest) -> Result<Value, RemoteError>;
}

/// Produces a session handle for a transport descriptor
///
/// Construction performs no network I/O; the first `open` on the returned
/// service does.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        descriptor: &TransportDescriptor,
    ) -> Result<Box<dyn RemoteService>, RemoteError>;
}
