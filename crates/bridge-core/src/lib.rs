//! Bridge Core - resilient remote-connection engine for mcp-bridge
//!
//! This crate turns a flaky remote streaming MCP endpoint into one validated,
//! self-healing handle a local front end can republish.
//!
//! # Main Components
//!
//! - **Header resolution**: JSON template, `${NAME}` environment
//!   substitution, explicit overrides
//! - **Probe engine**: connection validation with exponential backoff and a
//!   one-shot SSE to streamable-HTTP fallback
//! - **Request retry proxy**: transparent re-issue of individual calls on
//!   transient network failure
//! - **MCP binding**: a narrow reqwest-based JSON-RPC client behind the
//!   `RemoteService`/`Connector` seam
//!
//! # Example
//!
//! ```no_run
//! use bridge_core::{assemble, mcp::HttpConnector, BridgeOptions, RemoteService};
//!
//! async fn example() -> bridge_core::Result<()> {
//!     let options = BridgeOptions {
//!         url: Some("https://example.com/sse".to_string()),
//!         ..Default::default()
//!     };
//!     let handle = assemble(&options, &HttpConnector::new()).await?;
//!     let tools = handle.list_capabilities().await?;
//!     println!("{} tools", tools.len());
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod bridge;
pub mod error;
pub mod headers;
pub mod mcp;
pub mod options;
pub mod probe;
pub mod proxy_env;
pub mod remote;
pub mod retry;
pub mod transport;

// Re-export main types for convenience
pub use backoff::BackoffPolicy;
pub use bridge::assemble;
pub use error::{Error, Result};
pub use headers::{resolve_headers, HeaderSet};
pub use options::{BridgeOptions, RetrySettings, TransportChoice, REMOTE_URL_ENV};
pub use probe::{probe, ProbeRetryEngine};
pub use remote::{
    Capability, Connector, ErrorClass, RemoteError, RemoteRequest, RemoteService,
};
pub use retry::RetryingService;
pub use transport::{build_descriptor, TransportDescriptor, TransportKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_rendering() {
        let err = Error::configuration("missing target");
        assert!(err.to_string().contains("missing target"));
    }
}
