//! Minimal MCP JSON-RPC binding
//!
//! The concrete implementation of the remote collaborator seam: a
//! `Connector` producing sessions for the two transport kinds. Deliberately
//! narrow; the resilience engine never looks below the `RemoteService`
//! trait.

pub mod events;
pub mod session;


pub use session::{HttpSession, SseSession};

use async_trait::async_trait;
use std::sync::OnceLock;

use crate::remote::{Connector, RemoteError, RemoteService};
use crate::transport::{TransportDescriptor, TransportKind};

/// Produces MCP sessions over reqwest
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl HttpConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Shared ambient client used when the descriptor carries no custom factory
fn default_client() -> reqwest::Client {
    static DEFAULT: OnceLock<reqwest::Client> = OnceLock::new();
    DEFAULT.get_or_init(reqwest::Client::new).clone()
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(
        &self,
        descriptor: &TransportDescriptor,
    ) -> Result<Box<dyn RemoteService>, RemoteError> {
        let client = match &descriptor.client_factory {
            Some(factory) => factory()
                .map_err(|e| RemoteError::Other(anyhow::anyhow!("building HTTP client: {e}")))?,
            None => default_client(),
        };
        Ok(match descriptor.kind {
            TransportKind::Sse => Box::new(SseSession::new(client, descriptor)),
            TransportKind::StreamableHttp => Box::new(HttpSession::new(client, descriptor)),
        })
    }
}
