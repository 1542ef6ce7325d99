//! Transport descriptors and the outbound HTTP client factory
//!
//! Pure builders: nothing here performs I/O. A descriptor carries everything
//! a connector needs to open one session on one transport kind.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::Result;
use crate::headers::HeaderSet;
use crate::options::BridgeOptions;

/// Total request timeout applied when only a connect timeout is configured
const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_secs(30);

/// The two interchangeable ways to carry the remote streaming protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    Sse,
    StreamableHttp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Sse => "sse",
            TransportKind::StreamableHttp => "streamable-http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the reqwest client used for a connection attempt
pub type HttpClientFactory = Arc<dyn Fn() -> reqwest::Result<reqwest::Client> + Send + Sync>;

/// Everything a connector needs to open one session
#[derive(Clone)]
pub struct TransportDescriptor {
    pub kind: TransportKind,
    pub url: Url,
    pub headers: HeaderSet,
    /// Idle read timeout on the event stream
    pub sse_read_timeout: Option<Duration>,
    /// Present only when the ambient default client would not honor the
    /// configured timeouts or HTTP version
    pub client_factory: Option<HttpClientFactory>,
}

impl fmt::Debug for TransportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportDescriptor")
            .field("kind", &self.kind)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("sse_read_timeout", &self.sse_read_timeout)
            .field("custom_client", &self.client_factory.is_some())
            .finish()
    }
}

/// Build the descriptor for one connection attempt on the given kind
pub fn build_descriptor(
    options: &BridgeOptions,
    headers: HeaderSet,
    kind: TransportKind,
) -> Result<TransportDescriptor> {
    Ok(TransportDescriptor {
        kind,
        url: options.resolve_url()?,
        headers,
        sse_read_timeout: options.sse_read_timeout.map(duration_secs),
        client_factory: client_factory_for(options),
    })
}

/// Convert a configured second count into a Duration, treating negative
/// values as zero
fn duration_secs(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX)
}

fn client_factory_for(options: &BridgeOptions) -> Option<HttpClientFactory> {
    let needs_custom = options.connect_timeout.is_some()
        || options.request_timeout.is_some()
        || options.disable_http2;
    if !needs_custom {
        return None;
    }

    let total = options
        .request_timeout
        .map(duration_secs)
        .unwrap_or(DEFAULT_TOTAL_TIMEOUT);
    let connect = options.connect_timeout.map(duration_secs);
    let read = options.request_timeout.map(duration_secs);
    let disable_http2 = options.disable_http2;

    Some(Arc::new(move || {
        let mut builder = reqwest::Client::builder().timeout(total);
        if let Some(connect) = connect {
            builder = builder.connect_timeout(connect);
        }
        if let Some(read) = read {
            builder = builder.read_timeout(read);
        }
        if disable_http2 {
            builder = builder.http1_only();
        }
        builder.build()
    }))
}
