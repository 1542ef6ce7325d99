//! Bridge configuration model
//!
//! Immutable after parse; the CLI front end maps its arguments onto
//! `BridgeOptions` and everything downstream reads from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

use crate::backoff::BackoffPolicy;
use crate::error::{Error, Result};
use crate::transport::TransportKind;

/// Environment variable consulted when no target URL is given explicitly
pub const REMOTE_URL_ENV: &str = "MCP_REMOTE_SSE";

/// Remote transport selection
///
/// `Auto` starts on SSE and may fall back to streamable HTTP once if the
/// remote side turns out to speak the other flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportChoice {
    Sse,
    StreamableHttp,
    Auto,
}

impl TransportChoice {
    /// The transport kind the first probe uses
    pub fn initial_kind(&self) -> TransportKind {
        match self {
            TransportChoice::Sse | TransportChoice::Auto => TransportKind::Sse,
            TransportChoice::StreamableHttp => TransportKind::StreamableHttp,
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, TransportChoice::Auto)
    }
}

impl Default for TransportChoice {
    fn default() -> Self {
        TransportChoice::Sse
    }
}

impl fmt::Display for TransportChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportChoice::Sse => "sse",
            TransportChoice::StreamableHttp => "streamable-http",
            TransportChoice::Auto => "auto",
        };
        write!(f, "{name}")
    }
}

impl FromStr for TransportChoice {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "sse" => Ok(TransportChoice::Sse),
            "streamable-http" => Ok(TransportChoice::StreamableHttp),
            "auto" => Ok(TransportChoice::Auto),
            other => Err(Error::configuration(format!(
                "unknown transport '{other}' (expected sse, streamable-http, or auto)"
            ))),
        }
    }
}

/// One retry policy: total attempt count plus backoff shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts, including the first try
    pub attempts: u32,
    pub backoff: BackoffPolicy,
}

impl RetrySettings {
    pub fn new(attempts: u32, backoff: BackoffPolicy) -> Self {
        Self { attempts, backoff }
    }

    /// A single attempt, no retries
    pub fn single() -> Self {
        Self {
            attempts: 1,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Everything the bridge needs to reach and republish a remote server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeOptions {
    /// Remote endpoint URL; falls back to `MCP_REMOTE_SSE` when absent
    pub url: Option<String>,
    /// Inline JSON header template
    pub header_template: Option<String>,
    /// Path to a JSON header template file
    pub header_file: Option<PathBuf>,
    /// Explicit `key=value` header overrides, applied last
    pub headers: Vec<String>,
    /// HTTP/HTTPS proxy URL, injected into the environment if unset
    pub proxy: Option<String>,
    /// SOCKS proxy URL, injected into the environment if unset
    pub socks: Option<String>,
    /// Name the locally republished server announces
    pub name: String,
    /// Instructions text for the republished server
    pub instructions: Option<String>,
    /// Print the startup banner
    pub show_banner: bool,
    /// Connect-phase timeout in seconds
    pub connect_timeout: Option<f64>,
    /// Total per-request timeout in seconds
    pub request_timeout: Option<f64>,
    /// Idle read timeout on the event stream, in seconds
    pub sse_read_timeout: Option<f64>,
    /// Connection-probe retry policy
    pub probe_retry: RetrySettings,
    /// Per-request retry policy
    pub request_retry: RetrySettings,
    pub transport: TransportChoice,
    /// Force HTTP/1.1 on the outbound client
    pub disable_http2: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            url: None,
            header_template: None,
            header_file: None,
            headers: Vec::new(),
            proxy: None,
            socks: None,
            name: "Proxy Bridge".to_string(),
            instructions: None,
            show_banner: true,
            connect_timeout: None,
            request_timeout: None,
            sse_read_timeout: None,
            probe_retry: RetrySettings::new(1, BackoffPolicy::new(2.0)),
            request_retry: RetrySettings::new(1, BackoffPolicy::new(1.0)),
            transport: TransportChoice::default(),
            disable_http2: false,
        }
    }
}

impl BridgeOptions {
    /// Resolve the target URL from explicit configuration or the environment
    pub fn resolve_url(&self) -> Result<Url> {
        let raw = self
            .url
            .clone()
            .or_else(|| std::env::var(REMOTE_URL_ENV).ok())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                Error::configuration(format!(
                    "remote URL missing: pass --url or set {REMOTE_URL_ENV}"
                ))
            })?;
        Url::parse(&raw)
            .map_err(|e| Error::configuration(format!("invalid remote URL '{raw}': {e}")))
    }
}
