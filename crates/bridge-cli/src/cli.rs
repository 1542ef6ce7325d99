//! Command-line definitions for mcp-bridge
//!
//! The flags map one-to-one onto `BridgeOptions`; nothing here carries
//! behavior beyond parsing.

use bridge_core::{BackoffPolicy, BridgeOptions, RetrySettings, TransportChoice};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Sse,
    StreamableHttp,
    Auto,
}

impl From<TransportArg> for TransportChoice {
    fn from(value: TransportArg) -> Self {
        match value {
            TransportArg::Sse => TransportChoice::Sse,
            TransportArg::StreamableHttp => TransportChoice::StreamableHttp,
            TransportArg::Auto => TransportChoice::Auto,
        }
    }
}

/// Expose a remote streaming MCP server over local stdio
#[derive(Debug, Parser)]
#[command(name = "mcp-bridge", version, about)]
pub struct Cli {
    /// Remote MCP endpoint URL; falls back to MCP_REMOTE_SSE
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Name the locally republished server announces
    #[arg(long, default_value = "Proxy Bridge")]
    pub name: String,

    /// Instructions text for the republished server
    #[arg(long)]
    pub instructions: Option<String>,

    /// Extra header; repeatable
    #[arg(long = "header", value_name = "KEY=VALUE")]
    pub headers: Vec<String>,

    /// Inline JSON header template; values may use ${ENV_NAME}
    #[arg(long, value_name = "JSON")]
    pub header_template: Option<String>,

    /// Path to a JSON header template file
    #[arg(long, value_name = "PATH")]
    pub header_file: Option<PathBuf>,

    /// HTTP/HTTPS proxy URL, e.g. http://127.0.0.1:7890
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// SOCKS proxy URL, e.g. socks5://127.0.0.1:1080
    #[arg(long, value_name = "URL")]
    pub socks: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Disable the startup banner
    #[arg(long = "no-banner", action = clap::ArgAction::SetFalse)]
    pub show_banner: bool,

    /// Connect-phase timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub connect_timeout: Option<f64>,

    /// Total per-request timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub request_timeout: Option<f64>,

    /// Idle read timeout on the event stream, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub sse_read_timeout: Option<f64>,

    /// Connection probe attempts, including the first try
    #[arg(long, default_value_t = 1, value_name = "COUNT")]
    pub retries: u32,

    /// Probe backoff base in seconds (wait = base * 2^(attempt-1))
    #[arg(long, default_value_t = 2.0, value_name = "SECONDS")]
    pub retry_backoff: f64,

    /// Lower bound on the probe backoff wait, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub retry_min: Option<f64>,

    /// Upper bound on the probe backoff wait, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub retry_max: Option<f64>,

    /// Probe backoff jitter ratio in [0, 1]
    #[arg(long, default_value_t = 0.0, value_name = "RATIO")]
    pub retry_jitter: f64,

    /// Attempts per remote call, including the first try
    #[arg(long, default_value_t = 1, value_name = "COUNT")]
    pub request_retries: u32,

    /// Request backoff base in seconds
    #[arg(long, default_value_t = 1.0, value_name = "SECONDS")]
    pub request_retry_backoff: f64,

    /// Lower bound on the request backoff wait, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub request_retry_min: Option<f64>,

    /// Upper bound on the request backoff wait, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub request_retry_max: Option<f64>,

    /// Request backoff jitter ratio in [0, 1]
    #[arg(long, default_value_t = 0.0, value_name = "RATIO")]
    pub request_retry_jitter: f64,

    /// Remote transport kind; auto falls back from SSE once
    #[arg(long, value_enum, default_value_t = TransportArg::Sse)]
    pub transport: TransportArg,

    /// Force HTTP/1.1 on the outbound client
    #[arg(long = "no-http2")]
    pub disable_http2: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn into_options(self) -> BridgeOptions {
        BridgeOptions {
            url: self.url,
            header_template: self.header_template,
            header_file: self.header_file,
            headers: self.headers,
            proxy: self.proxy,
            socks: self.socks,
            name: self.name,
            instructions: self.instructions,
            show_banner: self.show_banner,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            sse_read_timeout: self.sse_read_timeout,
            probe_retry: RetrySettings::new(
                self.retries,
                BackoffPolicy {
                    base: self.retry_backoff,
                    min: self.retry_min,
                    max: self.retry_max,
                    jitter: self.retry_jitter,
                },
            ),
            request_retry: RetrySettings::new(
                self.request_retries,
                BackoffPolicy {
                    base: self.request_retry_backoff,
                    min: self.request_retry_min,
                    max: self.request_retry_max,
                    jitter: self.request_retry_jitter,
                },
            ),
            transport: self.transport.into(),
            disable_http2: self.disable_http2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::TransportKind;

    #[test]
    fn test_minimal_invocation() {
        let cli = Cli::parse_from(["mcp-bridge", "--url", "https://example.com/sse"]);
        let options = cli.into_options();
        assert_eq!(options.url.as_deref(), Some("https://example.com/sse"));
        assert_eq!(options.name, "Proxy Bridge");
        assert!(options.show_banner);
        assert_eq!(options.probe_retry.attempts, 1);
        assert_eq!(options.request_retry.attempts, 1);
    }

    #[test]
    fn test_repeatable_headers() {
        let cli = Cli::parse_from([
            "mcp-bridge",
            "--url",
            "https://example.com/sse",
            "--header",
            "X-A=1",
            "--header",
            "X-B=2",
        ]);
        assert_eq!(cli.headers, vec!["X-A=1", "X-B=2"]);
    }

    #[test]
    fn test_retry_flags() {
        let cli = Cli::parse_from([
            "mcp-bridge",
            "--url",
            "https://example.com/sse",
            "--retries",
            "3",
            "--retry-backoff",
            "2",
            "--retry-min",
            "5",
            "--retry-max",
            "30",
            "--retry-jitter",
            "0.2",
        ]);
        let options = cli.into_options();
        assert_eq!(options.probe_retry.attempts, 3);
        assert_eq!(options.probe_retry.backoff.base, 2.0);
        assert_eq!(options.probe_retry.backoff.min, Some(5.0));
        assert_eq!(options.probe_retry.backoff.max, Some(30.0));
        assert_eq!(options.probe_retry.backoff.jitter, 0.2);
    }

    #[test]
    fn test_transport_values() {
        let cli = Cli::parse_from([
            "mcp-bridge",
            "--url",
            "x://y",
            "--transport",
            "streamable-http",
        ]);
        let options = cli.into_options();
        assert_eq!(
            options.transport.initial_kind(),
            TransportKind::StreamableHttp
        );

        let cli = Cli::parse_from(["mcp-bridge", "--url", "x://y", "--transport", "auto"]);
        assert!(cli.into_options().transport.is_auto());
    }

    #[test]
    fn test_no_banner_flag() {
        let cli = Cli::parse_from(["mcp-bridge", "--url", "x://y", "--no-banner"]);
        assert!(!cli.show_banner);
    }

    #[test]
    fn test_no_http2_flag() {
        let cli = Cli::parse_from(["mcp-bridge", "--url", "x://y", "--no-http2"]);
        assert!(cli.disable_http2);
    }
}
