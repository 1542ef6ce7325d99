//! Proxy environment injection
//!
//! reqwest reads the conventional proxy variables from the process
//! environment when it builds a client; the bridge fills them in only when
//! the operator has not already set them, once, before the first connection
//! attempt. This is the single place where the process environment is
//! mutated.

use std::sync::Once;

use crate::options::BridgeOptions;

pub const HTTP_PROXY_ENV: &str = "HTTP_PROXY";
pub const HTTPS_PROXY_ENV: &str = "HTTPS_PROXY";
pub const ALL_PROXY_ENV: &str = "ALL_PROXY";

static INIT: Once = Once::new();

/// Inject configured proxy URLs into the process environment
///
/// Idempotent and one-shot: later calls do nothing.
pub fn init_proxy_env(options: &BridgeOptions) {
    INIT.call_once(|| inject(options.proxy.as_deref(), options.socks.as_deref()));
}

fn env_is_unset(name: &str) -> bool {
    std::env::var(name).map(|value| value.is_empty()).unwrap_or(true)
}

pub(crate) fn inject(proxy: Option<&str>, socks: Option<&str>) {
    if let Some(proxy) = proxy {
        if env_is_unset(HTTP_PROXY_ENV) {
            std::env::set_var(HTTP_PROXY_ENV, proxy);
            if env_is_unset(HTTPS_PROXY_ENV) {
                std::env::set_var(HTTPS_PROXY_ENV, proxy);
            }
            tracing::debug!(proxy, "proxy variables injected");
        }
    }
    if let Some(socks) = socks {
        if env_is_unset(ALL_PROXY_ENV) {
            std::env::set_var(ALL_PROXY_ENV, socks);
            tracing::debug!(socks, "socks proxy variable injected");
        }
    }
}
