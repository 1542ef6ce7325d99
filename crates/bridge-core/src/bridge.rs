//! Bridge assembly
//!
//! Composes header resolution, proxy environment injection, transport
//! descriptors, the probe retry engine, and the request retry proxy into
//! one long-lived remote-operation handle. The handle is given to the
//! local-transport loop exactly once.

use crate::error::Result;
use crate::headers::resolve_headers;
use crate::options::BridgeOptions;
use crate::probe::ProbeRetryEngine;
use crate::proxy_env::init_proxy_env;
use crate::remote::{Connector, RemoteService};
use crate::retry::RetryingService;

/// Build the remote-operation handle the local loop republishes
///
/// Fails fast on configuration errors, then drives the probe engine to a
/// validated connection. When request-level retry is configured (attempt
/// count above one) the handle is wrapped in the retry proxy; otherwise the
/// raw connected session is returned.
pub async fn assemble<C: Connector>(
    options: &BridgeOptions,
    connector: &C,
) -> Result<Box<dyn RemoteService>> {
    // surface a missing or invalid URL before any side effect
    options.resolve_url()?;

    init_proxy_env(options);
    let headers = resolve_headers(options);

    let engine = ProbeRetryEngine::new(options, connector, headers);
    let service = engine.establish().await?;

    if options.request_retry.attempts > 1 {
        Ok(Box::new(RetryingService::new(
            service,
            options.request_retry.clone(),
        )))
    } else {
        Ok(service)
    }
}
