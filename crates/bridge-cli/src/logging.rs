//! Logging bootstrap
//!
//! All diagnostics go to stderr; stdout is reserved for the local protocol
//! frames. The `--log-level` flag wins over `RUST_LOG`, which wins over the
//! default.

use tracing_subscriber::EnvFilter;

pub fn init_logging(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .map_err(|e| anyhow::anyhow!("invalid log level '{level}': {e}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("logging already initialized: {e}"))?;
    Ok(())
}
