use eyre::{Result, eyre};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize structured logging with JSON output
pub fn init_tracing() -> Result<()> {
    Registry::default()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .map_err(|e| eyre!("failed to install JSON subscriber: {e}"))?;

    tracing::debug!("structured logging initialized");
    Ok(())
}

/// Initialize console-friendly logging for development
pub fn init_console_tracing() -> Result<()> {
    Registry::default()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .map_err(|e| eyre!("failed to install console subscriber: {e}"))?;

    tracing::debug!("console logging initialized");
    Ok(())
}

/// Span wrapping one proxied request on `server`.
pub fn proxy_span(server: &str, method: &http::Method, uri: &http::Uri) -> tracing::Span {
    tracing::info_span!(
        "proxy_request",
        server = server,
        http.method = %method,
        http.uri = %uri,
        downstream_id = tracing::field::Empty,
        upstream_id = tracing::field::Empty,
    )
}
