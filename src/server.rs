//! Application wiring: configuration in, supervised processes out.
use std::sync::Arc;

use eyre::{Result, WrapErr};
use tokio_util::sync::CancellationToken;

use crate::{
    adapters::{
        HttpClientAdapter, HttpServerProcess, ProxyHandler, TcpProxyProcess, TracingAccessLog,
        build_identity_provider, healthcheck_router,
    },
    config::models::AppConfig,
    core::{GatewayService, RoutingTable},
    metrics,
    ports::{access_log::AccessLog, http_client::HttpClient},
    utils::hub::Hub,
};

/// Build every process described by `config`, run them under one hub and wait.
///
/// Returns `HubStopped` inside the report when `cancel` ended a healthy run.
pub async fn run(config: AppConfig, cancel: CancellationToken) -> Result<()> {
    metrics::init_metrics();

    let provider = config
        .user_provider
        .as_ref()
        .map(build_identity_provider)
        .transpose()
        .wrap_err("failed to build user provider")?;
    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().wrap_err("failed to create HTTP client")?);
    let access_log: Arc<dyn AccessLog> = Arc::new(TracingAccessLog);

    let health_timeout = humantime::parse_duration(&config.healthcheck.request_timeout)
        .wrap_err("invalid healthcheck request timeout")?;
    let mut processes = vec![HttpServerProcess::new(
        "healthcheck",
        config.healthcheck.address.clone(),
        healthcheck_router(&config.healthcheck.path),
        health_timeout,
    )];

    for server in &config.servers {
        let routes = RoutingTable::from_config(server, provider.clone())
            .wrap_err_with(|| format!("invalid routes for server {}", server.address))?;
        let upstream_timeout = humantime::parse_duration(&server.upstream_timeout)
            .wrap_err_with(|| format!("invalid upstream timeout for server {}", server.address))?;
        let request_timeout = humantime::parse_duration(&server.request_timeout)
            .wrap_err_with(|| format!("invalid request timeout for server {}", server.address))?;
        let gateway = Arc::new(GatewayService::new(routes, &server.limit));

        tracing::info!(
            address = %server.address,
            downstreams = server.downstreams.len(),
            upstreams = server.upstreams.len(),
            rate_limited = server.limit.is_enabled(),
            "proxy server configured"
        );

        let handler = Arc::new(ProxyHandler::new(
            server.address.clone(),
            gateway,
            http_client.clone(),
            access_log.clone(),
            upstream_timeout,
        ));
        processes.push(HttpServerProcess::new(
            format!("proxy {}", server.address),
            server.address.clone(),
            handler.router(),
            request_timeout,
        ));
    }

    let hub = Hub::new(cancel);
    for process in processes {
        hub.add_proc(Arc::new(process));
    }
    if !config.tcp_proxies.is_empty() {
        hub.add_proc(Arc::new(TcpProxyProcess::new(config.tcp_proxies.clone())));
    }

    hub.wait().await
}
