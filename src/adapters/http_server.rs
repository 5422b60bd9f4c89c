use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use axum::Router;
use eyre::{Result, WrapErr};
use http::StatusCode;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;

use crate::utils::process::Process;

/// Bounds the time a router may take to produce a response head.
///
/// Requests still pending after `timeout` are answered with `408 Request Timeout`.
pub fn with_request_timeout(router: Router, timeout: Duration) -> Router {
    router.layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        timeout,
    ))
}

/// Serves one axum router on one listen address until stopped.
///
/// Every request runs under `request_timeout`. Stopping triggers axum's graceful
/// shutdown, so `start` returns once in-flight requests have finished.
pub struct HttpServerProcess {
    name: String,
    address: String,
    router: Router,
    shutdown: CancellationToken,
}

impl HttpServerProcess {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        router: Router,
        request_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            router: with_request_timeout(router, request_timeout),
            shutdown: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Process for HttpServerProcess {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.address)
            .await
            .wrap_err_with(|| format!("failed to bind {} to {}", self.name, self.address))?;
        let local_addr = listener.local_addr().wrap_err("failed to read local address")?;
        tracing::info!(server = %self.name, address = %local_addr, "http server listening");

        axum::serve(
            listener,
            self.router
                .clone()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(self.shutdown.clone().cancelled_owned())
        .await
        .wrap_err_with(|| format!("http server {} failed", self.name))?;

        tracing::info!(server = %self.name, "http server stopped");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.shutdown.cancel();
        Ok(())
    }
}
