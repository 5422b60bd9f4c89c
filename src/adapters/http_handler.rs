use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request},
    response::IntoResponse,
};
use hyper::Response;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::{
    adapters::reverse_proxy::{downstream_url, remove_hop_by_hop, rewrite_request},
    core::{GatewayService, ProxyError},
    metrics::{self, RequestOutcome, RequestTimer},
    ports::{
        access_log::{AccessLog, ProxyCompleted, ProxyFailed},
        http_client::HttpClient,
    },
    tracing_setup::proxy_span,
};

/// HTTP boundary of one proxy server.
///
/// Applies the rate limiter, runs the gateway pipeline, dispatches upstream and writes
/// exactly one access record for every admitted request.
pub struct ProxyHandler {
    server: String,
    gateway_service: Arc<GatewayService>,
    http_client: Arc<dyn HttpClient>,
    access_log: Arc<dyn AccessLog>,
    upstream_timeout: Duration,
}

impl ProxyHandler {
    pub fn new(
        server: impl Into<String>,
        gateway_service: Arc<GatewayService>,
        http_client: Arc<dyn HttpClient>,
        access_log: Arc<dyn AccessLog>,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            server: server.into(),
            gateway_service,
            http_client,
            access_log,
            upstream_timeout,
        }
    }

    /// Proxy one inbound request.
    pub async fn handle_request(
        &self,
        req: Request,
        client_addr: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        if let Some(limiter) = self.gateway_service.rate_limiter() {
            if let Err(rejection) = limiter.check() {
                tracing::debug!(server = %self.server, "rate limit exceeded");
                metrics::increment_rate_limited(&self.server);
                return *rejection;
            }
        }

        let timer = RequestTimer::new(&self.server);
        let (mut parts, body) = req.into_parts();
        let downstream = downstream_url(&parts);

        let directive = match self.gateway_service.resolve(&parts).await {
            Ok(directive) => directive,
            Err(error) => return self.fail(&downstream, None, &timer, error),
        };

        let span = tracing::Span::current();
        span.record("downstream_id", directive.downstream_id.as_str());
        span.record("upstream_id", directive.upstream_id.as_str());

        let target = directive.target.clone();
        if let Err(source) = rewrite_request(
            &mut parts,
            client_addr,
            &target,
            directive.request_modifier,
        ) {
            let error = ProxyError::InvalidUpstreamRequest {
                target: target.to_string(),
                source: source.into(),
            };
            return self.fail(&downstream, Some(target.to_string()), &timer, error);
        }
        let upstream = parts.uri.to_string();

        let outgoing = hyper::Request::from_parts(parts, body);
        let dispatched = tokio::time::timeout(
            self.upstream_timeout,
            self.http_client.send_request(outgoing),
        )
        .await;

        let response = match dispatched {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return self.fail(
                    &downstream,
                    Some(upstream),
                    &timer,
                    ProxyError::Dispatch(source),
                );
            }
            Err(_) => {
                let error = ProxyError::UpstreamTimeout(self.upstream_timeout);
                return self.fail(&downstream, Some(upstream), &timer, error);
            }
        };

        let (mut response_parts, response_body) = response.into_parts();
        remove_hop_by_hop(&mut response_parts.headers);
        if let Err(error) = (directive.response_observer)(&mut response_parts) {
            return self.fail(&downstream, Some(upstream), &timer, error);
        }

        let status = response_parts.status;
        self.access_log.proxy_completed(&ProxyCompleted {
            downstream_id: directive.downstream_id,
            upstream_id: directive.upstream_id,
            downstream,
            upstream,
            status,
            duration: timer.elapsed(),
        });
        metrics::increment_request_total(&self.server, RequestOutcome::Proxied, status.as_u16());

        Response::from_parts(response_parts, response_body)
    }

    fn fail(
        &self,
        downstream: &str,
        upstream: Option<String>,
        timer: &RequestTimer,
        error: ProxyError,
    ) -> Response<AxumBody> {
        self.access_log.proxy_failed(&ProxyFailed {
            downstream: downstream.to_string(),
            upstream,
            duration: timer.elapsed(),
            error: &error,
        });
        metrics::increment_request_total(
            &self.server,
            RequestOutcome::Failed,
            error.status_code().as_u16(),
        );
        error.into_response()
    }

    /// Catch-all router serving every path and method through this handler.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .fallback(move |req: Request| {
                let handler = self.clone();
                async move {
                    let client_addr = req
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| *addr);
                    let span = proxy_span(&handler.server, req.method(), req.uri());
                    handler
                        .handle_request(req, client_addr)
                        .instrument(span)
                        .await
                }
            })
            .layer(TraceLayer::new_for_http())
    }
}
