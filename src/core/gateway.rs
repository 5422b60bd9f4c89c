//! Core gateway orchestration service.
//!
//! The `GatewayService` owns the immutable routing table and the optional rate limiter of
//! one proxy server. For every admitted request it:
//! * selects the first matching downstream
//! * resolves the downstream's upstream
//! * authenticates the caller when the downstream requires it
//! * refuses anonymous traffic to upstreams that expect an identity
//! * hands back a [`ForwardDirective`] describing how to rewrite and dispatch the request
//!
//! This layer performs no network I/O of its own (authorizers may call their identity
//! provider) so it stays testable in isolation.
use std::{fmt, sync::Arc};

use http::{request, response};
use url::Url;

use crate::{
    config::models::LimitConfig,
    core::{
        error::ProxyError, identity::Identity, rate_limiter::ProxyRateLimiter,
        routing::RoutingTable, upstream::UpstreamAuthorizer,
    },
};

/// Mutates the outgoing request head before it is dispatched.
pub type RequestModifier = Box<dyn FnOnce(&mut request::Parts) + Send + 'static>;

/// Inspects or mutates the upstream response head before it is relayed.
pub type ResponseObserver =
    Box<dyn FnOnce(&mut response::Parts) -> Result<(), ProxyError> + Send + 'static>;

/// Outcome of the routing pipeline for one request.
pub struct ForwardDirective {
    pub downstream_id: String,
    pub upstream_id: String,
    /// Base address of the upstream; the inbound path and query are joined onto it.
    pub target: Url,
    pub request_modifier: RequestModifier,
    pub response_observer: ResponseObserver,
}

impl fmt::Debug for ForwardDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardDirective")
            .field("downstream_id", &self.downstream_id)
            .field("upstream_id", &self.upstream_id)
            .field("target", &self.target.as_str())
            .finish_non_exhaustive()
    }
}

pub struct GatewayService {
    routes: RoutingTable,
    rate_limiter: Option<ProxyRateLimiter>,
}

impl GatewayService {
    pub fn new(routes: RoutingTable, limit: &LimitConfig) -> Self {
        Self {
            routes,
            rate_limiter: ProxyRateLimiter::new(limit),
        }
    }

    pub fn rate_limiter(&self) -> Option<&ProxyRateLimiter> {
        self.rate_limiter.as_ref()
    }

    /// Run routing and authorization for a request head.
    pub async fn resolve(&self, request: &request::Parts) -> Result<ForwardDirective, ProxyError> {
        let downstream = self
            .routes
            .match_downstream(request)
            .ok_or(ProxyError::RequestNotMatched)?;

        let upstream = self
            .routes
            .find_upstream(&downstream.upstream_id)
            .ok_or_else(|| ProxyError::UpstreamNotFound {
                downstream: downstream.id.clone(),
                upstream: downstream.upstream_id.clone(),
            })?;

        let identity = match &downstream.authorizer {
            Some(authorizer) => Some(authorizer.authenticate(request).await.map_err(|source| {
                ProxyError::Authentication {
                    downstream: downstream.id.clone(),
                    source,
                }
            })?),
            None => None,
        };

        let request_modifier: RequestModifier = match (&upstream.authorizer, identity) {
            (Some(_), None) => {
                return Err(ProxyError::Unauthorized {
                    reason: "no user for authorized zone".to_string(),
                });
            }
            (Some(authorizer), Some(identity)) => inject_identity(authorizer.clone(), identity),
            (None, _) => Box::new(leave_unchanged),
        };

        tracing::debug!(
            downstream = %downstream.id,
            upstream = %upstream.id,
            "request routed"
        );

        Ok(ForwardDirective {
            downstream_id: downstream.id.clone(),
            upstream_id: upstream.id.clone(),
            target: upstream.address.clone(),
            request_modifier,
            response_observer: Box::new(accept_response),
        })
    }
}

fn leave_unchanged(_: &mut request::Parts) {}

fn accept_response(_: &mut response::Parts) -> Result<(), ProxyError> {
    Ok(())
}

fn inject_identity(authorizer: Arc<dyn UpstreamAuthorizer>, identity: Identity) -> RequestModifier {
    Box::new(move |parts: &mut request::Parts| authorizer.inject(parts, &identity))
}
