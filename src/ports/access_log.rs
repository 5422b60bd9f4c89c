use std::time::Duration;

use http::StatusCode;

use crate::core::error::ProxyError;

/// One successfully proxied exchange.
#[derive(Debug, Clone)]
pub struct ProxyCompleted {
    pub downstream_id: String,
    pub upstream_id: String,
    /// Inbound URL as seen by the gateway.
    pub downstream: String,
    /// Outgoing URL the request was dispatched to.
    pub upstream: String,
    pub status: StatusCode,
    pub duration: Duration,
}

/// One exchange that failed anywhere after admission.
#[derive(Debug)]
pub struct ProxyFailed<'a> {
    pub downstream: String,
    pub upstream: Option<String>,
    pub duration: Duration,
    pub error: &'a ProxyError,
}

/// AccessLog defines the port for structured per-request proxy records.
///
/// Exactly one of the two methods is called for every request that passed the rate limiter.
pub trait AccessLog: Send + Sync + 'static {
    fn proxy_completed(&self, record: &ProxyCompleted);

    fn proxy_failed(&self, record: &ProxyFailed<'_>);
}
