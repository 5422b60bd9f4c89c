use crate::{
    core::error::error_chain,
    ports::access_log::{AccessLog, ProxyCompleted, ProxyFailed},
};

/// Access log written as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAccessLog;

impl AccessLog for TracingAccessLog {
    fn proxy_completed(&self, record: &ProxyCompleted) {
        tracing::info!(
            downstream = %record.downstream,
            upstream = %record.upstream,
            downstream_id = %record.downstream_id,
            upstream_id = %record.upstream_id,
            status = record.status.as_u16(),
            duration = ?record.duration,
            "proxy completed"
        );
    }

    fn proxy_failed(&self, record: &ProxyFailed<'_>) {
        tracing::error!(
            downstream = %record.downstream,
            upstream = record.upstream.as_deref().unwrap_or("-"),
            status = record.error.status_code().as_u16(),
            duration = ?record.duration,
            error = %error_chain(record.error),
            "proxy failed"
        );
    }
}
