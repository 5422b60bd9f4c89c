//! Lightweight metrics helpers for Guardian.
//!
//! Thin wrappers around the `metrics` crate macros. No exporter is embedded; the
//! application may install any compatible recorder, otherwise every call is a no-op.
//!
//! Provided metrics:
//! * `guardian_requests_total` (counter; labels `server`, `outcome`, `status`)
//! * `guardian_request_duration_seconds` (histogram; label `server`)
//! * `guardian_rate_limited_total` (counter; label `server`)
//! * `guardian_tcp_connections_total` (counter; label `source`)
//! * `guardian_processes_running` (gauge)
use std::{
    sync::atomic::{AtomicI64, Ordering},
    time::{Duration, Instant},
};

use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::Lazy;

pub const GUARDIAN_REQUESTS_TOTAL: &str = "guardian_requests_total";
pub const GUARDIAN_REQUEST_DURATION_SECONDS: &str = "guardian_request_duration_seconds";
pub const GUARDIAN_RATE_LIMITED_TOTAL: &str = "guardian_rate_limited_total";
pub const GUARDIAN_TCP_CONNECTIONS_TOTAL: &str = "guardian_tcp_connections_total";
pub const GUARDIAN_PROCESSES_RUNNING: &str = "guardian_processes_running";

/// Running process count mirrored into the gauge.
static PROCESSES_RUNNING: Lazy<AtomicI64> = Lazy::new(|| {
    describe_counter!(
        GUARDIAN_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests admitted by the proxy, by outcome."
    );
    describe_histogram!(
        GUARDIAN_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of proxied HTTP requests, including upstream time."
    );
    describe_counter!(
        GUARDIAN_RATE_LIMITED_TOTAL,
        Unit::Count,
        "Requests rejected by the server rate limiter."
    );
    describe_counter!(
        GUARDIAN_TCP_CONNECTIONS_TOTAL,
        Unit::Count,
        "TCP connections accepted by the route proxy."
    );
    describe_gauge!(
        GUARDIAN_PROCESSES_RUNNING,
        "Number of hub processes whose start has not returned yet."
    );
    AtomicI64::new(0)
});

/// Outcome label of an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Proxied,
    Failed,
}

impl RequestOutcome {
    fn as_str(self) -> &'static str {
        match self {
            RequestOutcome::Proxied => "proxied",
            RequestOutcome::Failed => "failed",
        }
    }
}

pub fn increment_request_total(server: &str, outcome: RequestOutcome, status: u16) {
    counter!(
        GUARDIAN_REQUESTS_TOTAL,
        "server" => server.to_string(),
        "outcome" => outcome.as_str(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_request_duration(server: &str, duration: Duration) {
    histogram!(GUARDIAN_REQUEST_DURATION_SECONDS, "server" => server.to_string())
        .record(duration.as_secs_f64());
}

pub fn increment_rate_limited(server: &str) {
    counter!(GUARDIAN_RATE_LIMITED_TOTAL, "server" => server.to_string()).increment(1);
}

pub fn increment_tcp_connections(source: &str) {
    counter!(GUARDIAN_TCP_CONNECTIONS_TOTAL, "source" => source.to_string()).increment(1);
}

/// RAII guard counting a hub process as running until dropped.
pub struct ProcessGuard(());

impl ProcessGuard {
    pub fn new() -> Self {
        let running = PROCESSES_RUNNING.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!(GUARDIAN_PROCESSES_RUNNING).set(running as f64);
        Self(())
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        let running = PROCESSES_RUNNING.fetch_sub(1, Ordering::SeqCst) - 1;
        gauge!(GUARDIAN_PROCESSES_RUNNING).set(running as f64);
    }
}

pub fn processes_running() -> i64 {
    PROCESSES_RUNNING.load(Ordering::SeqCst)
}

/// RAII helper measuring inbound request duration.
pub struct RequestTimer {
    start: Instant,
    server: String,
}

impl RequestTimer {
    pub fn new(server: &str) -> Self {
        Self {
            start: Instant::now(),
            server: server.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.server, self.start.elapsed());
    }
}

/// Register metric descriptions (idempotent).
pub fn init_metrics() {
    Lazy::force(&PROCESSES_RUNNING);
    tracing::debug!("Guardian metric descriptions registered");
}
