//! Server‑wide admission control built atop `governor`.
//!
//! One non‑keyed GCRA limiter per proxy server: `rps` tokens are refilled per second and at
//! most `burst` may accumulate. Checks never wait; a denied request is answered with
//! `429 Too Many Requests` before any routing work happens.
use std::num::NonZeroU32;

use axum::response::{IntoResponse, Response as AxumResponse};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use http::StatusCode;

use crate::config::models::LimitConfig;

pub type DirectRateLimiterImpl = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct ProxyRateLimiter {
    limiter: DirectRateLimiterImpl,
    rps: NonZeroU32,
    burst: NonZeroU32,
}

impl ProxyRateLimiter {
    /// Build a limiter, or `None` when either parameter is zero (limiting disabled).
    pub fn new(config: &LimitConfig) -> Option<Self> {
        let rps = NonZeroU32::new(config.rps)?;
        let burst = NonZeroU32::new(config.burst)?;
        let quota = Quota::per_second(rps).allow_burst(burst);

        tracing::debug!(rps = rps.get(), burst = burst.get(), "rate limiter enabled");
        Some(Self {
            limiter: RateLimiter::direct(quota),
            rps,
            burst,
        })
    }

    pub fn check(&self) -> Result<(), Box<AxumResponse>> {
        if self.limiter.check().is_err() {
            let response = (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
            Err(Box::new(response))
        } else {
            Ok(())
        }
    }

    pub fn rps(&self) -> u32 {
        self.rps.get()
    }

    pub fn burst(&self) -> u32 {
        self.burst.get()
    }
}
