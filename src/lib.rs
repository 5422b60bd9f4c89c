//! Guardian - an authenticating reverse-proxy gateway.
//!
//! Guardian sits in front of internal HTTP services. Each configured server listens on its own
//! address, matches every inbound request against an ordered list of *downstreams* (the first
//! whose rules all match wins), optionally authenticates the caller from a session cookie,
//! and forwards the request to the downstream's *upstream*, injecting the resolved identity as
//! request headers. Raw TCP routes are forwarded byte-for-byte. Every listener runs as a
//! process under one [`Hub`](utils::hub::Hub), which turns the first failure or an OS signal
//! into a single coordinated shutdown.
//!
//! # Quick Example
//! ```no_run
//! use guardian::{config, server};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = config::load_config(Some("guardian.toml")).await?;
//! let cancel = CancellationToken::new();
//! guardian::utils::spawn_signal_handler(cancel.clone());
//! match server::run(cfg, cancel).await {
//!     Err(e) if guardian::utils::is_clean_stop(&e) => Ok(()),
//!     other => other,
//! }
//! # }
//! ```
//!
//! # Architecture
//! Business rules live in `core` (rules, downstreams, upstreams, the gateway pipeline).
//! `ports` holds the traits the core depends on and `adapters` their implementations:
//! the hyper client, the axum handler and servers, identity directories, the TCP proxy and
//! the tracing-backed access log.
//!
//! # Error Handling
//! Domain failures are typed `thiserror` enums; wiring code returns `eyre::Result<T>` with
//! context attached through `WrapErr`.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod server;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{HttpClientAdapter, ProxyHandler},
    core::{GatewayService, ProxyError, RoutingTable},
    ports::http_client::HttpClient,
    utils::{Hub, HubStopped, Process},
};
