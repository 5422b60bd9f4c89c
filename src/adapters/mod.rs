pub mod access_log;
pub mod healthcheck;
pub mod http_client;
pub mod http_handler;
pub mod http_server;
pub mod identity_provider;
pub mod reverse_proxy;
pub mod tcp_proxy;

/// Re-export commonly used types from adapters
pub use access_log::TracingAccessLog;
pub use healthcheck::healthcheck_router;
pub use http_client::HttpClientAdapter;
pub use http_handler::ProxyHandler;
pub use http_server::HttpServerProcess;
pub use identity_provider::{HttpIdentityProvider, StaticIdentityProvider, build_identity_provider};
pub use tcp_proxy::{TcpProxyProcess, TcpRouteProxy};
