pub mod downstream;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod rate_limiter;
pub mod routing;
pub mod rules;
pub mod upstream;

pub use error::ProxyError;
pub use gateway::{ForwardDirective, GatewayService};
pub use identity::{Identity, Token};
pub use rate_limiter::ProxyRateLimiter;
pub use routing::RoutingTable;
