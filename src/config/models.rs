//! Configuration data structures for Guardian.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! serde‑friendly and carry defaults so that minimal configs remain concise. Tagged enums
//! (`type = "..."`) select rule, authorizer and user provider variants.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_healthcheck_address() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_healthcheck_path() -> String {
    "/health".to_string()
}

fn default_upstream_timeout() -> String {
    "30s".to_string()
}

fn default_request_timeout() -> String {
    "15s".to_string()
}

fn default_provider_timeout() -> String {
    "5s".to_string()
}

/// Root configuration document.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub healthcheck: HealthcheckConfig,
    /// Identity directory used by downstream authorizers.
    #[serde(default)]
    pub user_provider: Option<UserProviderConfig>,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub tcp_proxies: Vec<TcpProxyConfig>,
}

impl AppConfig {
    /// Whether any downstream of any server needs an identity provider.
    pub fn requires_user_provider(&self) -> bool {
        self.servers
            .iter()
            .flat_map(|server| server.downstreams.iter())
            .any(|downstream| downstream.authorizer.is_some())
    }
}

/// Liveness endpoint served on its own listener.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthcheckConfig {
    #[serde(default = "default_healthcheck_address")]
    pub address: String,
    #[serde(default = "default_healthcheck_path")]
    pub path: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self {
            address: default_healthcheck_address(),
            path: default_healthcheck_path(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserProviderConfig {
    /// Fixed token table, mostly useful for development and tests.
    Static {
        #[serde(default)]
        users: Vec<StaticUserConfig>,
    },
    /// Remote directory answering `GET {address}/users/{token}`.
    Http {
        address: String,
        #[serde(default = "default_provider_timeout")]
        timeout: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StaticUserConfig {
    pub token: Uuid,
    pub id: Uuid,
    pub username: String,
}

/// One HTTP proxy listener with its own routing table and rate limit.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub address: String,
    #[serde(default)]
    pub limit: LimitConfig,
    /// Upper bound for a single upstream exchange (humantime, e.g. "30s").
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: String,
    /// Upper bound for serving one inbound request, upstream time included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    /// Ordered; the first matching downstream wins.
    #[serde(default)]
    pub downstreams: Vec<DownstreamConfig>,
    #[serde(default)]
    pub upstreams: Vec<UpstreamConfig>,
}

/// Token bucket parameters. A zero in either field disables limiting.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitConfig {
    #[serde(default)]
    pub rps: u32,
    #[serde(default)]
    pub burst: u32,
}

impl LimitConfig {
    pub fn is_enabled(&self) -> bool {
        self.rps > 0 && self.burst > 0
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DownstreamConfig {
    pub id: String,
    /// Identifier of the upstream that receives matched requests.
    pub upstream: String,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    #[serde(default)]
    pub authorizer: Option<DownstreamAuthorizerConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleConfig {
    Host { host: String },
    PathPrefix { path: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownstreamAuthorizerConfig {
    /// Session token carried in the named cookie.
    Cookie { key: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpstreamConfig {
    pub id: String,
    /// Base URL, e.g. `http://127.0.0.1:9001`.
    pub address: String,
    #[serde(default)]
    pub authorizer: Option<UpstreamAuthorizerConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamAuthorizerConfig {
    /// Identity forwarded as two request headers.
    Header { user_id: String, username: String },
}

/// Raw TCP relay between a listen address and a fixed destination.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TcpProxyConfig {
    pub src_address: String,
    pub dst_address: String,
}
