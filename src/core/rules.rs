//! Request predicates used to select a downstream.
//!
//! Rules are pure functions of the request head: they never touch the body and hold no
//! per-request state, so one instance is shared by every in-flight request.
use std::fmt;

use http::{header, request::Parts};

use crate::config::models::RuleConfig;

/// A single matching predicate.
pub trait Rule: fmt::Debug + Send + Sync + 'static {
    fn matches(&self, request: &Parts) -> bool;
}

/// Matches when the request host equals the configured host exactly.
#[derive(Debug, Clone)]
pub struct HostRule {
    host: String,
}

impl HostRule {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl Rule for HostRule {
    fn matches(&self, request: &Parts) -> bool {
        request_host(request).is_some_and(|host| host == self.host)
    }
}

/// Matches when the request path starts with the configured prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixRule {
    prefix: String,
}

impl PathPrefixRule {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Rule for PathPrefixRule {
    fn matches(&self, request: &Parts) -> bool {
        request.uri.path().starts_with(&self.prefix)
    }
}

/// Host as received: the `Host` header, else the authority of an absolute-form URI.
pub fn request_host(request: &Parts) -> Option<&str> {
    request
        .headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri.authority().map(|authority| authority.as_str()))
}

/// Build the rule described by a configuration entry.
pub fn build_rule(config: &RuleConfig) -> Box<dyn Rule> {
    match config {
        RuleConfig::Host { host } => Box::new(HostRule::new(host.clone())),
        RuleConfig::PathPrefix { path } => Box::new(PathPrefixRule::new(path.clone())),
    }
}
