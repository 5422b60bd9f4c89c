//! Inbound routing targets and caller authentication.
use std::{fmt, sync::Arc};

use async_trait::async_trait;
use http::{header, request::Parts};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    core::{
        identity::{Identity, Token},
        rules::Rule,
    },
    ports::identity_provider::{IdentityProvider, IdentityProviderError},
};

/// Caller authentication failures.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AuthError {
    /// The request does not carry the credential at all
    #[error("auth data not found")]
    AuthDataNotFound,

    /// The credential is present but malformed
    #[error("auth data invalid")]
    AuthDataInvalid {
        value: String,
        #[source]
        source: uuid::Error,
    },

    /// The identity directory failed to resolve a well-formed credential
    #[error("failed to resolve identity")]
    Provider(#[source] IdentityProviderError),
}

impl AuthError {
    /// Whether the failure is attributable to the caller rather than the gateway.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AuthError::AuthDataNotFound | AuthError::AuthDataInvalid { .. }
        )
    }
}

/// Authenticates the caller of an inbound request.
#[async_trait]
pub trait DownstreamAuthorizer: Send + Sync + 'static {
    async fn authenticate(&self, request: &Parts) -> Result<Identity, AuthError>;
}

/// Reads a session token from a named cookie and resolves it through an identity provider.
pub struct CookieAuthorizer {
    cookie_name: String,
    provider: Arc<dyn IdentityProvider>,
}

impl CookieAuthorizer {
    pub fn new(cookie_name: impl Into<String>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            provider,
        }
    }
}

#[async_trait]
impl DownstreamAuthorizer for CookieAuthorizer {
    async fn authenticate(&self, request: &Parts) -> Result<Identity, AuthError> {
        let value = find_cookie(request, &self.cookie_name)
            .filter(|value| !value.is_empty())
            .ok_or(AuthError::AuthDataNotFound)?;

        let id = Uuid::parse_str(value).map_err(|source| AuthError::AuthDataInvalid {
            value: value.to_string(),
            source,
        })?;

        self.provider
            .resolve(&Token::new(id))
            .await
            .map_err(AuthError::Provider)
    }
}

/// Value of the named cookie; when sent more than once the last occurrence wins.
fn find_cookie<'a>(request: &'a Parts, name: &str) -> Option<&'a str> {
    request
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(key, _)| key.trim() == name)
        .map(|(_, value)| {
            let value = value.trim();
            value
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .unwrap_or(value)
        })
        .last()
}

/// Inbound routing target: ordered rules, an optional authorizer and the upstream it feeds.
pub struct Downstream {
    pub id: String,
    pub rules: Vec<Box<dyn Rule>>,
    pub upstream_id: String,
    pub authorizer: Option<Arc<dyn DownstreamAuthorizer>>,
}

impl Downstream {
    /// All rules must match, evaluated in order; an empty rule list matches everything.
    pub fn matches(&self, request: &Parts) -> bool {
        self.rules.iter().all(|rule| rule.matches(request))
    }
}

impl fmt::Debug for Downstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Downstream")
            .field("id", &self.id)
            .field("rules", &self.rules)
            .field("upstream_id", &self.upstream_id)
            .field("authorized", &self.authorizer.is_some())
            .finish()
    }
}
