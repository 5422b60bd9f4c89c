use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::core::identity::{Identity, Token};

/// Errors raised by identity directories.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum IdentityProviderError {
    /// The token is not known to the directory
    #[error("no identity for token {0}")]
    NotFound(Uuid),

    /// The directory could not be reached or answered with an error status
    #[error("identity directory unavailable: {0}")]
    Unavailable(String),

    /// The directory answered with something that is not an identity
    #[error("invalid identity directory response: {0}")]
    InvalidResponse(String),
}

/// Result type alias for identity provider operations
pub type IdentityProviderResult<T> = Result<T, IdentityProviderError>;

/// IdentityProvider defines the port for resolving session tokens into users.
///
/// Implementations must be safe for concurrent use by many in-flight requests.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Resolve a token into the identity it belongs to.
    async fn resolve(&self, token: &Token) -> IdentityProviderResult<Identity>;
}
