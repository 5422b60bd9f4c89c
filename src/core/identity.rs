use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated user attached to a single in-flight request.
///
/// Produced by a downstream authorizer and consumed by the upstream authorizer of the same
/// request; never cached across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
}

/// Opaque session token presented by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub id: Uuid,
}

impl Token {
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }
}
