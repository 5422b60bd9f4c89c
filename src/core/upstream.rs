//! Outbound forwarding targets and identity propagation.
use std::{fmt, sync::Arc};

use http::{HeaderName, HeaderValue, request::Parts};
use url::Url;

use crate::core::identity::Identity;

/// Propagates an authenticated identity into the outgoing request.
pub trait UpstreamAuthorizer: Send + Sync + 'static {
    fn inject(&self, request: &mut Parts, identity: &Identity);
}

/// Writes the identity into two request headers, replacing whatever the caller sent.
#[derive(Debug, Clone)]
pub struct HeaderAuthorizer {
    user_id_header: HeaderName,
    username_header: HeaderName,
}

impl HeaderAuthorizer {
    pub fn new(user_id_header: HeaderName, username_header: HeaderName) -> Self {
        Self {
            user_id_header,
            username_header,
        }
    }
}

impl UpstreamAuthorizer for HeaderAuthorizer {
    fn inject(&self, request: &mut Parts, identity: &Identity) {
        let id = identity.id.hyphenated().to_string();
        for (name, value) in [
            (&self.user_id_header, id.as_str()),
            (&self.username_header, identity.username.as_str()),
        ] {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    request.headers.insert(name.clone(), value);
                }
                Err(_) => {
                    tracing::warn!(
                        header = %name,
                        user_id = %identity.id,
                        "identity value is not a valid header value, header dropped"
                    );
                    request.headers.remove(name);
                }
            }
        }
    }
}

/// Outbound target a downstream forwards to.
pub struct Upstream {
    pub id: String,
    pub address: Url,
    pub authorizer: Option<Arc<dyn UpstreamAuthorizer>>,
}

impl fmt::Debug for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upstream")
            .field("id", &self.id)
            .field("address", &self.address.as_str())
            .field("authorized", &self.authorizer.is_some())
            .finish()
    }
}
