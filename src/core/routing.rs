use std::sync::Arc;

use eyre::{Result, WrapErr, eyre};
use http::{HeaderName, request::Parts};
use url::Url;

use crate::{
    config::models::{DownstreamAuthorizerConfig, ServerConfig, UpstreamAuthorizerConfig},
    core::{
        downstream::{CookieAuthorizer, Downstream, DownstreamAuthorizer},
        rules::build_rule,
        upstream::{HeaderAuthorizer, Upstream, UpstreamAuthorizer},
    },
    ports::identity_provider::IdentityProvider,
};

/// Immutable routing state of one proxy server.
///
/// Downstreams keep their configured order; the first one whose rules all match wins.
#[derive(Debug, Default)]
pub struct RoutingTable {
    downstreams: Vec<Downstream>,
    upstreams: Vec<Upstream>,
}

impl RoutingTable {
    pub fn new(downstreams: Vec<Downstream>, upstreams: Vec<Upstream>) -> Self {
        Self {
            downstreams,
            upstreams,
        }
    }

    /// Build the domain objects described by a server configuration.
    pub fn from_config(
        config: &ServerConfig,
        provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Result<Self> {
        let upstreams = config
            .upstreams
            .iter()
            .map(|upstream| -> Result<Upstream> {
                let address = Url::parse(&upstream.address).wrap_err_with(|| {
                    format!("upstream '{}' address '{}'", upstream.id, upstream.address)
                })?;
                let authorizer = match &upstream.authorizer {
                    Some(UpstreamAuthorizerConfig::Header { user_id, username }) => {
                        let authorizer: Arc<dyn UpstreamAuthorizer> =
                            Arc::new(HeaderAuthorizer::new(
                                header_name(user_id, &upstream.id)?,
                                header_name(username, &upstream.id)?,
                            ));
                        Some(authorizer)
                    }
                    None => None,
                };
                Ok(Upstream {
                    id: upstream.id.clone(),
                    address,
                    authorizer,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let downstreams = config
            .downstreams
            .iter()
            .map(|downstream| -> Result<Downstream> {
                let authorizer = match &downstream.authorizer {
                    Some(DownstreamAuthorizerConfig::Cookie { key }) => {
                        let provider = provider.clone().ok_or_else(|| {
                            eyre!(
                                "downstream '{}' needs a user provider for its cookie authorizer",
                                downstream.id
                            )
                        })?;
                        let authorizer: Arc<dyn DownstreamAuthorizer> =
                            Arc::new(CookieAuthorizer::new(key.clone(), provider));
                        Some(authorizer)
                    }
                    None => None,
                };
                Ok(Downstream {
                    id: downstream.id.clone(),
                    rules: downstream.rules.iter().map(build_rule).collect(),
                    upstream_id: downstream.upstream.clone(),
                    authorizer,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(downstreams, upstreams))
    }

    /// First downstream whose rules all match the request.
    pub fn match_downstream(&self, request: &Parts) -> Option<&Downstream> {
        self.downstreams
            .iter()
            .find(|downstream| downstream.matches(request))
    }

    pub fn find_upstream(&self, id: &str) -> Option<&Upstream> {
        self.upstreams.iter().find(|upstream| upstream.id == id)
    }
}

fn header_name(name: &str, upstream_id: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .wrap_err_with(|| format!("upstream '{upstream_id}' authorizer header '{name}'"))
}
