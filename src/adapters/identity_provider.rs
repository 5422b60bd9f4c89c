//! Identity directory clients.
use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use reqwest::StatusCode;
use url::Url;
use uuid::Uuid;

use crate::{
    config::models::{StaticUserConfig, UserProviderConfig},
    core::identity::{Identity, Token},
    ports::identity_provider::{IdentityProvider, IdentityProviderError, IdentityProviderResult},
};

/// Token table held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    users: HashMap<Uuid, Identity>,
}

impl StaticIdentityProvider {
    pub fn new(users: &[StaticUserConfig]) -> Self {
        Self {
            users: users
                .iter()
                .map(|user| {
                    (
                        user.token,
                        Identity {
                            id: user.id,
                            username: user.username.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, token: &Token) -> IdentityProviderResult<Identity> {
        self.users
            .get(&token.id)
            .cloned()
            .ok_or(IdentityProviderError::NotFound(token.id))
    }
}

/// Remote directory queried with `GET {base}/users/{token}`.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base: Url,
}

impl HttpIdentityProvider {
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(address)
            .wrap_err_with(|| format!("invalid user provider address '{address}'"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("failed to build user provider HTTP client")?;

        Ok(Self { client, base })
    }

    fn user_url(&self, token: &Token) -> IdentityProviderResult<Url> {
        self.base
            .join(&format!("users/{}", token.id.hyphenated()))
            .map_err(|e| IdentityProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn resolve(&self, token: &Token) -> IdentityProviderResult<Identity> {
        let url = self.user_url(token)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| IdentityProviderError::Unavailable(format!("GET {url}: {e}")))?;

        match response.status() {
            StatusCode::OK => response
                .json::<Identity>()
                .await
                .map_err(|e| IdentityProviderError::InvalidResponse(e.to_string())),
            StatusCode::NOT_FOUND => Err(IdentityProviderError::NotFound(token.id)),
            status => Err(IdentityProviderError::Unavailable(format!(
                "GET {url} answered {status}"
            ))),
        }
    }
}

/// Build the configured identity provider.
pub fn build_identity_provider(config: &UserProviderConfig) -> Result<Arc<dyn IdentityProvider>> {
    let provider: Arc<dyn IdentityProvider> = match config {
        UserProviderConfig::Static { users } => Arc::new(StaticIdentityProvider::new(users)),
        UserProviderConfig::Http { address, timeout } => {
            let timeout = humantime::parse_duration(timeout)
                .wrap_err_with(|| format!("invalid user provider timeout '{timeout}'"))?;
            Arc::new(HttpIdentityProvider::new(address, timeout)?)
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, extract::Path, routing::get};

    use super::*;

    #[tokio::test]
    async fn static_provider_resolves_known_tokens() {
        let token = Uuid::new_v4();
        let id = Uuid::new_v4();
        let provider = StaticIdentityProvider::new(&[StaticUserConfig {
            token,
            id,
            username: "alice".to_string(),
        }]);

        let identity = provider.resolve(&Token::new(token)).await.unwrap();
        assert_eq!(identity.id, id);
        assert_eq!(identity.username, "alice");

        let err = provider.resolve(&Token::new(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, IdentityProviderError::NotFound(_)));
    }

    async fn spawn_directory(known: Uuid) -> String {
        let app = Router::new().route(
            "/dir/users/{token}",
            get(move |Path(token): Path<Uuid>| async move {
                if token == known {
                    Ok(Json(Identity {
                        id: known,
                        username: "bob".to_string(),
                    }))
                } else {
                    Err(axum::http::StatusCode::NOT_FOUND)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}/dir")
    }

    #[tokio::test]
    async fn http_provider_queries_directory() {
        let known = Uuid::new_v4();
        let address = spawn_directory(known).await;
        let provider = HttpIdentityProvider::new(&address, Duration::from_secs(5)).unwrap();

        let identity = provider.resolve(&Token::new(known)).await.unwrap();
        assert_eq!(identity.username, "bob");

        let err = provider.resolve(&Token::new(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, IdentityProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn http_provider_reports_unreachable_directory() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider =
            HttpIdentityProvider::new(&format!("http://{addr}"), Duration::from_secs(1)).unwrap();
        let err = provider.resolve(&Token::new(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, IdentityProviderError::Unavailable(_)));
    }

    #[test]
    fn build_provider_rejects_bad_timeout() {
        let config = UserProviderConfig::Http {
            address: "http://directory:8080".to_string(),
            timeout: "whenever".to_string(),
        };
        assert!(build_identity_provider(&config).is_err());
    }
}
