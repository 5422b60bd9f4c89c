//! Failure taxonomy of the proxy pipeline and its HTTP mapping.
//!
//! Callers only ever see the status code and the short message of the failing kind; the
//! full cause chain goes to the access log.
use std::{error::Error as StdError, time::Duration};

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

use crate::{core::downstream::AuthError, ports::http_client::HttpClientError};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("request not matched")]
    RequestNotMatched,

    #[error("upstream '{upstream}' of downstream '{downstream}' not found")]
    UpstreamNotFound { downstream: String, upstream: String },

    #[error("downstream '{downstream}' authentication failed")]
    Authentication {
        downstream: String,
        #[source]
        source: AuthError,
    },

    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("failed to build upstream request for {target}")]
    InvalidUpstreamRequest {
        target: String,
        #[source]
        source: http::Error,
    },

    #[error("upstream request failed")]
    Dispatch(#[source] HttpClientError),

    #[error("upstream did not respond within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("upstream response rejected: {0}")]
    ResponseRejected(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::RequestNotMatched | ProxyError::Unauthorized { .. } => {
                StatusCode::UNAUTHORIZED
            }
            ProxyError::Authentication { source, .. } if source.is_client_error() => {
                StatusCode::UNAUTHORIZED
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the caller. Never includes internal topology or causes.
    pub fn client_message(&self) -> String {
        match self {
            ProxyError::Authentication { source, .. } => source.to_string(),
            ProxyError::UpstreamNotFound { .. } => "upstream not found".to_string(),
            ProxyError::InvalidUpstreamRequest { .. } | ProxyError::Dispatch(_) => {
                "upstream request failed".to_string()
            }
            ProxyError::UpstreamTimeout(_) => "upstream timed out".to_string(),
            ProxyError::ResponseRejected(_) => "upstream response rejected".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), self.client_message()).into_response()
    }
}

/// Render an error and all of its sources as `outer: inner: root`.
pub fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut current = error.source();
    while let Some(cause) = current {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        current = cause.source();
    }
    rendered
}
