use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for HTTP client operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to the upstream fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for dispatching proxied requests upstream
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send a fully rewritten request to its upstream
    ///
    /// # Arguments
    /// * `req` - The outgoing request; its URI is absolute and its headers final
    ///
    /// # Returns
    /// A future that resolves to the upstream's response or a transport error
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}
