use axum::{Router, routing::get};
use http::StatusCode;

/// Liveness responder: `GET path` answers `200 OK`.
pub fn healthcheck_router(path: &str) -> Router {
    Router::new().route(path, get(|| async { (StatusCode::OK, "OK") }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn test_healthcheck_returns_ok() {
        let response = healthcheck_router("/health")
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_healthcheck_other_paths_and_methods() {
        let router = healthcheck_router("/health");

        let response = router
            .clone()
            .oneshot(Request::get("/other").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router
            .oneshot(Request::post("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
