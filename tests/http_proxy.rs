// End-to-end proxying through the axum handler to a real loopback upstream
#[cfg(test)]
mod test {
    use std::{net::SocketAddr, sync::Arc, time::Duration};

    use axum::{
        Json, Router,
        body::Body,
        extract::Request,
        http::{HeaderMap, StatusCode},
    };
    use guardian::{
        adapters::{HttpClientAdapter, ProxyHandler, StaticIdentityProvider, TracingAccessLog},
        config::models::{
            DownstreamAuthorizerConfig, DownstreamConfig, LimitConfig, RuleConfig, ServerConfig,
            StaticUserConfig, UpstreamAuthorizerConfig, UpstreamConfig,
        },
        core::{GatewayService, RoutingTable},
        ports::identity_provider::IdentityProvider,
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    const TOKEN: &str = "6f1c3a52-7c1e-4d6b-9b43-2f6ad1a0c001";
    const USER_ID: &str = "0b7e2f0e-4a51-4f0d-8d8e-1c7a3f1b2e11";

    fn header(headers: &HeaderMap, name: &str) -> Value {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map_or(Value::Null, |value| Value::String(value.to_string()))
    }

    /// Upstream answering with what it received.
    async fn spawn_upstream() -> SocketAddr {
        let app = Router::new().fallback(|req: Request| async move {
            let headers = req.headers();
            Json(json!({
                "uri": req.uri().to_string(),
                "host": header(headers, "host"),
                "user_id": header(headers, "x-user-id"),
                "username": header(headers, "x-username"),
                "forwarded_host": header(headers, "x-forwarded-host"),
                "te": header(headers, "te"),
            }))
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        addr
    }

    fn server(upstream: SocketAddr, limit: LimitConfig) -> ServerConfig {
        ServerConfig {
            address: "127.0.0.1:0".to_string(),
            limit,
            upstream_timeout: "5s".to_string(),
            request_timeout: "15s".to_string(),
            downstreams: vec![
                DownstreamConfig {
                    id: "private".to_string(),
                    upstream: "private".to_string(),
                    rules: vec![
                        RuleConfig::Host {
                            host: "svc.local".to_string(),
                        },
                        RuleConfig::PathPrefix {
                            path: "/private".to_string(),
                        },
                    ],
                    authorizer: Some(DownstreamAuthorizerConfig::Cookie {
                        key: "sid".to_string(),
                    }),
                },
                DownstreamConfig {
                    id: "public".to_string(),
                    upstream: "public".to_string(),
                    rules: vec![RuleConfig::Host {
                        host: "svc.local".to_string(),
                    }],
                    authorizer: None,
                },
                DownstreamConfig {
                    id: "anonymous-private".to_string(),
                    upstream: "private".to_string(),
                    rules: vec![RuleConfig::Host {
                        host: "open.local".to_string(),
                    }],
                    authorizer: None,
                },
            ],
            upstreams: vec![
                UpstreamConfig {
                    id: "private".to_string(),
                    address: format!("http://{upstream}/base"),
                    authorizer: Some(UpstreamAuthorizerConfig::Header {
                        user_id: "X-User-ID".to_string(),
                        username: "X-Username".to_string(),
                    }),
                },
                UpstreamConfig {
                    id: "public".to_string(),
                    address: format!("http://{upstream}"),
                    authorizer: None,
                },
            ],
        }
    }

    async fn router(limit: LimitConfig) -> Router {
        let upstream = spawn_upstream().await;
        let provider: Arc<dyn IdentityProvider> =
            Arc::new(StaticIdentityProvider::new(&[StaticUserConfig {
                token: Uuid::parse_str(TOKEN).unwrap(),
                id: Uuid::parse_str(USER_ID).unwrap(),
                username: "alice".to_string(),
            }]));
        let config = server(upstream, limit);
        let routes = RoutingTable::from_config(&config, Some(provider)).unwrap();
        let gateway = Arc::new(GatewayService::new(routes, &config.limit));

        Arc::new(ProxyHandler::new(
            config.address,
            gateway,
            Arc::new(HttpClientAdapter::new().unwrap()),
            Arc::new(TracingAccessLog),
            Duration::from_secs(5),
        ))
        .router()
    }

    fn request(host: &str, path: &str, cookie: Option<&str>) -> http::Request<Body> {
        let mut builder = http::Request::get(path).header("host", host).header("te", "trailers");
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(router: &Router, req: http::Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn send_json(router: &Router, req: http::Request<Body>) -> Value {
        let (status, body) = send(router, req).await;
        assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_public_route_preserves_host_and_strips_hop_by_hop() {
        let router = router(LimitConfig::default()).await;

        let echoed = send_json(&router, request("svc.local", "/docs/index?lang=en", None)).await;

        assert_eq!(echoed["uri"], "/docs/index?lang=en");
        assert_eq!(echoed["host"], "svc.local");
        assert_eq!(echoed["forwarded_host"], "svc.local");
        assert_eq!(echoed["te"], Value::Null);
        assert_eq!(echoed["user_id"], Value::Null);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_authenticated_route_injects_identity() {
        let router = router(LimitConfig::default()).await;
        let cookie = format!("theme=dark; sid={TOKEN}");

        let echoed = send_json(
            &router,
            request("svc.local", "/private/reports", Some(cookie.as_str())),
        )
        .await;

        assert_eq!(echoed["uri"], "/base/private/reports");
        assert_eq!(echoed["user_id"], USER_ID);
        assert_eq!(echoed["username"], "alice");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_spoofed_identity_headers_are_replaced() {
        let router = router(LimitConfig::default()).await;
        let mut req = request(
            "svc.local",
            "/private/reports",
            Some(format!("sid={TOKEN}").as_str()),
        );
        req.headers_mut()
            .insert("x-user-id", "00000000-0000-0000-0000-000000000000".parse().unwrap());

        let echoed = send_json(&router, req).await;
        assert_eq!(echoed["user_id"], USER_ID);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_authentication_failures() {
        let router = router(LimitConfig::default()).await;

        let (status, body) = send(&router, request("svc.local", "/private", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, b"auth data not found");

        let (status, body) =
            send(&router, request("svc.local", "/private", Some("sid=not-a-uuid"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, b"auth data invalid");

        let unknown = format!("sid={}", Uuid::new_v4());
        let (status, _) =
            send(&router, request("svc.local", "/private", Some(unknown.as_str()))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_identity_required_by_upstream() {
        let router = router(LimitConfig::default()).await;

        let (status, body) = send(&router, request("open.local", "/", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, b"unauthorized: no user for authorized zone");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unmatched_request() {
        let router = router(LimitConfig::default()).await;

        let (status, body) = send(&router, request("elsewhere.local", "/", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, b"request not matched");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rate_limit_rejects_excess_requests() {
        let router = router(LimitConfig { rps: 1, burst: 2 }).await;

        let mut statuses = Vec::new();
        for _ in 0..4 {
            let (status, _) = send(&router, request("svc.local", "/", None)).await;
            statuses.push(status);
        }

        assert_eq!(&statuses[..2], &[StatusCode::OK, StatusCode::OK]);
        assert!(statuses[2..].contains(&StatusCode::TOO_MANY_REQUESTS));
    }
}
