//! Gate, limiter and sanitizer behaviour through the full router.

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    routing::get as get_route,
    Router,
};
use common::{app, bearer, body_json, header, send};
use request_shield::config::{RateLimitConfig, RoutePolicyConfig, ShieldConfig};
use request_shield::ShieldServer;
use serde_json::json;

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method(Method::GET).uri(uri)
}

#[tokio::test]
async fn test_sixty_first_request_is_limited() {
    let app = app(ShieldConfig::default());

    for i in 1..=60u64 {
        let response = send(
            &app,
            get("/api/whoami")
                .header(header::AUTHORIZATION, bearer("alice"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK, "request {}", i);
        assert_eq!(header(&response, "x-ratelimit-limit"), Some("60"));
        let remaining = (60 - i).to_string();
        assert_eq!(header(&response, "x-ratelimit-remaining"), Some(remaining.as_str()));
    }

    let response = send(
        &app,
        get("/api/whoami")
            .header(header::AUTHORIZATION, bearer("alice"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&response, "x-ratelimit-remaining"), Some("0"));
    let retry_after: u64 = header(&response, "retry-after").unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));

    let body = body_json(response).await;
    assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
    assert!(body["error"].is_string());

    // a different subject has its own window
    let response = send(
        &app,
        get("/api/whoami")
            .header(header::AUTHORIZATION, bearer("bob"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_whoami_reports_derived_key() {
    let app = app(ShieldConfig::default());

    let response = send(
        &app,
        get("/api/whoami")
            .header(header::AUTHORIZATION, bearer("alice"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(body_json(response).await["key"], "user:alice");

    let response = send(
        &app,
        get("/api/whoami")
            .header(header::AUTHORIZATION, "Bearer opaque")
            .header("x-forwarded-for", "198.51.100.4, 10.0.0.1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let body = body_json(response).await;
    assert_eq!(body["key"], "ip:198.51.100.4");
    assert_eq!(body["authenticated_subject"], false);
}

#[tokio::test]
async fn test_preflight_bypasses_gate() {
    let app = app(ShieldConfig::default());

    let response = send(
        &app,
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/echo")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(header(&response, "access-control-allow-origin"), Some("*"));
    assert!(header(&response, "x-ratelimit-limit").is_none());

    // the preflight did not consume quota
    let response = send(
        &app,
        get("/api/whoami")
            .header(header::AUTHORIZATION, "Bearer opaque")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(header(&response, "x-ratelimit-remaining"), Some("59"));
}

#[tokio::test]
async fn test_missing_auth_is_401_with_quota_headers() {
    let app = app(ShieldConfig::default());

    let response = send(&app, get("/api/whoami").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(header(&response, "x-ratelimit-remaining"), Some("59"));
    assert_eq!(header(&response, "access-control-allow-origin"), Some("*"));
    assert_eq!(body_json(response).await["code"], "AUTHENTICATION_REQUIRED");
}

#[tokio::test]
async fn test_method_and_size_rejections() {
    let app = app(ShieldConfig::default());

    let response = send(
        &app,
        Request::builder()
            .method(Method::PATCH)
            .uri("/api/echo")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(header(&response, "allow"), Some("POST, GET, PUT, DELETE"));
    assert_eq!(body_json(response).await["code"], "METHOD_NOT_ALLOWED");

    let response = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/api/echo")
            .header(header::AUTHORIZATION, bearer("alice"))
            .header(header::CONTENT_LENGTH, "2000000")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response).await["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_json_body_is_sanitized() {
    let app = app(ShieldConfig::default());
    let payload = json!({
        "comment": "<script>alert(1)</script>hello",
        "tags": ["<b onclick=steal()>bold</b>", 7],
    });

    let response = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/api/echo")
            .header(header::AUTHORIZATION, bearer("alice"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "comment": "hello", "tags": ["<b steal()>bold</b>", 7] })
    );
}

#[tokio::test]
async fn test_route_policy_overrides() {
    let mut config = ShieldConfig::default();
    config.routes.push(RoutePolicyConfig {
        name: "public".into(),
        path_prefix: Some("/public".into()),
        require_auth: Some(false),
        rate_limit: Some(RateLimitConfig {
            max_requests: 2,
            window_ms: 60_000,
        }),
        ..RoutePolicyConfig::default()
    });
    let app = app(config);

    for _ in 0..2 {
        let response = send(&app, get("/public/report?rows=1").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-limit"), Some("2"));
    }
    let response = send(&app, get("/public/report?rows=1").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // the same client is still within the global window elsewhere
    let response = send(&app, get("/api/report").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(header(&response, "x-ratelimit-limit"), Some("60"));
    assert_eq!(header(&response, "x-ratelimit-remaining"), Some("59"));
}

#[tokio::test]
async fn test_sensitive_delete_requires_subject() {
    let mut config = ShieldConfig::default();
    config.gate.validate_sensitive_ops = true;
    let app = app(config);

    let delete = |auth: &str| {
        Request::builder()
            .method(Method::DELETE)
            .uri("/api/items/42")
            .header(header::AUTHORIZATION, auth)
            .body(Body::empty())
            .unwrap()
    };

    let response = send(&app, delete("Bearer opaque")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, delete(&bearer("alice"))).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_health_is_outside_gate() {
    let app = app(ShieldConfig::default());

    let response = send(&app, get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "x-ratelimit-limit").is_none());
    assert!(header(&response, "x-request-id").is_some());
    assert_eq!(header(&response, "x-content-type-options"), Some("nosniff"));
    assert_eq!(body_json(response).await["status"], "ok");
}

async fn panicking_handler() -> &'static str {
    panic!("mounted handler panic")
}

#[tokio::test]
async fn test_handler_panic_is_json_500() {
    let app = ShieldServer::new(ShieldConfig::default())
        .router_with(Router::new().route("/api/panic", get_route(panicking_handler)));

    let response = send(
        &app,
        get("/api/panic")
            .header(header::AUTHORIZATION, bearer("alice"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(header(&response, "x-request-id").is_some());
    let body = body_json(response).await;
    assert_eq!(body["code"], "INTERNAL_ERROR");
    assert!(!body.to_string().contains("mounted handler"));
}

#[tokio::test]
async fn test_default_router_has_no_panic_route() {
    let app = app(ShieldConfig::default());

    let response = send(
        &app,
        get("/api/panic")
            .header(header::AUTHORIZATION, bearer("alice"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_route_size_override_reaches_sanitizer() {
    let mut config = ShieldConfig::default();
    config.routes.push(RoutePolicyConfig {
        name: "bulk".into(),
        path_prefix: Some("/api/echo".into()),
        max_request_size: Some(8 * 1024 * 1024),
        ..RoutePolicyConfig::default()
    });
    let app = app(config);

    let blob = "a".repeat(5 * 1024 * 1024);
    let payload = json!({ "blob": blob }).to_string();
    let response = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/api/echo")
            .header(header::AUTHORIZATION, bearer("alice"))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, payload.len())
            .body(Body::from(payload))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["blob"].as_str().map(str::len), Some(blob.len()));
}

#[tokio::test]
async fn test_default_size_limit_still_applies_to_json() {
    let app = app(ShieldConfig::default());

    let payload = json!({ "blob": "a".repeat(2 * 1024 * 1024) }).to_string();
    let response = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/api/echo")
            .header(header::AUTHORIZATION, bearer("alice"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
