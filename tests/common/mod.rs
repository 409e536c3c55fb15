//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use base64::prelude::*;
use request_shield::config::ShieldConfig;
use request_shield::security::RateLimiter;
use request_shield::{ShieldServer, Shutdown};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;

/// Unsigned JWT carrying `sub`.
pub fn jwt(sub: &str) -> String {
    format!(
        "{}.{}.unsigned",
        BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#),
        BASE64_URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{}"}}"#, sub))
    )
}

pub fn bearer(sub: &str) -> String {
    format!("Bearer {}", jwt(sub))
}

/// Router over a fresh in-memory limiter.
pub fn app(config: ShieldConfig) -> Router {
    ShieldServer::new(config).router()
}

/// Router sharing `limiter` with the caller.
pub fn app_with_limiter(config: ShieldConfig, limiter: Arc<RateLimiter>) -> Router {
    ShieldServer::with_limiter(config, limiter).router()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), 64 * 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Serve `config` on an ephemeral port until the returned [`Shutdown`] fires.
pub async fn spawn_server(config: ShieldConfig) -> (SocketAddr, Shutdown, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = ShieldServer::new(config);
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            server.run(listener, None, shutdown).await.unwrap();
        })
    };
    (addr, shutdown, handle)
}
