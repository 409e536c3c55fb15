//! Request identity key derivation.
//!
//! Order of precedence:
//! 1. `user:<sub>` from the payload of an `Authorization: Bearer` JWT
//! 2. `ip:<addr>` from `X-Forwarded-For`, `X-Real-IP`, `CF-Connecting-IP`
//! 3. `ip:<addr>` from the socket peer, when known
//! 4. `ip:unknown`
//!
//! The token signature is NOT verified here. The subject only selects a
//! rate-limit bucket; authentication happens elsewhere.

use std::net::SocketAddr;

use axum::http::{header, HeaderMap};
use base64::prelude::*;
use serde::Deserialize;
use serde_json::Value;

/// Client address headers, in order of precedence.
pub const CLIENT_IP_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Derived identity stored in request extensions once the gate passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl ClientKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_user(&self) -> bool {
        self.0.starts_with("user:")
    }
}

#[derive(Deserialize)]
struct Claims {
    sub: Option<Value>,
}

/// The token from a well-formed `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Subject claim of a JWT, decoded structurally.
pub fn token_subject(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;

    match claims.sub? {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Client address from proxy headers; for `X-Forwarded-For` the first
/// (originating) entry is used.
pub fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    CLIENT_IP_HEADERS.iter().find_map(|name| {
        let value = headers.get(*name)?.to_str().ok()?;
        let first = value.split(',').next()?.trim();
        (!first.is_empty()).then(|| first.to_string())
    })
}

/// Derive the stable identity key for a request. Never fails.
pub fn derive_request_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(subject) = bearer_token(headers).and_then(token_subject) {
        return format!("user:{}", subject);
    }

    if let Some(ip) = forwarded_client_ip(headers) {
        return format!("ip:{}", ip);
    }

    match peer {
        Some(addr) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}
