//! CORS and hardening response headers.
//!
//! # Responsibilities
//! - Answer CORS preflight (`OPTIONS`) probes without running the gate
//! - Add permissive CORS headers to gated responses
//! - Add security hardening headers (optional)

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};

const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, PATCH, OPTIONS";
const CORS_ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
const CORS_MAX_AGE_SECS: &str = "86400";

/// Add permissive CORS headers, leaving any already set by the handler.
pub fn apply_cors_headers(headers: &mut HeaderMap) {
    let entries = [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (header::ACCESS_CONTROL_ALLOW_METHODS, CORS_ALLOW_METHODS),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, CORS_ALLOW_HEADERS),
    ];
    for (name, value) in entries {
        headers
            .entry(name)
            .or_insert(HeaderValue::from_static(value));
    }
}

/// Immediate answer to a CORS preflight.
pub fn preflight_response() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    apply_cors_headers(headers);
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(CORS_MAX_AGE_SECS),
    );
    response
}

/// Add standard hardening headers.
pub fn apply_security_headers(headers: &mut HeaderMap) {
    let entries = [
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_FRAME_OPTIONS, "DENY"),
        (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
        (HeaderName::from_static("x-permitted-cross-domain-policies"), "none"),
    ];
    for (name, value) in entries {
        headers
            .entry(name)
            .or_insert(HeaderValue::from_static(value));
    }
}
