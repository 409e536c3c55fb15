//! Response header helpers.
//!
//! # Responsibilities
//! - `X-RateLimit-*` headers from a limiter status
//! - `Vary` merging for negotiated responses
//! - Map handler panics to a JSON 500
//!
//! # Design Decisions
//! - Header names are static; values are formatted integers
//! - Panic payloads are logged, never sent to the client

use std::any::Any;

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::error::ShieldError;
use crate::security::rate_limit::RateLimitStatus;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Stamp the quota headers for one limiter check.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, status: &RateLimitStatus) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(status.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(status.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(status.reset_after_secs));
    if status.limited {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(status.reset_after_secs.max(1)));
    }
}

/// Add `token` to `Vary` unless it is already listed (or `*`).
pub fn merge_vary(headers: &mut HeaderMap, token: &'static str) {
    let present = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .any(|t| t == "*" || t.eq_ignore_ascii_case(token));

    if !present {
        headers.append(header::VARY, HeaderValue::from_static(token));
    }
}

type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response;

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    ShieldError::Internal(format!("handler panicked: {}", message)).into_response()
}

/// `CatchPanicLayer` rendering panics as [`ShieldError::Internal`].
pub fn catch_panic_layer() -> CatchPanicLayer<PanicHandler> {
    CatchPanicLayer::custom(panic_response as PanicHandler)
}
