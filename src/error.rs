//! Shield error taxonomy and its HTTP rendering.
//!
//! Every gate rejection is terminal for the current request and is rendered
//! as a JSON body `{ error, code?, details? }`. Only `RateLimitExceeded` is
//! recoverable by the caller, after `Retry-After`.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::http::response::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};

/// Errors produced by the shield layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShieldError {
    #[error("Rate limit exceeded")]
    RateLimitExceeded {
        limit: u64,
        retry_after_secs: u64,
    },

    #[error("Method {method} not allowed")]
    MethodNotAllowed {
        method: String,
        allowed: Vec<String>,
    },

    #[error("Request payload too large ({size} > {max} bytes)")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("Authentication required")]
    AuthenticationRequired,

    /// Unexpected failure inside a handler that ran after the gate passed.
    /// The message is logged, never sent to the caller.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// JSON body attached to every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ShieldError {
    pub fn status(&self) -> StatusCode {
        match self {
            ShieldError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ShieldError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ShieldError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ShieldError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ShieldError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code, also used as the metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            ShieldError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            ShieldError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            ShieldError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ShieldError::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            ShieldError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ShieldError::RateLimitExceeded { limit, retry_after_secs } => Some(json!({
                "limit": limit,
                "remaining": 0,
                "retryAfter": retry_after_secs,
            })),
            ShieldError::MethodNotAllowed { method, allowed } => Some(json!({
                "method": method,
                "allowed": allowed,
            })),
            ShieldError::PayloadTooLarge { size, max } => Some(json!({
                "size": size,
                "maxSize": max,
            })),
            ShieldError::AuthenticationRequired | ShieldError::Internal(_) => None,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let error = match self {
            ShieldError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            error,
            code: Some(self.code()),
            details: self.details(),
        }
    }

    fn extra_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match self {
            ShieldError::RateLimitExceeded { limit, retry_after_secs } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
                headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(*limit));
                headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u64));
                headers.insert(X_RATELIMIT_RESET, HeaderValue::from(*retry_after_secs));
            }
            ShieldError::MethodNotAllowed { allowed, .. } => {
                if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                    headers.insert(header::ALLOW, value);
                }
            }
            ShieldError::Internal(message) => {
                tracing::error!(error = %message, "Handler failed");
            }
            _ => {}
        }
        headers
    }
}

impl IntoResponse for ShieldError {
    fn into_response(self) -> Response {
        let headers = self.extra_headers();
        (self.status(), headers, Json(self.body())).into_response()
    }
}
