//! Request size limits.
//!
//! # Responsibilities
//! - Read the declared `Content-Length`
//! - Reject declared sizes above the configured maximum (413)
//!
//! # Design Decisions
//! - Checked before any body byte is read (early rejection)
//! - Bodies without a declared length are bounded later by the body limit
//!   layer installed by the server
//! - An unparseable length is treated as undeclared, not as an error

use axum::http::{header, HeaderMap};

use crate::error::ShieldError;

/// The declared `Content-Length`, if present and numeric.
pub fn declared_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Reject a request whose declared length exceeds `max`.
pub fn check_declared_size(headers: &HeaderMap, max: u64) -> Result<(), ShieldError> {
    match declared_content_length(headers) {
        Some(size) if size > max => Err(ShieldError::PayloadTooLarge { size, max }),
        _ => Ok(()),
    }
}
