//! Per-response compression decisions.
//!
//! # Responsibilities
//! - Decide whether a payload is worth compressing (type allow-list, size)
//! - Pick the codec from `Accept-Encoding`
//! - Encode through the chunk stream and report sizes in headers
//!
//! # Design Decisions
//! - Identity is sent when encoding does not shrink the payload
//! - Encoder failures degrade to identity; a response is never lost to them
//! - `Vary: Accept-Encoding` is set on every shaped response
//! - Bodies whose size is not bounded by `max_buffer_size` stream through as
//!   identity; buffering never replaces a finished response with an error

use std::pin::pin;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body, Bytes, HttpBody},
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;

use crate::compression::codec::{chunked, encode_stream, select_codec, Codec};
use crate::config::CompressionConfig;
use crate::error::ShieldError;
use crate::http::response::merge_vary;
use crate::observability::metrics;

pub const X_ORIGINAL_SIZE: HeaderName = HeaderName::from_static("x-original-size");
pub const X_COMPRESSED_SIZE: HeaderName = HeaderName::from_static("x-compressed-size");
pub const X_COMPRESSION_RATIO: HeaderName = HeaderName::from_static("x-compression-ratio");

const COMPRESSIBLE_TYPES: &[&str] = &[
    "text/html",
    "text/css",
    "text/plain",
    "text/javascript",
    "text/xml",
    "text/csv",
    "application/javascript",
    "application/x-javascript",
    "application/json",
    "application/xml",
    "image/svg+xml",
];

/// Media type without parameters, lowercased.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// True for textual and structured types that compress well.
pub fn is_compressible_type(content_type: &str) -> bool {
    let essence = essence(content_type);
    COMPRESSIBLE_TYPES.contains(&essence.as_str())
        || essence.starts_with("font/")
        || essence.starts_with("application/font-")
        || essence.starts_with("application/x-font-")
        || essence.ends_with("+json")
        || essence.ends_with("+xml")
}

/// An encoded (or passed-through) payload and its sizing.
#[derive(Debug, Clone)]
pub struct CompressedPayload {
    pub body: Bytes,
    pub content_type: HeaderValue,
    /// `None` when sent as identity.
    pub codec: Option<Codec>,
    pub original_size: usize,
    pub compressed_size: usize,
}

impl CompressedPayload {
    /// `compressed / original`, two decimals.
    pub fn ratio(&self) -> String {
        if self.original_size == 0 {
            return "1.00".to_string();
        }
        format!("{:.2}", self.compressed_size as f64 / self.original_size as f64)
    }

    /// Content headers for this payload. Existing `Vary` tokens are kept.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(header::CONTENT_TYPE, self.content_type.clone());
        merge_vary(headers, "accept-encoding");
        headers.insert(X_ORIGINAL_SIZE, HeaderValue::from(self.original_size));
        headers.insert(X_COMPRESSED_SIZE, HeaderValue::from(self.compressed_size));
        headers.remove(header::CONTENT_LENGTH);

        match self.codec {
            Some(codec) => {
                headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(codec.token()));
                if let Ok(ratio) = HeaderValue::from_str(&self.ratio()) {
                    headers.insert(X_COMPRESSION_RATIO, ratio);
                }
            }
            None => {
                headers.remove(header::CONTENT_ENCODING);
                headers.remove(X_COMPRESSION_RATIO);
            }
        }
    }
}

impl IntoResponse for CompressedPayload {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        self.apply_headers(&mut headers);
        (headers, self.body).into_response()
    }
}

/// Compression policy built from [`CompressionConfig`].
#[derive(Debug, Clone)]
pub struct CompressionNegotiator {
    config: CompressionConfig,
}

impl CompressionNegotiator {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Size must exceed `min_size` and the type must be on the allow-list.
    pub fn is_compressible(&self, content_type: &str, len: usize) -> bool {
        self.config.enabled && len > self.config.min_size && is_compressible_type(content_type)
    }

    /// The codec to use, or `None` for identity.
    pub fn negotiate(
        &self,
        content_type: &str,
        len: usize,
        accept_encoding: Option<&str>,
    ) -> Option<Codec> {
        if !self.is_compressible(content_type, len) {
            return None;
        }
        select_codec(accept_encoding)
    }

    /// Decide, encode and size one payload. Never fails.
    pub async fn compress(
        &self,
        content_type: &str,
        body: Bytes,
        accept_encoding: Option<&str>,
    ) -> CompressedPayload {
        let original_size = body.len();
        let content_type = HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        let codec = content_type
            .to_str()
            .ok()
            .and_then(|ct| self.negotiate(ct, original_size, accept_encoding));

        let encoded = match codec {
            Some(codec) => match self.encode(codec, body.clone()).await {
                Ok(out) if out.len() < original_size => Some((codec, out)),
                Ok(out) => {
                    tracing::debug!(
                        codec = codec.token(),
                        original_size,
                        encoded_size = out.len(),
                        "Encoding did not shrink payload, sending identity"
                    );
                    None
                }
                Err(e) => {
                    tracing::warn!(
                        codec = codec.token(),
                        error = %e,
                        "Compression failed, sending identity"
                    );
                    None
                }
            },
            None => None,
        };

        let payload = match encoded {
            Some((codec, out)) => CompressedPayload {
                compressed_size: out.len(),
                body: out,
                content_type,
                codec: Some(codec),
                original_size,
            },
            None => CompressedPayload {
                compressed_size: original_size,
                body,
                content_type,
                codec: None,
                original_size,
            },
        };

        metrics::record_compression(
            payload.codec.map_or("identity", Codec::token),
            payload.original_size,
            payload.compressed_size,
        );
        payload
    }

    /// Drive the encoder stream to completion.
    async fn encode(&self, codec: Codec, body: Bytes) -> std::io::Result<Bytes> {
        let input = chunked(body, self.config.chunk_size);
        let mut stream = pin!(encode_stream(codec, self.config.level, input));
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(out))
    }
}

fn skip_compression(method: &Method, response: &Response) -> bool {
    method == Method::HEAD
        || matches!(response.status(), StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED)
        || response.headers().contains_key(header::CONTENT_ENCODING)
}

/// Body length when known without reading it.
fn known_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .or_else(|| response.body().size_hint().exact())
}

/// Headers for a response sent as identity without buffering.
fn pass_through(mut response: Response, len: Option<u64>) -> Response {
    let headers = response.headers_mut();
    merge_vary(headers, "accept-encoding");
    if let Some(len) = len {
        headers.insert(X_ORIGINAL_SIZE, HeaderValue::from(len));
        headers.insert(X_COMPRESSED_SIZE, HeaderValue::from(len));
    }
    response
}

/// Compress handler responses per the caller's `Accept-Encoding`.
///
/// Compressible bodies whose size is bounded by `max_buffer_size` are
/// buffered and encoded. Everything else streams through as identity.
pub async fn compression_middleware(
    State(negotiator): State<Arc<CompressionNegotiator>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let accept_encoding = request
        .headers()
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let response = next.run(request).await;
    if skip_compression(&method, &response) {
        return response;
    }

    let len = known_length(&response);
    let max = negotiator.config().max_buffer_size as u64;
    let fits = match (len, response.body().size_hint().upper()) {
        (Some(len), _) => len <= max,
        (None, Some(upper)) => upper <= max,
        (None, None) => false,
    };

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|ct| is_compressible_type(ct))
        .map(str::to_string);

    let content_type = match content_type {
        Some(ct) if fits => ct,
        _ => return pass_through(response, len),
    };

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, negotiator.config().max_buffer_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return ShieldError::Internal(format!("failed to read response body: {}", e))
                .into_response();
        }
    };

    let payload = negotiator
        .compress(&content_type, bytes, accept_encoding.as_deref())
        .await;
    payload.apply_headers(&mut parts.headers);
    Response::from_parts(parts, Body::from(payload.body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn json_payload(len: usize) -> Bytes {
        let mut body = String::from("[");
        let mut i = 0;
        while body.len() < len - 40 {
            body.push_str(&format!(r#"{{"id":{},"status":"active"}},"#, i));
            i += 1;
        }
        body.push_str(r#"{"id":-1,"status":"end"}]"#);
        Bytes::from(body)
    }

    fn negotiator() -> CompressionNegotiator {
        CompressionNegotiator::new(CompressionConfig::default())
    }

    #[test]
    fn test_compressible_types() {
        for ct in [
            "text/html; charset=utf-8",
            "application/json",
            "application/problem+json",
            "application/atom+xml",
            "image/svg+xml",
            "text/csv",
            "font/woff2",
            "application/x-font-ttf",
        ] {
            assert!(is_compressible_type(ct), "{}", ct);
        }
        for ct in ["image/png", "application/octet-stream", "video/mp4", ""] {
            assert!(!is_compressible_type(ct), "{}", ct);
        }
    }

    #[test]
    fn test_size_threshold_is_strict() {
        let n = negotiator();
        assert!(!n.is_compressible("application/json", 1024));
        assert!(n.is_compressible("application/json", 1025));
    }

    #[tokio::test]
    async fn test_small_payload_is_identity() {
        let body = json_payload(200);
        let payload = negotiator()
            .compress("application/json", body.clone(), Some("gzip, deflate"))
            .await;
        assert!(payload.codec.is_none());
        assert_eq!(payload.body, body);

        let mut headers = HeaderMap::new();
        payload.apply_headers(&mut headers);
        assert!(headers.get(header::CONTENT_ENCODING).is_none());
        assert_eq!(headers.get(header::VARY).unwrap(), "accept-encoding");
    }

    #[tokio::test]
    async fn test_large_payload_prefers_gzip() {
        let body = json_payload(5_000);
        let payload = negotiator()
            .compress("application/json", body.clone(), Some("deflate, gzip"))
            .await;
        assert_eq!(payload.codec, Some(Codec::Gzip));
        assert!(payload.compressed_size < payload.original_size);

        let mut headers = HeaderMap::new();
        payload.apply_headers(&mut headers);
        assert_eq!(headers.get(header::CONTENT_ENCODING).unwrap(), "gzip");
        let original: usize = headers[X_ORIGINAL_SIZE].to_str().unwrap().parse().unwrap();
        let compressed: usize = headers[X_COMPRESSED_SIZE].to_str().unwrap().parse().unwrap();
        assert_eq!(original, body.len());
        assert!(compressed < original);
        assert!(headers.contains_key(X_COMPRESSION_RATIO));

        let mut decoded = Vec::new();
        GzDecoder::new(&payload.body[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, body);
    }

    #[tokio::test]
    async fn test_no_accept_encoding_keeps_sizes_equal() {
        let payload = negotiator()
            .compress("application/json", json_payload(5_000), None)
            .await;
        let mut headers = HeaderMap::new();
        payload.apply_headers(&mut headers);
        assert!(headers.get(header::CONTENT_ENCODING).is_none());
        assert_eq!(headers[X_ORIGINAL_SIZE], headers[X_COMPRESSED_SIZE]);
        assert!(headers.get(X_COMPRESSION_RATIO).is_none());
    }

    #[tokio::test]
    async fn test_incompressible_output_falls_back() {
        // pseudo-random bytes do not shrink
        let mut state: u32 = 0x9e37_79b9;
        let noise: Vec<u8> = (0..4096)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state & 0xff) as u8
            })
            .collect();
        let payload = negotiator()
            .compress("text/plain", Bytes::from(noise), Some("gzip"))
            .await;
        assert!(payload.codec.is_none());
        assert_eq!(payload.compressed_size, payload.original_size);
    }

    #[tokio::test]
    async fn test_disabled_config() {
        let negotiator = CompressionNegotiator::new(CompressionConfig {
            enabled: false,
            ..CompressionConfig::default()
        });
        let payload = negotiator
            .compress("application/json", json_payload(5_000), Some("gzip"))
            .await;
        assert!(payload.codec.is_none());
    }

    #[test]
    fn test_ratio_format() {
        let payload = CompressedPayload {
            body: Bytes::new(),
            content_type: HeaderValue::from_static("text/plain"),
            codec: Some(Codec::Gzip),
            original_size: 5000,
            compressed_size: 1234,
        };
        assert_eq!(payload.ratio(), "0.25");
    }
}
