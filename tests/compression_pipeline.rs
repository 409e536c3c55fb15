//! Response compression through the full router.

mod common;

use std::io::Read;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use common::{app, bearer, body_bytes, header, send};
use flate2::read::{GzDecoder, ZlibDecoder};
use request_shield::config::{CompressionConfig, ShieldConfig};
use request_shield::ShieldServer;
use serde_json::Value;

fn report(rows: usize, accept: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(format!("/api/report?rows={}", rows))
        .header(header::AUTHORIZATION, bearer("reporter"));
    if let Some(accept) = accept {
        builder = builder.header(header::ACCEPT_ENCODING, accept);
    }
    builder.body(Body::empty()).unwrap()
}

fn size(response: &axum::http::Response<Body>, name: &str) -> usize {
    header(response, name).unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_large_report_is_gzipped() {
    let app = app(ShieldConfig::default());

    let response = send(&app, report(200, Some("gzip, deflate, br"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-encoding"), Some("gzip"));
    assert_eq!(header(&response, "vary"), Some("accept-encoding"));
    assert!(header(&response, "x-compression-ratio").is_some());
    // gate headers survive compression
    assert_eq!(header(&response, "x-ratelimit-remaining"), Some("59"));

    let original = size(&response, "x-original-size");
    let compressed = size(&response, "x-compressed-size");
    assert!(compressed < original);

    let body = body_bytes(response).await;
    assert_eq!(body.len(), compressed);
    let mut decoded = String::new();
    GzDecoder::new(&body[..]).read_to_string(&mut decoded).unwrap();
    assert_eq!(decoded.len(), original);
    let json: Value = serde_json::from_str(&decoded).unwrap();
    assert_eq!(json["rows"], 200);
}

#[tokio::test]
async fn test_deflate_when_gzip_refused() {
    let app = app(ShieldConfig::default());

    let response = send(&app, report(200, Some("gzip;q=0, deflate"))).await;
    assert_eq!(header(&response, "content-encoding"), Some("deflate"));

    let body = body_bytes(response).await;
    let mut decoded = String::new();
    ZlibDecoder::new(&body[..]).read_to_string(&mut decoded).unwrap();
    assert!(decoded.starts_with('{'));
}

#[tokio::test]
async fn test_identity_without_accept_encoding() {
    let app = app(ShieldConfig::default());

    let response = send(&app, report(200, None)).await;
    assert!(header(&response, "content-encoding").is_none());
    assert_eq!(header(&response, "vary"), Some("accept-encoding"));
    assert_eq!(size(&response, "x-original-size"), size(&response, "x-compressed-size"));
}

#[tokio::test]
async fn test_small_body_not_compressed() {
    let app = app(ShieldConfig::default());

    let response = send(&app, report(1, Some("gzip"))).await;
    assert!(header(&response, "content-encoding").is_none());
    assert!(size(&response, "x-original-size") <= 1024);
}

#[tokio::test]
async fn test_compression_disabled() {
    let config = ShieldConfig {
        compression: CompressionConfig {
            enabled: false,
            ..CompressionConfig::default()
        },
        ..ShieldConfig::default()
    };
    let app = app(config);

    let response = send(&app, report(200, Some("gzip"))).await;
    assert!(header(&response, "content-encoding").is_none());
}

#[tokio::test]
async fn test_body_over_buffer_limit_passes_through() {
    let config = ShieldConfig {
        compression: CompressionConfig {
            max_buffer_size: 4096,
            ..CompressionConfig::default()
        },
        ..ShieldConfig::default()
    };
    let app = app(config);

    let response = send(&app, report(200, Some("gzip"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "content-encoding").is_none());
    assert_eq!(header(&response, "vary"), Some("accept-encoding"));

    let original = size(&response, "x-original-size");
    assert!(original > 4096);
    assert_eq!(size(&response, "x-compressed-size"), original);

    let body = body_bytes(response).await;
    assert_eq!(body.len(), original);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["rows"], 200);
}

async fn logo() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], vec![0u8; 4096])
}

#[tokio::test]
async fn test_non_compressible_type_reports_sizes() {
    let app = ShieldServer::new(ShieldConfig::default())
        .router_with(Router::new().route("/api/logo.png", get(logo)));

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/logo.png")
        .header(header::AUTHORIZATION, bearer("viewer"))
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "content-encoding").is_none());
    assert_eq!(header(&response, "content-type"), Some("image/png"));
    assert_eq!(header(&response, "vary"), Some("accept-encoding"));
    assert_eq!(size(&response, "x-original-size"), 4096);
    assert_eq!(size(&response, "x-compressed-size"), 4096);
    assert_eq!(body_bytes(response).await.len(), 4096);
}
