//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define shield metrics (requests, rejections, limiter, compression)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `shield_requests_total` (counter): requests by method, status, route
//! - `shield_request_duration_seconds` (histogram): latency distribution
//! - `shield_gate_rejections_total` (counter): gate rejections by error code
//! - `shield_rate_limited_total` (counter): 429s by key kind (`user`/`ip`)
//! - `shield_counter_store_entries` (gauge): live window records after a sweep
//! - `shield_compression_total` (counter): responses by chosen encoding
//! - `shield_compression_saved_bytes_total` (counter): bytes saved by encoding
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Client keys are never used as labels (unbounded cardinality)

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

const REQUESTS_TOTAL: &str = "shield_requests_total";
const REQUEST_DURATION: &str = "shield_request_duration_seconds";
const GATE_REJECTIONS: &str = "shield_gate_rejections_total";
const RATE_LIMITED: &str = "shield_rate_limited_total";
const STORE_ENTRIES: &str = "shield_counter_store_entries";
const COMPRESSION_TOTAL: &str = "shield_compression_total";
const COMPRESSION_SAVED: &str = "shield_compression_saved_bytes_total";

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), LATENCY_BUCKETS)?
        .install()?;

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route", route.to_string()),
    ];
    counter!(REQUESTS_TOTAL, &labels).increment(1);
    histogram!(REQUEST_DURATION, &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_gate_rejection(code: &'static str) {
    counter!(GATE_REJECTIONS, "code" => code).increment(1);
}

pub fn record_rate_limited(key: &str) {
    counter!(RATE_LIMITED, "kind" => key_kind(key)).increment(1);
}

pub fn record_counter_store_size(entries: usize) {
    gauge!(STORE_ENTRIES).set(entries as f64);
}

/// `encoding` is the applied codec token, or `identity`.
pub fn record_compression(encoding: &'static str, original: usize, compressed: usize) {
    counter!(COMPRESSION_TOTAL, "encoding" => encoding).increment(1);
    if compressed < original {
        counter!(COMPRESSION_SAVED).increment((original - compressed) as u64);
    }
}

fn key_kind(key: &str) -> &'static str {
    match key.split_once(':') {
        Some(("user", _)) => "user",
        Some(("ip", _)) => "ip",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_kind() {
        assert_eq!(key_kind("user:42"), "user");
        assert_eq!(key_kind("ip:10.0.0.1"), "ip");
        assert_eq!(key_kind("ip:unknown"), "ip");
        assert_eq!(key_kind("tenant"), "other");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_request("GET", 200, "default", Instant::now());
        record_gate_rejection("RATE_LIMIT_EXCEEDED");
        record_rate_limited("ip:1.2.3.4");
        record_counter_store_size(3);
        record_compression("gzip", 5_000, 900);
        record_compression("identity", 200, 200);
    }
}
