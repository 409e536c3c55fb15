//! Fixed-window rate limiting.
//!
//! Each key owns a window that starts at its first request and closes
//! `window_ms` later; the next request after that opens a fresh window.
//! Windows are discrete, so a caller can land `max_requests` at the end of
//! one window and `max_requests` again right after it rolls over.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::RateLimitConfig;
use crate::error::ShieldError;
use crate::http::response::apply_rate_limit_headers;
use crate::observability::metrics;
use crate::security::key::derive_request_key;
use crate::security::store::{CounterStore, MemoryStore};

/// Default interval between opportunistic sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Millisecond wall clock used for window arithmetic.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Clock backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Result of one limiter check, used to shape the `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u64,
    pub remaining: u64,
    /// Seconds until the current window closes (rounded up).
    pub reset_after_secs: u64,
    pub limited: bool,
}

impl RateLimitStatus {
    pub fn into_error(self) -> ShieldError {
        ShieldError::RateLimitExceeded {
            limit: self.limit,
            retry_after_secs: self.reset_after_secs.max(1),
        }
    }
}

/// Fixed-window limiter over an injected [`CounterStore`].
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    sweep_interval_ms: u64,
    last_sweep_ms: AtomicU64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Limiter over a fresh process-local store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn with_clock(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            store,
            clock,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
            last_sweep_ms: AtomicU64::new(now),
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Count a request for `key`; true once it exceeds `max_requests` in the
    /// current window.
    pub fn is_rate_limited(&self, key: &str, max_requests: u64, window_ms: u64) -> bool {
        self.check(
            key,
            RateLimitConfig {
                max_requests,
                window_ms,
            },
        )
        .limited
    }

    /// Count a request for `key` and report the resulting quota.
    pub fn check(&self, key: &str, limit: RateLimitConfig) -> RateLimitStatus {
        let now = self.clock.now_ms();
        self.maybe_sweep(now);

        let record = self.store.hit(key, now, limit.window_ms);
        let limited = record.count > limit.max_requests;
        if limited {
            tracing::debug!(
                key = %key,
                count = record.count,
                limit = limit.max_requests,
                "Window exhausted"
            );
        }

        RateLimitStatus {
            limit: limit.max_requests,
            remaining: limit.max_requests.saturating_sub(record.count),
            reset_after_secs: record.remaining_ms(now, limit.window_ms).div_ceil(1000),
            limited,
        }
    }

    /// Quota left for `key` without counting a request.
    pub fn remaining_requests(&self, key: &str, max_requests: u64, window_ms: u64) -> u64 {
        let now = self.clock.now_ms();
        match self.store.get(key) {
            Some(record) if !record.is_stale(now, window_ms) => {
                max_requests.saturating_sub(record.count)
            }
            _ => max_requests,
        }
    }

    /// Time until `key`'s current window closes; zero if it has none.
    pub fn reset_after(&self, key: &str, window_ms: u64) -> Duration {
        let now = self.clock.now_ms();
        self.store
            .get(key)
            .map(|record| Duration::from_millis(record.remaining_ms(now, window_ms)))
            .unwrap_or_default()
    }

    fn maybe_sweep(&self, now: u64) {
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) <= self.sweep_interval_ms {
            return;
        }
        // One caller wins the sweep; the others carry on.
        if self
            .last_sweep_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let removed = self.store.sweep(now);
            let remaining = self.store.len();
            tracing::debug!(removed, remaining, "Swept counter store");
            metrics::record_counter_store_size(remaining);
        }
    }
}

/// State for the standalone rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub limit: RateLimitConfig,
}

/// Middleware for handlers that want rate limiting without the full gate.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let key = derive_request_key(request.headers(), peer);
    let status = state.limiter.check(&key, state.limit);

    if status.limited {
        tracing::warn!(client = %key, limit = status.limit, "Rate limit exceeded");
        metrics::record_rate_limited(&key);
        return status.into_error().into_response();
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &status);
    response
}
