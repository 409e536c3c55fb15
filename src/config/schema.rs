//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the shield.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the request shield.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShieldConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Default gate options applied to every protected route.
    pub gate: GateOptions,

    /// Per-route overrides of the default gate options.
    pub routes: Vec<RoutePolicyConfig>,

    /// Response compression settings.
    pub compression: CompressionConfig,

    /// Security hardening settings.
    pub security: SecurityConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Fixed-window rate limit for a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per window.
    pub max_requests: u64,

    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_ms: 60_000,
        }
    }
}

/// Options of the security gate. Overridable per route.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GateOptions {
    /// Largest accepted `Content-Length`, in bytes.
    pub max_request_size: u64,

    /// Methods admitted by the gate (case-insensitive).
    pub allowed_methods: Vec<String>,

    /// Require a well-formed `Authorization: Bearer` header.
    pub require_auth: bool,

    /// Rate limit applied per derived client key.
    pub rate_limit: RateLimitConfig,

    /// Sanitize JSON request bodies before they reach the handler.
    /// The gate itself never rewrites bodies; the server installs the
    /// sanitizing layer when this is set.
    pub sanitize_input: bool,

    /// Log rejections at `warn` instead of `debug`.
    pub log_security_events: bool,

    /// Run the registered sensitive-operation checks after the built-in ones.
    pub validate_sensitive_ops: bool,

    /// Limiter bucket namespace. Set for routes that override `rate_limit`
    /// so their windows are counted apart from the global one.
    #[serde(skip)]
    pub rate_limit_scope: Option<String>,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            max_request_size: 1024 * 1024, // 1 MiB
            allowed_methods: ["POST", "GET", "PUT", "DELETE"]
                .into_iter()
                .map(String::from)
                .collect(),
            require_auth: true,
            rate_limit: RateLimitConfig::default(),
            sanitize_input: true,
            log_security_events: true,
            validate_sensitive_ops: false,
            rate_limit_scope: None,
        }
    }
}

/// Route-scoped overrides of [`GateOptions`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RoutePolicyConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Host header to match (exact match).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    pub max_request_size: Option<u64>,
    pub allowed_methods: Option<Vec<String>>,
    pub require_auth: Option<bool>,
    pub rate_limit: Option<RateLimitConfig>,
    pub validate_sensitive_ops: Option<bool>,
}

impl RoutePolicyConfig {
    /// Layer this route's overrides on top of the default options.
    pub fn apply(&self, base: &GateOptions) -> GateOptions {
        let mut options = base.clone();
        if let Some(size) = self.max_request_size {
            options.max_request_size = size;
        }
        if let Some(methods) = &self.allowed_methods {
            options.allowed_methods = methods.clone();
        }
        if let Some(require_auth) = self.require_auth {
            options.require_auth = require_auth;
        }
        if let Some(rate_limit) = self.rate_limit {
            options.rate_limit = rate_limit;
            options.rate_limit_scope = Some(self.name.clone());
        }
        if let Some(validate) = self.validate_sensitive_ops {
            options.validate_sensitive_ops = validate;
        }
        options
    }
}

/// Response compression configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Enable response compression.
    pub enabled: bool,

    /// Payloads must be strictly larger than this to be compressed.
    pub min_size: usize,

    /// Codec level (0-9).
    pub level: u32,

    /// Bytes fed to the encoder per step.
    pub chunk_size: usize,

    /// Largest response body buffered for compression.
    pub max_buffer_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: 1024,
            level: 6,
            chunk_size: 16 * 1024,
            max_buffer_size: 16 * 1024 * 1024,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Add hardening response headers.
    pub enable_headers: bool,

    /// Interval between opportunistic sweeps of the counter store, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            sweep_interval_secs: 60,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_defaults() {
        let options = GateOptions::default();
        assert_eq!(options.max_request_size, 1_048_576);
        assert_eq!(options.allowed_methods, vec!["POST", "GET", "PUT", "DELETE"]);
        assert!(options.require_auth);
        assert_eq!(options.rate_limit.max_requests, 60);
        assert_eq!(options.rate_limit.window_ms, 60_000);
    }

    #[test]
    fn test_minimal_toml() {
        let config: ShieldConfig = toml::from_str(
            r#"
            [gate]
            require_auth = false

            [[routes]]
            name = "uploads"
            path_prefix = "/api/upload"
            max_request_size = 10485760
            rate_limit = { max_requests = 5, window_ms = 1000 }
            "#,
        )
        .unwrap();

        assert!(!config.gate.require_auth);
        assert_eq!(config.gate.rate_limit.max_requests, 60);
        assert_eq!(config.routes.len(), 1);

        let upload = config.routes[0].apply(&config.gate);
        assert_eq!(upload.max_request_size, 10 * 1024 * 1024);
        assert_eq!(upload.rate_limit.max_requests, 5);
        assert!(!upload.require_auth);
    }
}
