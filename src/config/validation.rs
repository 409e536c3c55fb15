//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and references.
//! Every violation is collected so one run reports the whole list.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::Method;
use thiserror::Error;

use crate::config::schema::{GateOptions, RateLimitConfig, ShieldConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{scope}: {field} must be greater than zero")]
    Zero { scope: String, field: &'static str },

    #[error("{scope}: unknown HTTP method '{method}'")]
    InvalidMethod { scope: String, method: String },

    #[error("{scope}: allowed_methods is empty")]
    NoMethods { scope: String },

    #[error("route '{0}' is defined more than once")]
    DuplicateRoute(String),

    #[error("route '{0}' has neither host nor path_prefix")]
    UnscopedRoute(String),

    #[error("compression.level must be between 0 and 9, got {0}")]
    CompressionLevel(u32),

    #[error("observability.log_format must be 'pretty' or 'json', got '{0}'")]
    LogFormat(String),
}

/// Validate a configuration, returning every violation found.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if SocketAddr::from_str(&config.listener.bind_address).is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && SocketAddr::from_str(&config.observability.metrics_address).is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }
    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::LogFormat(config.observability.log_format.clone()));
    }

    validate_gate("gate", &config.gate, &mut errors);

    let mut names = HashSet::new();
    for route in &config.routes {
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }
        if route.host.is_none() && route.path_prefix.is_none() {
            errors.push(ValidationError::UnscopedRoute(route.name.clone()));
        }
        let scope = format!("routes.{}", route.name);
        validate_gate(&scope, &route.apply(&config.gate), &mut errors);
    }

    if config.compression.level > 9 {
        errors.push(ValidationError::CompressionLevel(config.compression.level));
    }
    if config.compression.chunk_size == 0 {
        errors.push(ValidationError::Zero {
            scope: "compression".into(),
            field: "chunk_size",
        });
    }
    if config.security.sweep_interval_secs == 0 {
        errors.push(ValidationError::Zero {
            scope: "security".into(),
            field: "sweep_interval_secs",
        });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero {
            scope: "timeouts".into(),
            field: "request_secs",
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_gate(scope: &str, options: &GateOptions, errors: &mut Vec<ValidationError>) {
    if options.max_request_size == 0 {
        errors.push(ValidationError::Zero {
            scope: scope.to_string(),
            field: "max_request_size",
        });
    }
    if options.allowed_methods.is_empty() {
        errors.push(ValidationError::NoMethods { scope: scope.to_string() });
    }
    for method in &options.allowed_methods {
        if Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err() {
            errors.push(ValidationError::InvalidMethod {
                scope: scope.to_string(),
                method: method.clone(),
            });
        }
    }
    validate_rate_limit(scope, &options.rate_limit, errors);
}

fn validate_rate_limit(scope: &str, limit: &RateLimitConfig, errors: &mut Vec<ValidationError>) {
    if limit.max_requests == 0 {
        errors.push(ValidationError::Zero {
            scope: scope.to_string(),
            field: "rate_limit.max_requests",
        });
    }
    if limit.window_ms == 0 {
        errors.push(ValidationError::Zero {
            scope: scope.to_string(),
            field: "rate_limit.window_ms",
        });
    }
}
