//! Security gate: ordered pre-handler checks.
//!
//! # Check Order
//! ```text
//! method   → 405 Method Not Allowed
//! size     → 413 Payload Too Large      (declared Content-Length)
//! rate     → 429 Too Many Requests      (per derived client key)
//! auth     → 401 Unauthorized           (Bearer header present)
//! [sensitive-operation checks, when validate_sensitive_ops is set]
//! ```
//!
//! Each check either lets the request continue or returns a terminal
//! [`ShieldError`]. The first failure wins. A request rejected by a later
//! check still consumed rate-limit quota.

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::GateOptions;
use crate::error::ShieldError;
use crate::http::response::apply_rate_limit_headers;
use crate::observability::metrics;
use crate::routing::{PolicyRouter, RequestHead};
use crate::security::headers::{apply_cors_headers, preflight_response};
use crate::security::key::{bearer_token, derive_request_key, ClientKey};
use crate::security::limits::check_declared_size;
use crate::security::rate_limit::{RateLimitStatus, RateLimiter};

/// The parts of a request the gate inspects.
#[derive(Debug)]
pub struct GateRequest<'a> {
    pub method: &'a Method,
    pub headers: &'a HeaderMap,
    pub peer: Option<SocketAddr>,
}

impl<'a> GateRequest<'a> {
    pub fn new(method: &'a Method, headers: &'a HeaderMap) -> Self {
        Self {
            method,
            headers,
            peer: None,
        }
    }

    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        Self {
            method: request.method(),
            headers: request.headers(),
            peer: request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
        }
    }
}

/// What a passing evaluation learned about the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    pub key: String,
    pub rate: Option<RateLimitStatus>,
}

/// One step of the gate.
pub trait GateCheck: Send + Sync {
    /// Stable name, used in logs and to expose the check order.
    fn name(&self) -> &'static str;

    fn check(
        &self,
        request: &GateRequest<'_>,
        options: &GateOptions,
        outcome: &mut GateOutcome,
    ) -> Result<(), ShieldError>;
}

/// Rejects methods outside `allowed_methods`.
pub struct MethodCheck;

impl GateCheck for MethodCheck {
    fn name(&self) -> &'static str {
        "method"
    }

    fn check(
        &self,
        request: &GateRequest<'_>,
        options: &GateOptions,
        _: &mut GateOutcome,
    ) -> Result<(), ShieldError> {
        let method = request.method.as_str();
        if options
            .allowed_methods
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(method))
        {
            Ok(())
        } else {
            Err(ShieldError::MethodNotAllowed {
                method: method.to_string(),
                allowed: options
                    .allowed_methods
                    .iter()
                    .map(|m| m.to_ascii_uppercase())
                    .collect(),
            })
        }
    }
}

/// Rejects declared payloads above `max_request_size`.
pub struct SizeCheck;

impl GateCheck for SizeCheck {
    fn name(&self) -> &'static str {
        "size"
    }

    fn check(
        &self,
        request: &GateRequest<'_>,
        options: &GateOptions,
        _: &mut GateOutcome,
    ) -> Result<(), ShieldError> {
        check_declared_size(request.headers, options.max_request_size)
    }
}

/// Counts the request against the client's window.
pub struct RateLimitCheck {
    limiter: Arc<RateLimiter>,
}

impl RateLimitCheck {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl GateCheck for RateLimitCheck {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn check(
        &self,
        _: &GateRequest<'_>,
        options: &GateOptions,
        outcome: &mut GateOutcome,
    ) -> Result<(), ShieldError> {
        let status = match &options.rate_limit_scope {
            Some(scope) => self
                .limiter
                .check(&format!("{}#{}", scope, outcome.key), options.rate_limit),
            None => self.limiter.check(&outcome.key, options.rate_limit),
        };
        outcome.rate = Some(status);
        if status.limited {
            metrics::record_rate_limited(&outcome.key);
            Err(status.into_error())
        } else {
            Ok(())
        }
    }
}

/// Requires a well-formed bearer header when `require_auth` is set.
/// Presence only; the token is validated by whoever consumes it.
pub struct AuthCheck;

impl GateCheck for AuthCheck {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn check(
        &self,
        request: &GateRequest<'_>,
        options: &GateOptions,
        _: &mut GateOutcome,
    ) -> Result<(), ShieldError> {
        if options.require_auth && bearer_token(request.headers).is_none() {
            Err(ShieldError::AuthenticationRequired)
        } else {
            Ok(())
        }
    }
}

/// Destructive methods require an identified subject, not just a header.
pub struct SensitiveOperationCheck {
    methods: Vec<Method>,
}

impl Default for SensitiveOperationCheck {
    fn default() -> Self {
        Self {
            methods: vec![Method::DELETE],
        }
    }
}

impl GateCheck for SensitiveOperationCheck {
    fn name(&self) -> &'static str {
        "sensitive_operation"
    }

    fn check(
        &self,
        request: &GateRequest<'_>,
        _: &GateOptions,
        outcome: &mut GateOutcome,
    ) -> Result<(), ShieldError> {
        if self.methods.contains(request.method) && !outcome.key.starts_with("user:") {
            Err(ShieldError::AuthenticationRequired)
        } else {
            Ok(())
        }
    }
}

/// Composed gate over an ordered list of checks.
pub struct SecurityGate {
    checks: Vec<Box<dyn GateCheck>>,
    sensitive: Vec<Box<dyn GateCheck>>,
}

impl SecurityGate {
    /// Gate with the built-in order: method → size → rate → auth.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            checks: vec![
                Box::new(MethodCheck),
                Box::new(SizeCheck),
                Box::new(RateLimitCheck::new(limiter)),
                Box::new(AuthCheck),
            ],
            sensitive: vec![Box::new(SensitiveOperationCheck::default())],
        }
    }

    /// Register a check that runs after the built-ins when
    /// `validate_sensitive_ops` is enabled.
    pub fn with_sensitive_check(mut self, check: impl GateCheck + 'static) -> Self {
        self.sensitive.push(Box::new(check));
        self
    }

    /// Names of the checks in evaluation order.
    pub fn check_names(&self, options: &GateOptions) -> Vec<&'static str> {
        self.active_checks(options).map(|c| c.name()).collect()
    }

    fn active_checks<'s>(
        &'s self,
        options: &GateOptions,
    ) -> impl Iterator<Item = &'s Box<dyn GateCheck>> {
        let sensitive: &[Box<dyn GateCheck>] = if options.validate_sensitive_ops {
            &self.sensitive
        } else {
            &[]
        };
        self.checks.iter().chain(sensitive.iter())
    }

    /// Run every check in order, stopping at the first rejection.
    ///
    /// On rejection the error is returned together with any rate status
    /// gathered before it, so callers can still emit quota headers.
    pub fn evaluate(
        &self,
        request: &GateRequest<'_>,
        options: &GateOptions,
    ) -> Result<GateOutcome, (ShieldError, GateOutcome)> {
        let mut outcome = GateOutcome {
            key: derive_request_key(request.headers, request.peer),
            rate: None,
        };

        for check in self.active_checks(options) {
            if let Err(err) = check.check(request, options, &mut outcome) {
                self.report(check.name(), &err, &outcome, options);
                return Err((err, outcome));
            }
        }
        Ok(outcome)
    }

    fn report(
        &self,
        check: &'static str,
        err: &ShieldError,
        outcome: &GateOutcome,
        options: &GateOptions,
    ) {
        metrics::record_gate_rejection(err.code());
        if options.log_security_events {
            tracing::warn!(
                check,
                code = err.code(),
                client = %outcome.key,
                "Request rejected by security gate"
            );
        } else {
            tracing::debug!(
                check,
                code = err.code(),
                client = %outcome.key,
                "Request rejected by security gate"
            );
        }
    }
}

/// State for [`security_gate_middleware`].
#[derive(Clone)]
pub struct GateState {
    pub gate: Arc<SecurityGate>,
    pub policies: Arc<ArcSwap<PolicyRouter>>,
}

/// Gate middleware: preflight exemption, evaluation, response headers.
pub async fn security_gate_middleware(
    State(state): State<GateState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return preflight_response();
    }

    let (route, options) = state
        .policies
        .load()
        .options_for(&RequestHead::from_request(&request));

    let outcome = match state.gate.evaluate(&GateRequest::from_request(&request), &options) {
        Ok(outcome) => outcome,
        Err((err, outcome)) => {
            tracing::debug!(route = %route, "Gate short-circuit");
            let mut response = err.into_response();
            if let Some(status) = outcome.rate.filter(|s| !s.limited) {
                apply_rate_limit_headers(response.headers_mut(), &status);
            }
            apply_cors_headers(response.headers_mut());
            return response;
        }
    };

    let rate = outcome.rate;
    request.extensions_mut().insert(ClientKey(outcome.key));
    request.extensions_mut().insert(options);

    let mut response = next.run(request).await;
    if let Some(status) = rate {
        apply_rate_limit_headers(response.headers_mut(), &status);
    }
    apply_cors_headers(response.headers_mut());
    response
}
