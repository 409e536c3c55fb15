//! Route matching logic.
//!
//! # Responsibilities
//! - Match host header (exact match, case-insensitive, port ignored)
//! - Match path prefix on segment boundaries (case-sensitive)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Matchers see a [`RequestHead`], never the body
//! - Empty condition list = always matches (wildcard)
//! - No regex in the hot path

use axum::http::{header, Request};

/// The routing-relevant view of a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    pub host: Option<&'a str>,
    pub path: &'a str,
}

impl<'a> RequestHead<'a> {
    pub fn new(host: Option<&'a str>, path: &'a str) -> Self {
        Self { host, path }
    }

    /// Host from the `Host` header, falling back to the URI authority.
    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| request.uri().host());
        Self {
            host,
            path: request.uri().path(),
        }
    }
}

/// Condition evaluated against a request head.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    fn matches(&self, head: &RequestHead<'_>) -> bool;
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, head: &RequestHead<'_>) -> bool {
        head.host
            .map(|h| strip_port(h).eq_ignore_ascii_case(&self.expected_host))
            .unwrap_or(false)
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// A trailing `/` on the prefix is ignored.
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        while prefix.len() > 1 && prefix.ends_with('/') {
            prefix.pop();
        }
        Self { prefix }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, head: &RequestHead<'_>) -> bool {
        if self.prefix == "/" {
            return true;
        }
        match head.path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, head: &RequestHead<'_>) -> bool {
        self.matchers.iter().all(|m| m.matches(head))
    }
}
