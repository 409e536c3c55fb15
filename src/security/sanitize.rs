//! Best-effort input sanitization.
//!
//! Pattern stripping over a fixed denylist: `<script>`, `<iframe>`,
//! `<object>`, `<embed>` blocks, standalone `<link>`/`<meta>` tags,
//! `javascript:`/`data:`/`vbscript:` prefixes and inline `on*=` handlers.
//!
//! This is defense in depth, not an XSS boundary. Output must still be
//! escaped (see [`escape_html`]) wherever it is rendered as markup.
//! Nothing here fails: malformed input degrades to a cleaned string.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::config::GateOptions;
use crate::error::ShieldError;
use crate::security::limits::declared_content_length;

/// Tags kept by [`sanitize_html_content`] when basic tags are allowed.
pub const BASIC_TAGS: &[&str] = &[
    "p", "br", "strong", "em", "b", "i", "u", "ul", "ol", "li", "h1", "h2", "h3", "h4", "h5",
    "h6", "blockquote", "code", "pre", "span", "div",
];

/// Upper bound on denylist passes over one string.
const MAX_PASSES: usize = 4;

/// Largest JSON body rewritten when no gate has resolved a route policy.
const DEFAULT_SANITIZED_BODY: u64 = 4 * 1024 * 1024;

static BLOCKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["script", "iframe", "object", "embed"]
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                .expect("static block pattern")
        })
        .collect()
});

static STANDALONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(?:link|meta)\b[^>]*>").expect("static tag pattern"));

static PROTOCOLS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:javascript|data|vbscript)\s*:").expect("static protocol pattern")
});

static EVENT_HANDLERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bon\w+\s*=").expect("static handler pattern"));

static ANY_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?([a-zA-Z][a-zA-Z0-9]*)\b[^>]*>").expect("static tag pattern"));

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("static whitespace pattern"));

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern"));

/// Repeat `pass` until the text stops changing or `MAX_PASSES` is reached.
fn until_stable(input: &str, pass: impl Fn(&str) -> String) -> String {
    let mut current = input.to_string();
    for _ in 0..MAX_PASSES {
        let next = pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn strip_dangerous(text: &str) -> String {
    let mut out = text.to_string();
    for block in BLOCKS.iter() {
        out = block.replace_all(&out, "").into_owned();
    }
    out = STANDALONE.replace_all(&out, "").into_owned();
    strip_attributes(&out)
}

fn strip_attributes(text: &str) -> String {
    let out = PROTOCOLS.replace_all(text, "");
    EVENT_HANDLERS.replace_all(&out, "").into_owned()
}

/// Clean a single string and collapse its whitespace.
pub fn sanitize_str(input: &str) -> String {
    let cleaned = until_stable(input, strip_dangerous);
    WHITESPACE.replace_all(&cleaned, " ").trim().to_string()
}

/// Recursively sanitize a JSON value: strings are cleaned, arrays
/// element-wise, objects on both keys and values. Other values pass through.
///
/// Two keys that clean to the same string collapse; the later one wins.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (sanitize_str(&k), sanitize(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

/// Sanitize rich-text content. With `allow_basic_tags` only [`BASIC_TAGS`]
/// survive; otherwise every tag is removed. Dangerous blocks, protocols and
/// event handlers are stripped either way.
pub fn sanitize_html_content(text: &str, allow_basic_tags: bool) -> String {
    let pass = |input: &str| {
        let mut out = input.to_string();
        for block in BLOCKS.iter() {
            out = block.replace_all(&out, "").into_owned();
        }
        let out = ANY_TAG.replace_all(&out, |caps: &Captures<'_>| {
            let tag = caps[1].to_ascii_lowercase();
            if allow_basic_tags && BASIC_TAGS.contains(&tag.as_str()) {
                caps[0].to_string()
            } else {
                String::new()
            }
        });
        strip_attributes(&out)
    };
    until_stable(text, pass).trim().to_string()
}

/// Loose email shape check: `local@domain.tld`, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email.trim())
}

/// True when the string parses as an absolute URL.
pub fn is_valid_url(candidate: &str) -> bool {
    url::Url::parse(candidate.trim()).is_ok()
}

/// Escape the five HTML-reserved characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn is_json(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            essence == "application/json" || essence.ends_with("+json")
        })
        .unwrap_or(false)
}

/// Middleware that sanitizes JSON request bodies in place.
///
/// Bodies are buffered up to the `max_request_size` of the route policy the
/// gate resolved. Non-JSON requests and bodies that do not parse are
/// forwarded untouched.
pub async fn sanitize_json_middleware(request: Request<Body>, next: Next) -> Response {
    if !is_json(&request) {
        return next.run(request).await;
    }

    let limit = request
        .extensions()
        .get::<Arc<GateOptions>>()
        .map_or(DEFAULT_SANITIZED_BODY, |options| options.max_request_size);

    let (mut parts, body) = request.into_parts();
    let bytes = match to_bytes(body, usize::try_from(limit).unwrap_or(usize::MAX)).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, limit, "JSON body too large to sanitize");
            return ShieldError::PayloadTooLarge {
                size: declared_content_length(&parts.headers).unwrap_or(limit.saturating_add(1)),
                max: limit,
            }
            .into_response();
        }
    };

    let rewritten = match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) => match serde_json::to_vec(&sanitize(value)) {
            Ok(clean) => Bytes::from(clean),
            Err(_) => bytes,
        },
        Err(_) => bytes,
    };

    parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(rewritten.len()));
    next.run(Request::from_parts(parts, Body::from(rewritten))).await
}
