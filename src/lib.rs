//! Request-shielding middleware for axum edge services.
//!
//! - [`security`]: fixed-window rate limiting, identity keys, the composed
//!   security gate and input sanitization
//! - [`compression`]: `Accept-Encoding` negotiation and streamed encoding
//! - [`routing`]: per-route gate policies
//! - [`http`]: the edge server wiring every layer together

pub mod compression;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::ShieldConfig;
pub use error::ShieldError;
pub use http::ShieldServer;
pub use lifecycle::Shutdown;
