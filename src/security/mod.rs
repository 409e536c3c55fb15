//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → gate.rs (OPTIONS preflight short-circuit)
//!     → gate.rs (ordered checks: method, size, rate limit, auth)
//!         key.rs        (derive user:/ip: identity)
//!         limits.rs     (declared Content-Length)
//!         rate_limit.rs (fixed window over store.rs)
//!     → sanitize.rs (JSON body rewrite, optional)
//!     → Handler
//!     → headers.rs (CORS + hardening headers)
//! ```
//!
//! # Design Decisions
//! - Fail closed: the first failing check ends the request
//! - Rate-limit state is process-local
//! - Bearer tokens are decoded, never verified

pub mod gate;
pub mod headers;
pub mod key;
pub mod limits;
pub mod rate_limit;
pub mod sanitize;
pub mod store;

pub use gate::{security_gate_middleware, GateState, SecurityGate};
pub use key::{derive_request_key, ClientKey};
pub use rate_limit::{RateLimitStatus, RateLimiter};
pub use sanitize::{escape_html, is_valid_email, is_valid_url, sanitize, sanitize_html_content};
pub use store::{CounterStore, MemoryStore, WindowRecord};
