//! Routing subsystem: per-route gate policies.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → matcher.rs (RequestHead, match conditions)
//!     → router.rs (first matching route by priority)
//!     → Return: (route name, GateOptions), global options if none match
//!
//! Route Compilation (startup and config reload):
//!     RoutePolicyConfig[]
//!     → Sort by priority
//!     → Resolve overrides against [gate]
//!     → Freeze as immutable PolicyRouter
//! ```
//!
//! # Design Decisions
//! - Routers are immutable; the server swaps them atomically on reload
//! - Prefix matching only, no regex
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use matcher::RequestHead;
pub use router::{PolicyRouter, DEFAULT_ROUTE};
