//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ShieldConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps its PolicyRouter atomically
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Gate options are plain data so every call site can override them
//! - An invalid revision is logged and dropped; the running policy stays

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CompressionConfig, GateOptions, ListenerConfig, ObservabilityConfig, RateLimitConfig,
    RoutePolicyConfig, SecurityConfig, ShieldConfig, TimeoutConfig,
};
