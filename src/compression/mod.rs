//! Response compression subsystem.
//!
//! # Data Flow
//! ```text
//! Handler response
//!     → negotiator.rs (skip HEAD/204/304/already-encoded)
//!     → negotiator.rs (content type allow-list, size > min_size)
//!     → codec.rs (Accept-Encoding → gzip | deflate | identity)
//!     → codec.rs (chunked input → encoder stream → collected body)
//!     → negotiator.rs (Content-Encoding, Vary, X-*-Size headers)
//! ```
//!
//! # Design Decisions
//! - Fixed preference: gzip over deflate, regardless of q-value order
//! - `q=0` refuses a coding; `*` stands for any coding not listed
//! - Identity whenever encoding would not help

pub mod codec;
pub mod negotiator;

pub use codec::Codec;
pub use negotiator::{compression_middleware, CompressedPayload, CompressionNegotiator};
