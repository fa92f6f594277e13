//! Proxy subsystem.
//!
//! # Data Flow
//! ```text
//! matched CompiledMapping + FlattenedAttributes
//!     → prepare.rs (render uri/body/cache key, resolve headers)
//!     → pipeline.rs
//!         → cache lookup (hit → replay)
//!         → forward.rs (backend) or stub
//!         → transform.rs (extract → output template → header allow-list)
//!         → cache populate
//!     → Response
//! ```
//!
//! # Design Decisions
//! - Backend access goes through the `Forwarder` trait
//! - Bodies are only buffered when a transform or the cache needs them
//! - Every failure before commit maps to a 500 with the error text

pub mod error;
pub mod forward;
pub mod pipeline;
pub mod prepare;
pub mod transform;

pub use error::ProxyError;
pub use forward::{BackendError, Forwarder, HttpForwarder};
pub use pipeline::Pipeline;
pub use prepare::{prepare, PreparedRequest};
