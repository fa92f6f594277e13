//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, uri, headers)
//!     → attributes.rs (flatten into request.* / query.* / header.*)
//!     → matcher.rs (evaluate each mapping's rules against the flattened view)
//!     → Return: first matching CompiledMapping or no match
//! ```
//!
//! # Design Decisions
//! - Matching runs on a snapshot, never under the registry lock
//! - Patterns are unanchored regular expressions
//! - First match wins (registration order)

pub mod attributes;
pub mod matcher;

pub use attributes::{AttributeValue, FlattenedAttributes};
pub use matcher::{get_match, Matcher};
