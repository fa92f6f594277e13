//! Mapping subsystem.
//!
//! # Data Flow
//! ```text
//! MappingBatch (id → MappingDefinition), from config or a mapping file
//!     → compiler.rs (templates, patterns, headers; no shared state)
//!     → registry.rs (replace in place or append, under one lock)
//!     → Snapshot (Vec<Arc<CompiledMapping>>) handed to the matcher
//! ```
//!
//! # Design Decisions
//! - A compiled mapping is immutable; re-registering swaps the `Arc`
//! - Templates render missing values as empty strings

pub mod compiler;
pub mod definition;
pub mod registry;
pub mod template;

pub use compiler::{compile, CompiledMapping, ConfigError};
pub use definition::{MappingBatch, MappingDefinition};
pub use registry::{MappingRegistry, RegisterError, Snapshot};
