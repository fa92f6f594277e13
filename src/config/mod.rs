//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, inline mappings compiled)
//!     → GatewayConfig (validated, immutable)
//!
//! mapping directory (*.json)
//!     → watcher.rs detects change
//!     → loader.rs reads each changed file
//!     → MappingRegistry::register / deregister
//! ```
//!
//! # Design Decisions
//! - Gateway config is read once at startup; mappings are the live part
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A mapping file that fails to load keeps its previous mappings

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_or_default, LoadError};
pub use schema::{CacheConfig, CacheKind, GatewayConfig, PipelineConfig};
pub use watcher::{MappingDirectory, MappingWatcher};
