//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::mapping::definition::MappingBatch;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request pipeline limits and bypass switches.
    pub pipeline: PipelineConfig,

    /// Response cache backend.
    pub cache: CacheConfig,

    /// Mapping sources.
    pub mappings: MappingsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Largest response body buffered for a transform or the cache.
    pub max_body_bytes: usize,

    /// Query parameter that disables the transform for one request.
    pub no_transform_param: String,

    /// Query parameter that disables cache lookup and store for one request.
    pub no_cache_param: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
            no_transform_param: "_notransform".to_string(),
            no_cache_param: "_nocache".to_string(),
        }
    }
}

/// Cache backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    #[default]
    None,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(rename = "type")]
    pub kind: CacheKind,

    /// Entry limit for the in-memory backend.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::None,
            max_entries: 10_000,
        }
    }
}

/// Where mapping definitions come from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MappingsConfig {
    /// Directory of `*.json` mapping files, watched for changes.
    pub directory: Option<PathBuf>,

    /// How often the directory is polled, in seconds.
    pub poll_interval_secs: u64,

    /// Mappings declared directly in the config file, keyed by id.
    pub inline: MappingBatch,
}

impl Default for MappingsConfig {
    fn default() -> Self {
        Self {
            directory: None,
            poll_interval_secs: 1,
            inline: MappingBatch::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
