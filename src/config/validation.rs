//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Compile inline mappings so a bad definition fails at startup
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{CacheKind, GatewayConfig};
use crate::mapping::compiler::compile;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.pipeline.max_body_bytes == 0 {
        errors.push(ValidationError::new("pipeline.max_body_bytes", "must be greater than 0"));
    }
    for (field, value) in [
        ("pipeline.no_transform_param", &config.pipeline.no_transform_param),
        ("pipeline.no_cache_param", &config.pipeline.no_cache_param),
    ] {
        if value.is_empty() {
            errors.push(ValidationError::new(field, "must not be empty"));
        }
    }

    if config.cache.kind == CacheKind::Memory && config.cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be greater than 0"));
    }

    if config.mappings.poll_interval_secs == 0 {
        errors.push(ValidationError::new("mappings.poll_interval_secs", "must be greater than 0"));
    }
    for (id, definition) in &config.mappings.inline {
        if id.trim().is_empty() {
            errors.push(ValidationError::new("mappings.inline", "mapping id must not be empty"));
            continue;
        }
        if let Err(e) = compile(id, definition.clone()) {
            errors.push(ValidationError::new(format!("mappings.inline.{id}"), e.to_string()));
        }
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("expected one of {}", LOG_LEVELS.join(", ")),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.timeouts.request_secs = 0;
        config.pipeline.no_cache_param.clear();
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            [
                "listener.bind_address",
                "timeouts.request_secs",
                "pipeline.no_cache_param",
                "observability.log_level",
            ]
        );
    }

    #[test]
    fn test_inline_mapping_is_compiled() {
        let mut config = GatewayConfig::default();
        config.mappings.inline = serde_json::from_value(serde_json::json!({
            "broken": { "target": { "uri": "http://backend/" }, "mapping": { "request.path": "(" } }
        }))
        .unwrap();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "mappings.inline.broken");
    }
}
