//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::mapping::definition::MappingBatch;

/// Error type for configuration and mapping-file loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid mapping file {path}: {source}")]
    Mapping {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, LoadError> {
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: GatewayConfig = toml::from_str(&content).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_config(&config).map_err(LoadError::Validation)?;

    Ok(config)
}

/// Load `path`, falling back to defaults when the file does not exist.
pub fn load_or_default(path: &Path) -> Result<GatewayConfig, LoadError> {
    if path.exists() {
        return load_config(path);
    }
    tracing::warn!(path = %path.display(), "Config file not found, using defaults");
    Ok(GatewayConfig::default())
}

/// Shape of a mapping file: `{"mappings": {"<id>": {...}}}`.
#[derive(Debug, serde::Deserialize)]
struct MappingFile {
    #[serde(default)]
    mappings: MappingBatch,
}

/// Read the mapping batch stored in a JSON file.
pub fn load_mapping_file(path: &Path) -> Result<MappingBatch, LoadError> {
    let content = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: MappingFile = serde_json::from_slice(&content).map_err(|source| LoadError::Mapping {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.mappings)
}
