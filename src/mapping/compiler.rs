//! Mapping compilation.
//!
//! Turns a [`MappingDefinition`] into an immutable [`CompiledMapping`]:
//! templates parsed, match patterns and the transform pattern compiled,
//! header names validated. Compilation touches no shared state.

use axum::http::{HeaderName, HeaderValue, Method};
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::mapping::definition::{Extraction, MappingDefinition};
use crate::mapping::template::{TemplateKind, TemplateSet};

/// A definition that cannot be turned into a live mapping.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mapping {id:?} has no match rules")]
    NoMatchRules { id: String },

    #[error("mapping {id:?} has an invalid {kind} template: {source}")]
    Template {
        id: String,
        kind: TemplateKind,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("mapping {id:?} has an invalid pattern {pattern:?} for {field:?}: {source}")]
    Pattern {
        id: String,
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("mapping {id:?} has an invalid transform pattern: {source}")]
    TransformPattern {
        id: String,
        #[source]
        source: regex::Error,
    },

    #[error("mapping {id:?} has an invalid verb {verb:?}")]
    Verb { id: String, verb: String },

    #[error("mapping {id:?} declares an invalid header {name:?}")]
    Header { id: String, name: String },
}

/// All patterns that must hold for one attribute.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: String,
    pub patterns: Vec<Regex>,
}

/// Where an outbound header value comes from.
#[derive(Debug, Clone)]
pub enum HeaderSource {
    Fixed(HeaderValue),
    /// Copied from the inbound header with the same name.
    Inbound,
}

/// Compiled response transform.
#[derive(Debug, Clone)]
pub struct CompiledTransform {
    pub extractor: Extractor,
    /// Allow-list keyed by lower-cased name; `None` keeps the backend value.
    pub headers: HashMap<HeaderName, Option<HeaderValue>>,
}

#[derive(Debug, Clone)]
pub enum Extractor {
    Json,
    Regexp(Regex),
}

/// What a mapping does once matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    Forward,
    Stub,
}

/// Immutable, ready-to-execute mapping.
#[derive(Debug)]
pub struct CompiledMapping {
    id: String,
    definition: MappingDefinition,
    method: Method,
    mode: TargetMode,
    templates: TemplateSet,
    headers: Vec<(HeaderName, HeaderSource)>,
    rules: Vec<FieldRule>,
    transform: Option<CompiledTransform>,
    cache_ttl: Option<Duration>,
}

impl CompiledMapping {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn definition(&self) -> &MappingDefinition {
        &self.definition
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn mode(&self) -> TargetMode {
        self.mode
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn headers(&self) -> &[(HeaderName, HeaderSource)] {
        &self.headers
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn transform(&self) -> Option<&CompiledTransform> {
        self.transform.as_ref()
    }

    /// Cache lifetime when the mapping has a cache strategy.
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl
    }

    /// Whether the mapping renders its own outbound body.
    pub fn has_body_template(&self) -> bool {
        self.templates.contains(TemplateKind::Body)
    }
}

/// Compile a definition delivered under `id`.
pub fn compile(id: &str, definition: MappingDefinition) -> Result<CompiledMapping, ConfigError> {
    if definition.mapping.is_empty() {
        return Err(ConfigError::NoMatchRules { id: id.to_string() });
    }

    let target = &definition.target;
    let verb = if target.verb.is_empty() { "GET" } else { target.verb.as_str() };
    let method = Method::from_bytes(verb.to_ascii_uppercase().as_bytes()).map_err(|_| {
        ConfigError::Verb {
            id: id.to_string(),
            verb: target.verb.clone(),
        }
    })?;

    let mut templates = TemplateSet::new();
    let mut register = |kind: TemplateKind, source: &str| {
        templates
            .register(kind, source)
            .map_err(|e| ConfigError::Template {
                id: id.to_string(),
                kind,
                source: Box::new(e),
            })
    };

    register(TemplateKind::Uri, &target.uri)?;
    if let Some(body) = target.body.as_deref().filter(|b| !b.is_empty()) {
        register(TemplateKind::Body, body)?;
    }
    if let Some(cache) = &definition.cache_strategy {
        register(TemplateKind::CacheKey, &cache.key)?;
    }
    if let Some(transform) = &target.transform {
        register(TemplateKind::Output, &transform.template)?;
    }

    let headers = target
        .headers
        .iter()
        .map(|(name, value)| {
            let invalid = || ConfigError::Header {
                id: id.to_string(),
                name: name.clone(),
            };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let source = if value.is_empty() {
                HeaderSource::Inbound
            } else {
                HeaderSource::Fixed(HeaderValue::from_str(value).map_err(|_| invalid())?)
            };
            Ok((header_name, source))
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    let mut rules = Vec::with_capacity(definition.mapping.len());
    for (field, patterns) in &definition.mapping {
        let compiled = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                    id: id.to_string(),
                    field: field.clone(),
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(mapping = %id, field = %field, patterns = compiled.len(), "Compiled match rule");
        rules.push(FieldRule {
            field: field.clone(),
            patterns: compiled,
        });
    }

    let transform = match &target.transform {
        Some(def) => {
            let extractor = match &def.extract {
                Extraction::Json => Extractor::Json,
                Extraction::Regexp { regexp } => {
                    Extractor::Regexp(Regex::new(regexp).map_err(|source| {
                        ConfigError::TransformPattern {
                            id: id.to_string(),
                            source,
                        }
                    })?)
                }
            };
            let mut allowed = HashMap::with_capacity(def.headers.len());
            for (name, value) in &def.headers {
                let invalid = || ConfigError::Header {
                    id: id.to_string(),
                    name: name.clone(),
                };
                let header_name = HeaderName::from_bytes(name.to_lowercase().as_bytes())
                    .map_err(|_| invalid())?;
                let value = if value.is_empty() {
                    None
                } else {
                    Some(HeaderValue::from_str(value).map_err(|_| invalid())?)
                };
                allowed.insert(header_name, value);
            }
            Some(CompiledTransform {
                extractor,
                headers: allowed,
            })
        }
        None => None,
    };

    let cache_ttl = definition
        .cache_strategy
        .as_ref()
        .map(|c| Duration::from_secs(c.duration_seconds));
    let mode = if target.stub {
        TargetMode::Stub
    } else {
        TargetMode::Forward
    };

    Ok(CompiledMapping {
        id: id.to_string(),
        definition,
        method,
        mode,
        templates,
        headers,
        rules,
        transform,
        cache_ttl,
    })
}
