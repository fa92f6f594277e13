//! Registration payload types.
//!
//! Watchers hand the registry a batch of `id → MappingDefinition`. Every
//! field is decoded into a typed value here, so a malformed payload fails
//! once, at deserialization, instead of deep inside compilation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A batch of definitions keyed by mapping id.
///
/// Ordered so a batch always registers in the same sequence.
pub type MappingBatch = BTreeMap<String, MappingDefinition>;

/// A raw mapping as delivered by a mapping source.
///
/// The id is not part of the body; it is the key the definition was
/// delivered under.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MappingDefinition {
    /// What to do with a matching request.
    pub target: TargetDefinition,

    /// Match rules: attribute path → one or more patterns.
    #[serde(default)]
    pub mapping: BTreeMap<String, PatternList>,

    /// Optional response memoization policy.
    #[serde(default)]
    pub cache_strategy: Option<CacheStrategy>,
}

/// Backend target of a mapping.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TargetDefinition {
    /// HTTP verb used towards the backend.
    #[serde(default = "default_verb")]
    pub verb: String,

    /// URI template.
    #[serde(default)]
    pub uri: String,

    /// Body template. Absent means the inbound body streams through.
    #[serde(default)]
    pub body: Option<String>,

    /// Outbound headers. An empty value copies the inbound header of the
    /// same name.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Answer with the rendered body instead of calling a backend.
    #[serde(default)]
    pub stub: bool,

    /// Optional response rewrite.
    #[serde(default)]
    pub transform: Option<TransformDefinition>,
}

fn default_verb() -> String {
    "GET".to_string()
}

/// Response rewrite configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransformDefinition {
    /// How data is extracted from the backend body.
    #[serde(flatten)]
    pub extract: Extraction,

    /// Output template; extracted values live under `data`.
    pub template: String,

    /// Response header allow-list: name → override (empty keeps the
    /// backend value). Empty map passes every header through.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Extraction strategy for a transform.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Extraction {
    /// Parse the body as JSON.
    Json,
    /// Apply a pattern and expose its named groups.
    Regexp { regexp: String },
}

/// Per-mapping cache policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheStrategy {
    /// Cache key template.
    pub key: String,

    /// Time to live of a stored response.
    pub duration_seconds: u64,
}

/// One pattern or a list of patterns.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PatternList {
    One(String),
    Many(Vec<String>),
}

impl PatternList {
    /// All patterns as a slice-like iterator.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            PatternList::One(p) => std::slice::from_ref(p),
            PatternList::Many(ps) => ps,
        };
        items.iter().map(String::as_str)
    }
}
