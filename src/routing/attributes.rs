//! Flattened request attributes.
//!
//! Every request is reduced to a single-level map of dotted paths
//! (`request.path`, `query.page`, `header.user-agent`, ...). Match rules are
//! evaluated against this map and templates render against its nested form.

use axum::http::{header, request::Parts};
use serde::Serialize;
use std::collections::HashMap;

pub const REQUEST: &str = "request";
pub const QUERY: &str = "query";
pub const HEADER: &str = "header";

/// One attribute: a scalar, or a sequence when the key was repeated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Single(String),
    Multi(Vec<String>),
}

impl AttributeValue {
    /// Every value carried by this attribute.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            AttributeValue::Single(v) => std::slice::from_ref(v),
            AttributeValue::Multi(vs) => vs,
        };
        items.iter().map(String::as_str)
    }

    /// The first value.
    pub fn first(&self) -> Option<&str> {
        self.values().next()
    }

    fn push(&mut self, value: String) {
        match self {
            AttributeValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = AttributeValue::Multi(vec![first, value]);
            }
            AttributeValue::Multi(values) => values.push(value),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Single(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Single(value)
    }
}

/// Dotted-path view of one inbound request.
#[derive(Debug, Clone, Default)]
pub struct FlattenedAttributes {
    entries: HashMap<String, AttributeValue>,
}

impl FlattenedAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the attributes of an inbound request.
    pub fn from_request_parts(parts: &Parts) -> Self {
        let mut attrs = Self::new();

        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_default();

        let raw_uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());

        attrs.insert_request("method", parts.method.as_str());
        attrs.insert_request("path", parts.uri.path());
        attrs.insert_request("host", host);
        attrs.insert_request("protocol", format!("{:?}", parts.version));
        attrs.insert_request("uri", raw_uri);
        attrs.insert_request("content-length", content_length(parts));

        if let Some(query) = parts.uri.query() {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                attrs.push_query(&key, value.into_owned());
            }
        }

        for (name, value) in parts.headers.iter() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            attrs.push_header(name.as_str(), value);
        }

        attrs
    }

    /// Set an attribute at a full dotted path, replacing any previous value.
    pub fn insert(&mut self, path: impl Into<String>, value: impl Into<AttributeValue>) {
        self.entries.insert(path.into(), value.into());
    }

    /// Set `request.<name>`.
    pub fn insert_request(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.insert(format!("{REQUEST}.{name}"), value);
    }

    /// Add a query parameter value; repeated keys become sequences.
    pub fn push_query(&mut self, key: &str, value: impl Into<String>) {
        self.push(QUERY, key, value.into());
    }

    /// Add a header value; repeated names become sequences.
    pub fn push_header(&mut self, name: &str, value: impl Into<String>) {
        self.push(HEADER, name, value.into());
    }

    fn push(&mut self, namespace: &str, key: &str, value: String) {
        let path = format!("{namespace}.{}", key.to_lowercase());
        match self.entries.get_mut(&path) {
            Some(existing) => existing.push(value),
            None => {
                self.entries.insert(path, AttributeValue::Single(value));
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&AttributeValue> {
        self.entries.get(path)
    }

    /// Look up an inbound header by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&AttributeValue> {
        self.get(&format!("{HEADER}.{}", name.to_lowercase()))
    }

    /// Whether the query string carried this parameter, with or without a value.
    pub fn has_query(&self, name: &str) -> bool {
        self.entries
            .contains_key(&format!("{QUERY}.{}", name.to_lowercase()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nested form used as template context: `{"request": {...}, "query": {...}, "header": {...}}`.
    ///
    /// Paths split on their first dot only, so parameter names may contain dots.
    pub fn to_context(&self) -> serde_json::Value {
        let mut root = serde_json::Map::new();
        for ns in [REQUEST, QUERY, HEADER] {
            root.insert(ns.to_string(), serde_json::Value::Object(Default::default()));
        }

        for (path, value) in &self.entries {
            let value = serde_json::to_value(value).unwrap_or_default();
            match path.split_once('.') {
                Some((ns, key)) => {
                    let slot = root
                        .entry(ns.to_string())
                        .or_insert_with(|| serde_json::Value::Object(Default::default()));
                    if let serde_json::Value::Object(map) = slot {
                        map.insert(key.to_string(), value);
                    }
                }
                None => {
                    root.insert(path.clone(), value);
                }
            }
        }
        serde_json::Value::Object(root)
    }
}

fn content_length(parts: &Parts) -> String {
    if let Some(len) = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
    {
        return len.trim().to_string();
    }
    if parts.headers.contains_key(header::TRANSFER_ENCODING) {
        "-1".to_string()
    } else {
        "0".to_string()
    }
}
