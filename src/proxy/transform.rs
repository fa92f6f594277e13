//! Response transformation.
//!
//! # Responsibilities
//! - Read a response body into memory, bounded by the configured limit
//! - Extract structured data (JSON body or named regex groups)
//! - Render the output template with `data` next to the request context
//! - Filter response headers through the allow-list

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::collections::HashMap;
use thiserror::Error;

use crate::mapping::compiler::{CompiledMapping, Extractor};
use crate::mapping::template::{RenderError, TemplateKind};

/// Longest raw-body excerpt quoted in an error.
const EXCERPT_LEN: usize = 512;

/// Failure while materializing or rewriting a response body.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("response body exceeds the maximum of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to read response body: {0}")]
    Read(String),

    #[error("{source} : {excerpt}")]
    Json {
        #[source]
        source: serde_json::Error,
        excerpt: String,
    },

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Read a whole body, failing once it grows past `limit` bytes.
pub async fn read_bounded(body: Body, limit: usize) -> Result<Bytes, TransformError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            Err(TransformError::TooLarge { limit })
        }
        Err(err) => Err(TransformError::Read(err.to_string())),
    }
}

/// Extract the `data` value from a backend body.
pub fn extract(extractor: &Extractor, body: &[u8]) -> Result<serde_json::Value, TransformError> {
    match extractor {
        Extractor::Json => serde_json::from_slice(body).map_err(|source| TransformError::Json {
            source,
            excerpt: excerpt(body),
        }),
        Extractor::Regexp(pattern) => {
            let text = String::from_utf8_lossy(body);
            let mut data = serde_json::Map::new();
            if let Some(captures) = pattern.captures(&text) {
                for name in pattern.capture_names().flatten() {
                    if let Some(value) = captures.name(name) {
                        data.insert(name.to_string(), value.as_str().into());
                    }
                }
            }
            Ok(serde_json::Value::Object(data))
        }
    }
}

/// Render the mapping's output template.
pub fn render(
    mapping: &CompiledMapping,
    context: &serde_json::Value,
    data: serde_json::Value,
) -> Result<String, TransformError> {
    let mut scope = match context {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    scope.insert("data".to_string(), data);
    Ok(mapping
        .templates()
        .render(TemplateKind::Output, &serde_json::Value::Object(scope))?)
}

/// Keep only allow-listed headers, applying fixed overrides.
///
/// An empty allow-list keeps everything.
pub fn filter_headers(
    headers: &HeaderMap,
    allowed: &HashMap<HeaderName, Option<HeaderValue>>,
) -> HeaderMap {
    if allowed.is_empty() {
        return headers.clone();
    }
    let mut filtered = HeaderMap::with_capacity(allowed.len());
    for (name, value) in headers {
        match allowed.get(name) {
            Some(Some(fixed)) => {
                filtered.insert(name.clone(), fixed.clone());
            }
            Some(None) => {
                filtered.append(name.clone(), value.clone());
            }
            None => {}
        }
    }
    filtered
}

fn excerpt(body: &[u8]) -> String {
    let end = body.len().min(EXCERPT_LEN);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::compiler::compile;
    use regex::Regex;
    use serde_json::json;

    fn mapping(transform: serde_json::Value) -> CompiledMapping {
        let def = json!({
            "target": { "uri": "http://backend/", "transform": transform },
            "mapping": { "request.path": "/" }
        });
        compile("t", serde_json::from_value(def).unwrap()).unwrap()
    }

    #[test]
    fn test_json_transform() {
        let m = mapping(json!({ "type": "json", "template": "{{data.a}}" }));
        let data = extract(&Extractor::Json, br#"{"a":1}"#).unwrap();
        let out = render(&m, &json!({ "request": {} }), data).unwrap();
        assert_eq!(out, "1");
    }

    #[test]
    fn test_regexp_transform() {
        let m = mapping(json!({
            "type": "regexp",
            "regexp": "user=(?P<name>\\w+)",
            "template": "{{data.name}}"
        }));
        let extractor = &m.transform().unwrap().extractor;
        let data = extract(extractor, b"user=alice").unwrap();
        assert_eq!(render(&m, &json!({}), data).unwrap(), "alice");
    }

    #[test]
    fn test_regexp_without_match_yields_empty_data() {
        let extractor = Extractor::Regexp(Regex::new("id=(?P<id>\\d+)").unwrap());
        assert_eq!(extract(&extractor, b"nothing").unwrap(), json!({}));
    }

    #[test]
    fn test_output_sees_request_context() {
        let m = mapping(json!({ "type": "json", "template": "{{request.path}}={{data.v}}" }));
        let out = render(&m, &json!({ "request": { "path": "/x" } }), json!({ "v": "y" })).unwrap();
        assert_eq!(out, "/x=y");
    }

    #[test]
    fn test_malformed_json_quotes_body() {
        let err = extract(&Extractor::Json, b"<html>oops</html>").unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, TransformError::Json { .. }));
        assert!(message.contains("<html>oops</html>"));
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let body = vec![b'x'; 4096];
        let err = extract(&Extractor::Json, &body).unwrap_err();
        match err {
            TransformError::Json { excerpt, .. } => assert_eq!(excerpt.len(), EXCERPT_LEN),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_read_bounded() {
        let bytes = read_bounded(Body::from("12345"), 5).await.unwrap();
        assert_eq!(&bytes[..], b"12345");

        let err = read_bounded(Body::from("123456"), 5).await.unwrap_err();
        assert!(matches!(err, TransformError::TooLarge { limit: 5 }));
    }

    #[test]
    fn test_filter_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("x-internal", HeaderValue::from_static("secret"));
        headers.insert("cache-control", HeaderValue::from_static("no-cache"));

        let mut allowed = HashMap::new();
        allowed.insert(
            HeaderName::from_static("content-type"),
            Some(HeaderValue::from_static("text/plain")),
        );
        allowed.insert(HeaderName::from_static("cache-control"), None);

        let filtered = filter_headers(&headers, &allowed);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered["content-type"], "text/plain");
        assert_eq!(filtered["cache-control"], "no-cache");
        assert!(!filtered.contains_key("x-internal"));

        assert_eq!(filter_headers(&headers, &HashMap::new()).len(), 3);
    }
}
