//! Request preparation.
//!
//! Renders the matched mapping's templates against the request and
//! resolves outbound headers, producing a [`PreparedRequest`] the
//! pipeline can execute.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, Uri};
use std::sync::Arc;

use crate::mapping::compiler::{CompiledMapping, HeaderSource, TargetMode};
use crate::mapping::template::{RenderError, TemplateKind};
use crate::routing::attributes::FlattenedAttributes;

/// A matched request with every template rendered.
#[derive(Debug)]
pub struct PreparedRequest {
    pub id: String,
    pub method: Method,
    pub uri: Uri,
    /// Rendered body; `None` streams the inbound body instead.
    pub body: Option<String>,
    pub headers: HeaderMap,
    /// Empty when caching is off for this request.
    pub cache_key: String,
    pub mapping: Arc<CompiledMapping>,
    pub attributes: FlattenedAttributes,
    /// Nested template context, reused by the transform stage.
    pub context: serde_json::Value,
    inbound_body: Option<Body>,
}

impl PreparedRequest {
    /// Take the inbound body. Yields it once; later calls return `None`.
    pub fn take_inbound_body(&mut self) -> Option<Body> {
        self.inbound_body.take()
    }
}

/// Render `mapping` for one request.
pub fn prepare(
    mapping: Arc<CompiledMapping>,
    attributes: FlattenedAttributes,
    inbound_body: Body,
) -> Result<PreparedRequest, RenderError> {
    let context = attributes.to_context();
    let templates = mapping.templates();

    let body = if mapping.has_body_template() {
        Some(templates.render(TemplateKind::Body, &context)?)
    } else {
        None
    };

    let uri = match mapping.mode() {
        TargetMode::Forward => {
            let rendered = templates.render(TemplateKind::Uri, &context)?;
            match rendered.parse::<Uri>() {
                Ok(uri) if uri.scheme().is_some() && uri.authority().is_some() => uri,
                _ => return Err(RenderError::InvalidUri { uri: rendered }),
            }
        }
        TargetMode::Stub => Uri::default(),
    };

    let mut headers = HeaderMap::new();
    for (name, source) in mapping.headers() {
        match source {
            HeaderSource::Fixed(value) => {
                headers.insert(name.clone(), value.clone());
            }
            HeaderSource::Inbound => {
                if let Some(value) = attributes.header(name.as_str()).and_then(|v| v.first()) {
                    let value = HeaderValue::from_str(value).map_err(|_| RenderError::InvalidHeader {
                        name: name.to_string(),
                    })?;
                    headers.insert(name.clone(), value);
                }
            }
        }
    }

    let cache_key = if mapping.cache_ttl().is_some() {
        let key = templates.render(TemplateKind::CacheKey, &context)?;
        format!("{}:{}", mapping.id(), key)
    } else {
        String::new()
    };

    tracing::debug!(
        mapping = %mapping.id(),
        method = %mapping.method(),
        uri = %uri,
        cache_key = %cache_key,
        "Prepared request"
    );

    Ok(PreparedRequest {
        id: mapping.id().to_string(),
        method: mapping.method().clone(),
        uri,
        body,
        headers,
        cache_key,
        mapping,
        attributes,
        context,
        inbound_body: Some(inbound_body),
    })
}
