//! Per-request execution.
//!
//! A prepared request moves through a fixed sequence of stages:
//!
//! ```text
//! CacheLookup ──hit──────────────────────────────────────→ Respond
//!      │ miss / bypass / fault
//!      ↓
//! Forward (or Stub) → Transform? → CachePopulate? → Respond
//! ```
//!
//! The response head is committed exactly once, in `Respond`. Failures
//! before that point produce a 500 with the error text as body. A body
//! that is streamed straight through can still fail after commit; those
//! failures are only logged.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode};
use bytes::Bytes;
use http_body_util::BodyExt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{unix_now, CacheClient, CachedResponse};
use crate::config::schema::PipelineConfig;
use crate::mapping::compiler::TargetMode;
use crate::observability::metrics;
use crate::proxy::error::ProxyError;
use crate::proxy::forward::{BackendError, Forwarder};
use crate::proxy::prepare::PreparedRequest;
use crate::proxy::transform;

/// Version header stamped on every response.
pub const VERSION_HEADER: &str = "x-gateway-version";
pub const CACHE_HIT_HEADER: &str = "x-cache-hit";
pub const CACHE_KEY_HEADER: &str = "x-cache-key";
pub const CACHE_EXPIRATION_HEADER: &str = "x-cache-expiration-seconds";

/// Response body as it moves through the stages.
enum Payload {
    Streaming(Body),
    Buffered(Bytes),
}

/// Backend (or stub) response before it is committed.
struct Staged {
    status: StatusCode,
    headers: HeaderMap,
    payload: Payload,
}

impl Staged {
    async fn buffer(&mut self, limit: usize) -> Result<Bytes, ProxyError> {
        let bytes = match std::mem::replace(&mut self.payload, Payload::Buffered(Bytes::new())) {
            Payload::Buffered(bytes) => bytes,
            Payload::Streaming(body) => transform::read_bounded(body, limit).await?,
        };
        self.payload = Payload::Buffered(bytes.clone());
        Ok(bytes)
    }
}

/// Executes prepared requests against the cache and backends.
pub struct Pipeline {
    cache: Arc<dyn CacheClient>,
    forwarder: Arc<dyn Forwarder>,
    settings: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        cache: Arc<dyn CacheClient>,
        forwarder: Arc<dyn Forwarder>,
        settings: PipelineConfig,
    ) -> Self {
        Self {
            cache,
            forwarder,
            settings,
        }
    }

    /// Run a request to completion. Never fails; errors become a 500.
    pub async fn execute(&self, prepared: PreparedRequest) -> Response<Body> {
        let id = prepared.id.clone();
        let mut response = match self.run(prepared).await {
            Ok(response) => response,
            Err(err) => {
                warn!(mapping = %id, kind = err.kind(), error = %err, "request failed");
                axum::response::IntoResponse::into_response(err)
            }
        };
        stamp_version(response.headers_mut());
        response
    }

    async fn run(&self, mut prepared: PreparedRequest) -> Result<Response<Body>, ProxyError> {
        if prepared.attributes.has_query(&self.settings.no_cache_param) {
            prepared.cache_key.clear();
        }

        if !prepared.cache_key.is_empty() {
            if let Some(response) = self.lookup(&prepared.id, &prepared.cache_key).await {
                return Ok(response);
            }
        }

        let mut staged = match prepared.mapping.mode() {
            TargetMode::Stub => stub(&mut prepared),
            TargetMode::Forward => self.forward(&mut prepared).await?,
        };

        let skip_transform = prepared
            .attributes
            .has_query(&self.settings.no_transform_param);
        if let Some(compiled) = prepared.mapping.transform() {
            if !skip_transform && staged.status == StatusCode::OK {
                let raw = staged.buffer(self.settings.max_body_bytes).await?;
                let data = transform::extract(&compiled.extractor, &raw)?;
                let output = transform::render(&prepared.mapping, &prepared.context, data)?;
                staged.payload = Payload::Buffered(Bytes::from(output));
                staged.headers = transform::filter_headers(&staged.headers, &compiled.headers);
            }
        }

        if !prepared.cache_key.is_empty() {
            if let Some(ttl) = prepared.mapping.cache_ttl() {
                let body = staged.buffer(self.settings.max_body_bytes).await?;
                self.populate(
                    &prepared.cache_key,
                    ttl.as_secs(),
                    staged.status,
                    &staged.headers,
                    &body,
                )
                .await;
            }
        }

        Ok(respond(&prepared.id, staged))
    }

    /// Returns the replayed response on a usable hit.
    async fn lookup(&self, id: &str, key: &str) -> Option<Response<Body>> {
        let bytes = match self.cache.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                metrics::record_cache_lookup("miss");
                return None;
            }
            Err(err) => {
                warn!(mapping = %id, key, error = %err, "cache lookup failed, treating as miss");
                metrics::record_cache_lookup("error");
                return None;
            }
        };

        let cached = match CachedResponse::decode(&bytes) {
            Ok(cached) => cached,
            Err(err) => {
                warn!(mapping = %id, key, error = %err, "discarding unreadable cache entry");
                metrics::record_cache_lookup("error");
                return None;
            }
        };

        let now = unix_now();
        let remaining = cached.remaining_ttl(now);
        if remaining < 0 {
            metrics::record_cache_lookup("miss");
            return None;
        }
        let Ok(status) = StatusCode::from_u16(cached.status) else {
            warn!(mapping = %id, key, status = cached.status, "discarding cache entry with bad status");
            metrics::record_cache_lookup("error");
            return None;
        };

        debug!(mapping = %id, key, remaining, "cache hit");
        metrics::record_cache_lookup("hit");
        Some(replay(cached, status, remaining))
    }

    async fn populate(
        &self,
        key: &str,
        ttl_seconds: u64,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
    ) {
        let entry = CachedResponse::new(
            key,
            status,
            headers,
            body,
            std::time::Duration::from_secs(ttl_seconds),
        );
        let encoded = match entry.encode() {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(key, error = %err, "failed to encode cache entry");
                return;
            }
        };
        if let Err(err) = self.cache.set(key, ttl_seconds, encoded).await {
            warn!(key, error = %err, "failed to store cache entry");
        }
    }

    async fn forward(&self, prepared: &mut PreparedRequest) -> Result<Staged, ProxyError> {
        let request = outbound(prepared)?;
        debug!(mapping = %prepared.id, method = %prepared.method, uri = %prepared.uri, "forwarding");
        let response = self.forwarder.forward(request).await?;
        let (parts, body) = response.into_parts();
        Ok(Staged {
            status: parts.status,
            headers: parts.headers,
            payload: Payload::Streaming(body),
        })
    }
}

/// Add the gateway version header.
pub fn stamp_version(headers: &mut HeaderMap) {
    headers.insert(
        HeaderName::from_static(VERSION_HEADER),
        HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );
}

/// Build the backend request from the rendered pieces.
fn outbound(prepared: &mut PreparedRequest) -> Result<Request<Body>, BackendError> {
    let mut headers = prepared.headers.clone();
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::CONTENT_LENGTH);

    let body = match prepared.body.take() {
        Some(rendered) => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(rendered.len()));
            Body::from(rendered)
        }
        None => {
            let declared = prepared
                .attributes
                .get("request.content-length")
                .and_then(|v| v.first())
                .and_then(|v| v.parse::<u64>().ok());
            if let Some(length) = declared.filter(|length| *length > 0) {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            }
            prepared.take_inbound_body().unwrap_or_else(Body::empty)
        }
    };

    let mut request = Request::builder()
        .method(prepared.method.clone())
        .uri(prepared.uri.clone())
        .body(body)?;
    *request.headers_mut() = headers;
    Ok(request)
}

/// Synthesize the response for a stub target.
fn stub(prepared: &mut PreparedRequest) -> Staged {
    let body = prepared.body.take().unwrap_or_default();
    Staged {
        status: StatusCode::OK,
        headers: prepared.headers.clone(),
        payload: Payload::Buffered(Bytes::from(body)),
    }
}

fn respond(id: &str, staged: Staged) -> Response<Body> {
    let Staged {
        status,
        mut headers,
        payload,
    } = staged;

    let body = match payload {
        Payload::Buffered(bytes) => {
            headers.remove(header::TRANSFER_ENCODING);
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            Body::from(bytes)
        }
        Payload::Streaming(body) => {
            let id = id.to_string();
            Body::new(body.map_err(move |err| {
                warn!(mapping = %id, error = %err, "response stream failed after commit");
                err
            }))
        }
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn replay(cached: CachedResponse, status: StatusCode, remaining: i64) -> Response<Body> {
    let mut headers = HeaderMap::new();
    for (name, values) in &cached.headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        if name == header::CONTENT_LENGTH || name == header::TRANSFER_ENCODING {
            continue;
        }
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name.clone(), value);
            }
        }
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(cached.body.len()));
    headers.insert(
        HeaderName::from_static(CACHE_HIT_HEADER),
        HeaderValue::from_static("true"),
    );
    if let Ok(key) = HeaderValue::from_str(&cached.key) {
        headers.insert(HeaderName::from_static(CACHE_KEY_HEADER), key);
    }
    headers.insert(
        HeaderName::from_static(CACHE_EXPIRATION_HEADER),
        HeaderValue::from(remaining),
    );

    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
