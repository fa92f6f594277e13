//! Response cache abstraction.
//!
//! # Data Flow
//! ```text
//! pipeline (cache key present)
//!     → CacheClient::get(key) → CachedResponse::decode → replay
//!     → miss / fault → backend → CachedResponse::encode → CacheClient::set
//! ```
//!
//! # Design Decisions
//! - Backends store opaque bytes; the pipeline owns the entry format
//! - A cache fault is reported to the caller, which treats it as a miss
//! - `NoopCache` is the default when no backend is configured

pub mod memory;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::config::schema::{CacheConfig, CacheKind};

pub use memory::MemoryCache;

/// Failure talking to a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache entry could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Key/value contract every cache backend implements.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Fetch a value; `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a value for `ttl_seconds`.
    async fn set(&self, key: &str, ttl_seconds: u64, value: Vec<u8>) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn flush_all(&self) -> Result<(), CacheError>;
}

/// Cache that never hits and discards writes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl CacheClient for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _ttl_seconds: u64, _value: Vec<u8>) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn flush_all(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Build the configured cache backend.
pub fn from_config(config: &CacheConfig) -> Arc<dyn CacheClient> {
    match config.kind {
        CacheKind::None => Arc::new(NoopCache),
        CacheKind::Memory => Arc::new(MemoryCache::new(config.max_entries)),
    }
}

/// A memoized backend response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub headers: BTreeMap<String, Vec<String>>,
    pub status: u16,
    pub body: String,
    /// Absolute expiry, seconds since the Unix epoch.
    pub expires: u64,
    pub key: String,
}

impl CachedResponse {
    /// Snapshot a response that expires `ttl` from now.
    pub fn new(key: &str, status: StatusCode, headers: &HeaderMap, body: &[u8], ttl: Duration) -> Self {
        let mut snapshot: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in headers {
            snapshot
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        Self {
            headers: snapshot,
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
            expires: unix_now().saturating_add(ttl.as_secs()),
            key: key.to_string(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Seconds left until expiry; negative once expired.
    pub fn remaining_ttl(&self, now: u64) -> i64 {
        let expires = i64::try_from(self.expires).unwrap_or(i64::MAX);
        let now = i64::try_from(now).unwrap_or(i64::MAX);
        expires.saturating_sub(now)
    }
}

/// Current time in seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
