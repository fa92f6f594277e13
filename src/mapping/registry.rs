//! Live mapping registry.
//!
//! # Design Decisions
//! - One mutex guards the ordered sequence; every mutation holds it
//! - Readers copy the sequence of `Arc`s under the lock and scan lock-free
//! - Position is match priority: re-registering an id replaces in place,
//!   new ids are appended
//! - A batch stops at its first failure; earlier entries stay registered

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::mapping::compiler::{compile, CompiledMapping, ConfigError};
use crate::mapping::definition::MappingBatch;
use crate::observability::metrics;

/// Point-in-time copy of the registry, in match order.
pub type Snapshot = Vec<Arc<CompiledMapping>>;

/// A batch that failed part way through.
#[derive(Debug, Error)]
#[error("mapping {failed_id:?} rejected after registering {registered:?}: {source}")]
pub struct RegisterError {
    /// Ids of the batch that were registered before the failure.
    pub registered: Vec<String>,
    pub failed_id: String,
    #[source]
    pub source: ConfigError,
}

/// Ordered, concurrency-safe collection of compiled mappings.
#[derive(Debug, Default)]
pub struct MappingRegistry {
    entries: Mutex<Vec<Arc<CompiledMapping>>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<CompiledMapping>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compile and register a batch, replacing entries that share an id.
    ///
    /// Returns the registered ids in the order they were processed.
    pub fn register(&self, batch: MappingBatch) -> Result<Vec<String>, RegisterError> {
        let mut registered = Vec::with_capacity(batch.len());

        for (id, definition) in batch {
            let compiled = match compile(&id, definition) {
                Ok(compiled) => Arc::new(compiled),
                Err(source) => {
                    tracing::error!(mapping = %id, error = %source, "Mapping rejected");
                    return Err(RegisterError {
                        registered,
                        failed_id: id,
                        source,
                    });
                }
            };

            let total = {
                let mut entries = self.lock();
                match entries.iter().position(|m| m.id() == id) {
                    Some(index) => entries[index] = compiled,
                    None => entries.push(compiled),
                }
                entries.len()
            };

            tracing::info!(mapping = %id, "Mapping registered");
            metrics::record_mappings(total);
            registered.push(id);
        }

        Ok(registered)
    }

    /// Remove every entry with one of the given ids. Unknown ids are ignored.
    pub fn deregister<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = self.lock();
        for id in ids {
            let id = id.as_ref();
            let before = entries.len();
            entries.retain(|m| m.id() != id);
            if entries.len() != before {
                tracing::info!(mapping = %id, "Mapping deregistered");
            }
        }
        metrics::record_mappings(entries.len());
    }

    /// Shallow copy of the current entries.
    pub fn get(&self) -> Snapshot {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch(value: serde_json::Value) -> MappingBatch {
        serde_json::from_value(value).unwrap()
    }

    fn route(path: &str, uri: &str) -> serde_json::Value {
        json!({ "target": { "uri": uri }, "mapping": { "request.path": path } })
    }

    fn ids(registry: &MappingRegistry) -> Vec<String> {
        registry.get().iter().map(|m| m.id().to_string()).collect()
    }

    #[test]
    fn test_register_then_get() {
        let registry = MappingRegistry::new();
        let registered = registry
            .register(batch(json!({
                "b": route("^/b", "http://b/"),
                "a": route("^/a", "http://a/"),
            })))
            .unwrap();

        assert_eq!(registered, vec!["a", "b"]);
        assert_eq!(ids(&registry), vec!["a", "b"]);
    }

    #[test]
    fn test_deregister() {
        let registry = MappingRegistry::new();
        registry
            .register(batch(json!({
                "a": route("^/a", "http://a/"),
                "b": route("^/b", "http://b/"),
                "c": route("^/c", "http://c/"),
            })))
            .unwrap();

        registry.deregister(["a", "c", "unknown"]);
        assert_eq!(ids(&registry), vec!["b"]);
    }

    #[test]
    fn test_reregister_replaces_in_place() {
        let registry = MappingRegistry::new();
        registry
            .register(batch(json!({
                "a": route("^/a", "http://first/"),
                "b": route("^/b", "http://b/"),
            })))
            .unwrap();
        registry
            .register(batch(json!({ "a": route("^/a", "http://second/") })))
            .unwrap();

        let snapshot = registry.get();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id(), "a");
        assert_eq!(snapshot[0].definition().target.uri, "http://second/");
    }

    #[test]
    fn test_empty_rules_never_stored() {
        let registry = MappingRegistry::new();
        let err = registry
            .register(batch(json!({
                "empty": { "target": { "uri": "http://x/" }, "mapping": {} }
            })))
            .unwrap_err();

        assert_eq!(err.failed_id, "empty");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_partial_failure_keeps_earlier_entries() {
        let registry = MappingRegistry::new();
        let err = registry
            .register(batch(json!({
                "a": route("^/a", "http://a/"),
                "b": route("([", "http://b/"),
                "c": route("^/c", "http://c/"),
            })))
            .unwrap_err();

        assert_eq!(err.registered, vec!["a"]);
        assert_eq!(err.failed_id, "b");
        assert!(matches!(err.source, ConfigError::Pattern { .. }));
        assert_eq!(ids(&registry), vec!["a"]);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_mutation() {
        let registry = MappingRegistry::new();
        registry
            .register(batch(json!({ "a": route("^/a", "http://a/") })))
            .unwrap();

        let snapshot = registry.get();
        registry.deregister(["a"]);

        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_register_and_read() {
        let registry = Arc::new(MappingRegistry::new());
        let writers: Vec<_> = (0..4)
            .map(|n| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let mut single = MappingBatch::new();
                        single.insert(
                            format!("m{n}-{i}"),
                            serde_json::from_value(route("^/", "http://x/")).unwrap(),
                        );
                        registry.register(single).unwrap();
                        let _ = registry.get();
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(registry.len(), 100);
    }
}
