//! Mapping directory watcher.
//!
//! Every `*.json` file in the directory holds `{"mappings": {...}}`. A
//! change anywhere in the directory triggers a rescan: changed files are
//! re-registered, and ids no file declares any more are deregistered.

use notify::{Config, Event, PollWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::loader::{load_mapping_file, LoadError};
use crate::mapping::registry::MappingRegistry;

/// What a file contributed at its last successful load.
#[derive(Debug, Clone)]
struct LoadedFile {
    modified: Option<SystemTime>,
    ids: Vec<String>,
}

/// Outcome of one directory scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub registered: Vec<String>,
    pub deregistered: Vec<String>,
    pub failed: Vec<PathBuf>,
}

/// Keeps the registry in step with a directory of mapping files.
pub struct MappingDirectory {
    directory: PathBuf,
    registry: Arc<MappingRegistry>,
    loaded: BTreeMap<PathBuf, LoadedFile>,
}

impl MappingDirectory {
    pub fn new(directory: impl Into<PathBuf>, registry: Arc<MappingRegistry>) -> Self {
        Self {
            directory: directory.into(),
            registry,
            loaded: BTreeMap::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Rescan the directory and apply the difference to the registry.
    pub fn sync(&mut self) -> Result<SyncReport, LoadError> {
        let files = self.list_files()?;
        let mut report = SyncReport::default();
        let mut current = BTreeMap::new();

        for (path, modified) in files {
            if let Some(previous) = self.loaded.get(&path) {
                if previous.modified.is_some() && previous.modified == modified {
                    current.insert(path, previous.clone());
                    continue;
                }
            }

            let batch = match load_mapping_file(&path) {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load mapping file, keeping previous mappings");
                    if let Some(previous) = self.loaded.get(&path) {
                        current.insert(path.clone(), previous.clone());
                    }
                    report.failed.push(path);
                    continue;
                }
            };

            let ids: Vec<String> = batch.keys().cloned().collect();
            match self.registry.register(batch) {
                Ok(registered) => report.registered.extend(registered),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Mapping file partially rejected");
                    report.registered.extend(e.registered);
                    report.failed.push(path.clone());
                }
            }
            current.insert(path, LoadedFile { modified, ids });
        }

        let live: BTreeSet<&String> = current.values().flat_map(|f| &f.ids).collect();
        let stale: BTreeSet<String> = self
            .loaded
            .values()
            .flat_map(|f| &f.ids)
            .filter(|id| !live.contains(id))
            .cloned()
            .collect();
        if !stale.is_empty() {
            self.registry.deregister(&stale);
            report.deregistered.extend(stale);
        }

        self.loaded = current;
        Ok(report)
    }

    fn list_files(&self) -> Result<Vec<(PathBuf, Option<SystemTime>)>, LoadError> {
        let io_error = |source| LoadError::Io {
            path: self.directory.clone(),
            source,
        };
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.directory).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") || !path.is_file() {
                continue;
            }
            let modified = entry.metadata().and_then(|m| m.modified()).ok();
            files.push((path, modified));
        }
        files.sort();
        Ok(files)
    }
}

/// Drives a [`MappingDirectory`] from filesystem notifications.
pub struct MappingWatcher {
    source: MappingDirectory,
    poll_interval: Duration,
}

impl MappingWatcher {
    pub fn new(source: MappingDirectory, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
        }
    }

    /// Load the directory once, then keep it in sync in a background task.
    ///
    /// Changes are detected by polling every `poll_interval`. Rescans run
    /// on the blocking pool since they read the filesystem. The returned
    /// watcher must be kept alive for updates to flow.
    pub fn run(mut self) -> Result<(PollWatcher, JoinHandle<()>), notify::Error> {
        match self.source.sync() {
            Ok(report) => tracing::info!(
                directory = %self.source.directory().display(),
                registered = report.registered.len(),
                "Mapping directory loaded"
            ),
            Err(e) => tracing::error!(error = %e, "Initial mapping directory scan failed"),
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = PollWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove() {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(self.poll_interval),
        )?;
        watcher.watch(self.source.directory(), RecursiveMode::NonRecursive)?;

        tracing::info!(
            directory = %self.source.directory().display(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Mapping watcher started"
        );

        let mut source = self.source;
        let handle = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // Collapse bursts of events into one rescan.
                while rx.try_recv().is_ok() {}
                let scan = tokio::task::spawn_blocking(move || {
                    let result = source.sync();
                    (source, result)
                })
                .await;
                let result = match scan {
                    Ok((returned, result)) => {
                        source = returned;
                        result
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Mapping directory rescan task failed");
                        break;
                    }
                };
                match result {
                    Ok(report) => tracing::debug!(
                        registered = report.registered.len(),
                        deregistered = report.deregistered.len(),
                        failed = report.failed.len(),
                        "Mapping directory rescanned"
                    ),
                    Err(e) => tracing::error!(error = %e, "Mapping directory rescan failed"),
                }
            }
        });

        Ok((watcher, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_mapping(dir: &Path, file: &str, ids: &[&str]) {
        let mut mappings = serde_json::Map::new();
        for id in ids {
            mappings.insert(
                id.to_string(),
                serde_json::json!({
                    "target": { "uri": format!("http://backend/{id}") },
                    "mapping": { "request.path": format!("^/{id}$") }
                }),
            );
        }
        let body = serde_json::json!({ "mappings": mappings });
        fs::write(dir.join(file), body.to_string()).unwrap();
    }

    fn ids(registry: &MappingRegistry) -> Vec<String> {
        registry.get().iter().map(|m| m.id().to_string()).collect()
    }

    #[test]
    fn test_initial_sync_registers_all_files() {
        let dir = tempfile::tempdir().unwrap();
        write_mapping(dir.path(), "a.json", &["users"]);
        write_mapping(dir.path(), "b.json", &["orders", "items"]);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = Arc::new(MappingRegistry::new());
        let mut source = MappingDirectory::new(dir.path(), registry.clone());
        let report = source.sync().unwrap();

        assert_eq!(report.registered, ["users", "items", "orders"]);
        assert_eq!(ids(&registry), ["users", "items", "orders"]);
    }

    #[test]
    fn test_removed_ids_are_deregistered() {
        let dir = tempfile::tempdir().unwrap();
        write_mapping(dir.path(), "a.json", &["users", "orders"]);
        write_mapping(dir.path(), "b.json", &["items"]);

        let registry = Arc::new(MappingRegistry::new());
        let mut source = MappingDirectory::new(dir.path(), registry.clone());
        source.sync().unwrap();

        fs::remove_file(dir.path().join("b.json")).unwrap();
        // Force a reload of a.json regardless of timestamp granularity.
        source.loaded.values_mut().for_each(|f| f.modified = None);
        write_mapping(dir.path(), "a.json", &["users"]);

        let report = source.sync().unwrap();
        assert_eq!(report.deregistered, ["items", "orders"]);
        assert_eq!(ids(&registry), ["users"]);
    }

    #[test]
    fn test_broken_file_keeps_previous_mappings() {
        let dir = tempfile::tempdir().unwrap();
        write_mapping(dir.path(), "a.json", &["users"]);

        let registry = Arc::new(MappingRegistry::new());
        let mut source = MappingDirectory::new(dir.path(), registry.clone());
        source.sync().unwrap();

        source.loaded.values_mut().for_each(|f| f.modified = None);
        fs::write(dir.path().join("a.json"), "{ not json").unwrap();

        let report = source.sync().unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(report.deregistered.is_empty());
        assert_eq!(ids(&registry), ["users"]);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(MappingRegistry::new());
        let mut source = MappingDirectory::new(dir.path().join("absent"), registry);
        assert!(matches!(source.sync(), Err(LoadError::Io { .. })));
    }

    #[tokio::test]
    async fn test_watcher_picks_up_new_files() {
        let dir = tempfile::tempdir().unwrap();
        write_mapping(dir.path(), "a.json", &["users"]);

        let registry = Arc::new(MappingRegistry::new());
        let source = MappingDirectory::new(dir.path(), registry.clone());
        let (_watcher, _handle) = MappingWatcher::new(source, Duration::from_millis(50))
            .run()
            .unwrap();
        assert_eq!(ids(&registry), ["users"]);

        write_mapping(dir.path(), "b.json", &["orders"]);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while registry.len() < 2 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(ids(&registry), ["users", "orders"]);
    }
}
