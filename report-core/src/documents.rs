//! Shared list of known reports.
//!
//! [`Documents`] is the single owned replica of report metadata. The sync
//! engine refreshes it from backend listings and explicit saves, and any
//! number of readers can hold a clone.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::report::{Report, ReportId, ReportSummary};

/// File name of the on-disk index inside the data directory.
pub const INDEX_FILE: &str = "documents.json";

/// Thread-safe report metadata store.
#[derive(Debug, Clone, Default)]
pub struct Documents {
    entries: Arc<RwLock<BTreeMap<ReportId, ReportSummary>>>,
    /// Optional data directory for the persisted index.
    data_dir: Option<PathBuf>,
}

impl Documents {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store persisted as JSON under `data_dir`.
    ///
    /// The directory is created if needed and an existing index is loaded.
    /// An unreadable index is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        let path = data_dir.join(INDEX_FILE);
        let mut entries = BTreeMap::new();
        if path.exists() {
            let loaded = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|json| {
                    serde_json::from_str::<Vec<ReportSummary>>(&json).map_err(|e| e.to_string())
                });
            match loaded {
                Ok(list) => {
                    entries.extend(list.into_iter().map(|s| (s.id.clone(), s)));
                }
                Err(e) => tracing::warn!("Ignoring unreadable index {}: {e}", path.display()),
            }
        }

        Ok(Self {
            entries: Arc::new(RwLock::new(entries)),
            data_dir: Some(data_dir),
        })
    }

    /// Replace everything with a fresh backend listing.
    pub fn replace_all(&self, summaries: Vec<ReportSummary>) {
        {
            let mut entries = self
                .entries
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            entries.clear();
            entries.extend(summaries.into_iter().map(|s| (s.id.clone(), s)));
        }
        self.persist();
    }

    /// Insert or refresh the entry for a saved report.
    pub fn record_saved(&self, report: &Report) {
        self.upsert(report.summary());
    }

    /// Insert or refresh a single entry.
    pub fn upsert(&self, summary: ReportSummary) {
        {
            let mut entries = self
                .entries
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            entries.insert(summary.id.clone(), summary);
        }
        self.persist();
    }

    /// Remove an entry. Returns whether it existed.
    pub fn remove(&self, id: &ReportId) -> bool {
        let removed = {
            let mut entries = self
                .entries
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            entries.remove(id).is_some()
        };
        if removed {
            self.persist();
        }
        removed
    }

    /// Get one entry.
    #[must_use]
    pub fn get(&self, id: &ReportId) -> Option<ReportSummary> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.get(id).cloned()
    }

    /// All entries, most recently updated first.
    #[must_use]
    pub fn list(&self) -> Vec<ReportSummary> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut list: Vec<ReportSummary> = entries.values().cloned().collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the index to disk. No-op without a data directory.
    fn persist(&self) {
        let Some(ref data_dir) = self.data_dir else {
            return;
        };
        let json = match serde_json::to_string_pretty(&self.list()) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!("Failed to serialize document index: {e}");
                return;
            }
        };
        let path = data_dir.join(INDEX_FILE);
        if let Err(e) = std::fs::write(&path, json) {
            tracing::warn!("Failed to persist document index to {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, updated_at: u64) -> ReportSummary {
        ReportSummary {
            id: ReportId::from(id),
            name: format!("Report {id}"),
            template_id: None,
            patient_id: None,
            patient_name: None,
            created_at: 0,
            updated_at,
        }
    }

    #[test]
    fn test_list_orders_by_updated_desc() {
        let docs = Documents::new();
        docs.replace_all(vec![summary("a", 10), summary("b", 30), summary("c", 20)]);

        let ids: Vec<_> = docs.list().into_iter().map(|s| s.id.to_string()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_upsert_and_remove() {
        let docs = Documents::new();
        docs.upsert(summary("a", 1));
        docs.upsert(summary("a", 5));
        assert_eq!(docs.len(), 1);
        assert_eq!(docs.get(&ReportId::from("a")).map(|s| s.updated_at), Some(5));

        assert!(docs.remove(&ReportId::from("a")));
        assert!(!docs.remove(&ReportId::from("a")));
        assert!(docs.is_empty());
    }

    #[test]
    fn test_clones_share_entries() {
        let docs = Documents::new();
        let reader = docs.clone();
        docs.upsert(summary("a", 1));
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn test_persistence_save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let docs = Documents::with_data_dir(dir.path()).expect("store");
        docs.replace_all(vec![summary("a", 10), summary("b", 20)]);
        assert!(dir.path().join(INDEX_FILE).exists());

        let reloaded = Documents::with_data_dir(dir.path()).expect("store2");
        assert_eq!(reloaded.list(), docs.list());
    }

    #[test]
    fn test_corrupt_index_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(INDEX_FILE), "not json").expect("write");

        let docs = Documents::with_data_dir(dir.path()).expect("store");
        assert!(docs.is_empty());
    }
}
