//! Canonical per-test records and the merge engine that maintains them.
//!
//! The index is guarded by a read/write lock that is only held long enough
//! to look up or insert a record handle. Each record sits behind its own
//! mutex, so merges for different identifiers run in parallel while merges
//! for the same identifier are serialized.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

use crate::domain::models::{RecordUpdate, TestRecord};
use crate::domain::HubResult;

type RecordHandle = Arc<Mutex<TestRecord>>;

/// Store of test records keyed by test identifier, in first-seen order.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    records: RwLock<IndexMap<String, RecordHandle>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn handle(&self, test_ident: &str) -> RecordHandle {
        if let Some(handle) = self.records.read().await.get(test_ident) {
            return handle.clone();
        }
        let mut records = self.records.write().await;
        records
            .entry(test_ident.to_string())
            .or_insert_with(|| {
                debug!(test_ident, "Creating record");
                RecordHandle::default()
            })
            .clone()
    }

    /// Fold `update` into the record for `test_ident`, creating it if needed.
    #[instrument(skip(self, update))]
    pub async fn merge(&self, test_ident: &str, update: RecordUpdate) {
        if update.is_empty() {
            return;
        }
        let handle = self.handle(test_ident).await;
        handle.lock().await.apply(update);
    }

    /// Validate a raw JSON update against the record fields and merge it.
    pub async fn merge_value(&self, test_ident: &str, update: Value) -> HubResult<()> {
        let update = RecordUpdate::from_value(test_ident, update)?;
        self.merge(test_ident, update).await;
        Ok(())
    }

    pub async fn get(&self, test_ident: &str) -> Option<TestRecord> {
        let handle = self.records.read().await.get(test_ident).cloned()?;
        let record = handle.lock().await.clone();
        Some(record)
    }

    pub async fn contains(&self, test_ident: &str) -> bool {
        self.records.read().await.contains_key(test_ident)
    }

    /// Point-in-time copy of every record.
    ///
    /// The index lock is released before any record is read, and each record
    /// is copied under its own lock, so a copy never reflects half of a merge.
    pub async fn all(&self) -> IndexMap<String, TestRecord> {
        let handles: Vec<(String, RecordHandle)> = self
            .records
            .read()
            .await
            .iter()
            .map(|(ident, handle)| (ident.clone(), handle.clone()))
            .collect();

        let mut snapshot = IndexMap::with_capacity(handles.len());
        for (ident, handle) in handles {
            let record = handle.lock().await.clone();
            snapshot.insert(ident, record);
        }
        snapshot
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
