use crate::error::Result;
use crate::snapshot::SnapshotStore;
use crate::{BackupRepository, BatchRepository, MetricRepository};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tally_common::types::{metric_key, MetricKind, MetricRecord};
use tokio::sync::RwLock;

/// In-memory repository: one map behind one reader/writer lock.
///
/// Snapshot I/O always happens on a copy taken under the read lock, never
/// while the lock is held.
#[derive(Default)]
pub struct MemRepository {
    records: RwLock<HashMap<String, MetricRecord>>,
    snapshot: Option<SnapshotStore>,
}

impl MemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: SnapshotStore) -> Self {
        Self {
            records: RwLock::default(),
            snapshot: Some(snapshot),
        }
    }

    fn merge_into(map: &mut HashMap<String, MetricRecord>, record: MetricRecord) {
        match map.get_mut(&record.key) {
            Some(existing) => existing.merge(&record),
            None => {
                map.insert(record.key.clone(), record);
            }
        }
    }
}

#[async_trait]
impl MetricRepository for MemRepository {
    async fn upsert(&self, record: MetricRecord) -> Result<()> {
        let mut map = self.records.write().await;
        Self::merge_into(&mut map, record);
        Ok(())
    }

    async fn find(&self, kind: MetricKind, name: &str) -> Result<Option<MetricRecord>> {
        let map = self.records.read().await;
        Ok(map.get(&metric_key(kind, name)).cloned())
    }

    async fn all(&self) -> Result<Vec<MetricRecord>> {
        let map = self.records.read().await;
        Ok(map.values().cloned().collect())
    }

    async fn remove(&self, kind: MetricKind, name: &str) -> Result<()> {
        let mut map = self.records.write().await;
        map.remove(&metric_key(kind, name));
        Ok(())
    }

    fn batch(self: Arc<Self>) -> Option<Arc<dyn BatchRepository>> {
        Some(self)
    }

    fn backup(self: Arc<Self>) -> Option<Arc<dyn BackupRepository>> {
        if self.snapshot.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl BatchRepository for MemRepository {
    async fn upsert_all(&self, records: &[MetricRecord]) -> Result<()> {
        let mut map = self.records.write().await;
        for record in records {
            Self::merge_into(&mut map, record.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl BackupRepository for MemRepository {
    async fn backup(&self) -> Result<()> {
        let Some(store) = self.snapshot.clone() else {
            return Ok(());
        };
        let records = self.all().await?;
        tokio::task::spawn_blocking(move || store.write(&records)).await?
    }

    /// Re-seeds the map from the snapshot, merging each record like an upsert.
    async fn restore(&self) -> Result<usize> {
        let Some(store) = self.snapshot.clone() else {
            return Ok(0);
        };
        let records = tokio::task::spawn_blocking(move || store.read()).await??;
        let count = records.len();
        self.upsert_all(&records).await?;
        Ok(count)
    }
}
