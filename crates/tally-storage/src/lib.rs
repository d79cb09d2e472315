//! Storage layer for current metric values.
//!
//! Two [`MetricRepository`] backends are provided: [`memory::MemRepository`],
//! a lock-guarded map, and [`sql::SqlRepository`], which pushes the merge rule
//! into an `INSERT .. ON CONFLICT` statement via SeaORM. Either can be paired
//! with a [`snapshot::SnapshotStore`] that writes the whole record set to a
//! newline-delimited JSON file with an atomic rename.

pub mod db;
pub mod entities;
pub mod error;
pub mod memory;
pub mod snapshot;
pub mod sql;


use async_trait::async_trait;
use std::sync::Arc;
use tally_common::types::{MetricKind, MetricRecord};

pub use error::{Result, StorageError};
pub use memory::MemRepository;
pub use snapshot::SnapshotStore;
pub use sql::SqlRepository;

/// Authoritative store of the current value of every metric.
///
/// Implementations must be safe to share across threads (`Send + Sync`)
/// because the repository is hit concurrently by every HTTP handler and by
/// the backup task.
///
/// Optional capabilities are discovered through [`MetricRepository::batch`]
/// and [`MetricRepository::backup`], which callers query once and keep.
#[async_trait]
pub trait MetricRepository: Send + Sync {
    /// Inserts the record or merges it into the existing one with the same key.
    async fn upsert(&self, record: MetricRecord) -> Result<()>;

    /// Returns `None` when no record exists for the key.
    async fn find(&self, kind: MetricKind, name: &str) -> Result<Option<MetricRecord>>;

    /// Point-in-time copy of every record, in no particular order.
    async fn all(&self) -> Result<Vec<MetricRecord>>;

    /// Deletes the record if present.
    async fn remove(&self, kind: MetricKind, name: &str) -> Result<()>;

    fn batch(self: Arc<Self>) -> Option<Arc<dyn BatchRepository>> {
        None
    }

    fn backup(self: Arc<Self>) -> Option<Arc<dyn BackupRepository>> {
        None
    }
}

/// Repositories able to apply a set of updates all-or-nothing.
#[async_trait]
pub trait BatchRepository: Send + Sync {
    async fn upsert_all(&self, records: &[MetricRecord]) -> Result<()>;
}

/// Repositories that can externalize their contents to a snapshot and
/// re-seed themselves from it.
#[async_trait]
pub trait BackupRepository: Send + Sync {
    async fn backup(&self) -> Result<()>;

    /// Returns the number of records read from the snapshot.
    async fn restore(&self) -> Result<usize>;
}
