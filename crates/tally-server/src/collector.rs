use std::sync::Arc;
use std::time::Duration;
use tally_common::error::MetricError;
use tally_common::retry::{Attempt, RetryPolicy, DEFAULT_DELAYS};
use tally_common::types::{MetricKind, MetricRecord, Metrics};
use tally_storage::{BackupRepository, BatchRepository, MetricRepository, StorageError};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Orchestrates writes, lookups and snapshots over one repository.
///
/// Optional repository capabilities are resolved once at construction.
pub struct Collector {
    repo: Arc<dyn MetricRepository>,
    batch: Option<Arc<dyn BatchRepository>>,
    snapshot: Option<Arc<dyn BackupRepository>>,
    sync_backup: bool,
    restore_delays: Vec<Duration>,
}

impl Collector {
    pub fn new(repo: Arc<dyn MetricRepository>) -> Self {
        let batch = repo.clone().batch();
        let snapshot = repo.clone().backup();
        Self {
            repo,
            batch,
            snapshot,
            sync_backup: false,
            restore_delays: DEFAULT_DELAYS.to_vec(),
        }
    }

    /// Back up after every successful write instead of on a timer.
    pub fn with_sync_backup(mut self, enabled: bool) -> Self {
        self.sync_backup = enabled;
        self
    }

    pub fn with_restore_delays(mut self, delays: Vec<Duration>) -> Self {
        self.restore_delays = delays;
        self
    }

    pub fn supports_backup(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn supports_batch(&self) -> bool {
        self.batch.is_some()
    }

    pub async fn save(&self, metric: &Metrics) -> Result<(), CollectorError> {
        let record = MetricRecord::from_metrics(metric)?;
        self.repo.upsert(record).await?;
        self.after_write().await;
        Ok(())
    }

    /// Validates every metric before writing any. Batch-capable repositories
    /// apply the set all-or-nothing; others get one upsert per record.
    pub async fn save_all(&self, metrics: &[Metrics]) -> Result<(), CollectorError> {
        let records = metrics
            .iter()
            .map(MetricRecord::from_metrics)
            .collect::<Result<Vec<_>, _>>()?;

        match &self.batch {
            Some(batch) => batch.upsert_all(&records).await?,
            None => {
                for record in records {
                    self.repo.upsert(record).await?;
                }
            }
        }
        self.after_write().await;
        Ok(())
    }

    pub async fn find(&self, kind: &str, name: &str) -> Result<MetricRecord, CollectorError> {
        let kind: MetricKind = kind.parse()?;
        self.repo
            .find(kind, name)
            .await?
            .ok_or_else(|| {
                MetricError::ValueNotFound {
                    kind,
                    name: name.to_string(),
                }
                .into()
            })
    }

    pub async fn remove(&self, kind: &str, name: &str) -> Result<(), CollectorError> {
        let kind: MetricKind = kind.parse()?;
        self.repo.remove(kind, name).await?;
        Ok(())
    }

    pub async fn all(&self) -> Result<Vec<MetricRecord>, CollectorError> {
        Ok(self.repo.all().await?)
    }

    /// Writes the snapshot. A no-op when the repository has no snapshot store.
    pub async fn backup(&self) -> Result<(), CollectorError> {
        let Some(snapshot) = &self.snapshot else {
            tracing::debug!("Repository has no snapshot store, backup skipped");
            return Ok(());
        };
        snapshot.backup().await?;
        tracing::debug!("Snapshot written");
        Ok(())
    }

    /// Re-seeds the repository from its snapshot, retrying transient
    /// failures. Returns the number of records read.
    pub async fn restore(&self) -> Result<usize, CollectorError> {
        let Some(snapshot) = &self.snapshot else {
            tracing::debug!("Repository has no snapshot store, restore skipped");
            return Ok(0);
        };
        let mut policy = RetryPolicy::with_delays(self.restore_delays.clone());
        let restored = policy
            .execute(|attempt| async move {
                match snapshot.restore().await {
                    Ok(count) => Attempt::Done(count),
                    Err(e) => {
                        tracing::warn!(attempt = attempt + 1, error = %e, "Restore failed");
                        Attempt::Retry(e)
                    }
                }
            })
            .await?;
        Ok(restored)
    }

    async fn after_write(&self) {
        if !self.sync_backup {
            return;
        }
        if let Err(e) = self.backup().await {
            tracing::error!(error = %e, "Synchronous backup failed");
        }
    }
}

/// Backs up every `period` until cancelled, then once more before returning.
pub async fn run_backup_loop(collector: Arc<Collector>, period: Duration, token: CancellationToken) {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => {
                if let Err(e) = collector.backup().await {
                    tracing::error!(error = %e, "Scheduled backup failed");
                }
            }
        }
    }

    match collector.backup().await {
        Ok(()) => tracing::info!("Final backup written"),
        Err(e) => tracing::error!(error = %e, "Final backup failed"),
    }
}
