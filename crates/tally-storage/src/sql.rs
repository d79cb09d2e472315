use crate::entities::metric::{self, Column as MetricCol, Entity as MetricEntity};
use crate::error::{Result, StorageError};
use crate::snapshot::SnapshotStore;
use crate::{BackupRepository, BatchRepository, MetricRepository};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter,
    Statement, TransactionTrait,
};
use std::sync::Arc;
use tally_common::types::{metric_key, MetricKind, MetricRecord};

/// What an upsert does when the (type, name) row already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnConflict {
    /// Counters accumulate, gauges take the incoming value.
    Merge,
    /// Gauges take the incoming value, stored counters are left alone.
    Replace,
}

/// Repository over the `metrics` table.
///
/// Holds no application-level lock: the merge rule runs inside the upsert
/// statement and the database serializes concurrent writers.
pub struct SqlRepository {
    db: DatabaseConnection,
    snapshot: Option<SnapshotStore>,
}

impl SqlRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db, snapshot: None }
    }

    pub fn with_snapshot(db: DatabaseConnection, snapshot: SnapshotStore) -> Self {
        Self {
            db,
            snapshot: Some(snapshot),
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    fn upsert_statement(&self, record: &MetricRecord, mode: OnConflict) -> Result<Statement> {
        let backend = self.db.get_database_backend();
        let placeholders = match backend {
            DbBackend::Postgres => "$1, $2, $3, $4",
            DbBackend::Sqlite => "?, ?, ?, ?",
            other => {
                return Err(StorageError::Other(format!(
                    "unsupported database backend: {other:?}"
                )))
            }
        };
        let update = match mode {
            OnConflict::Merge => "delta = metrics.delta + excluded.delta, value = excluded.value",
            OnConflict::Replace => "value = excluded.value",
        };
        let sql = format!(
            r#"INSERT INTO metrics ("type", "name", "delta", "value") VALUES ({placeholders})
ON CONFLICT ("type", "name") DO UPDATE SET {update}, updated_at = CURRENT_TIMESTAMP"#
        );
        Ok(Statement::from_sql_and_values(
            backend,
            sql,
            [
                record.kind.as_str().into(),
                record.name.clone().into(),
                record.delta.into(),
                record.value.into(),
            ],
        ))
    }

    async fn upsert_in_transaction(&self, records: &[MetricRecord], mode: OnConflict) -> Result<()> {
        let txn = self.db.begin().await?;
        for record in records {
            let stmt = self.upsert_statement(record, mode)?;
            if let Err(e) = txn.execute(stmt).await {
                if let Err(rb) = txn.rollback().await {
                    tracing::warn!(error = %rb, "Rollback after failed upsert also failed");
                }
                return Err(e.into());
            }
        }
        txn.commit().await?;
        Ok(())
    }
}

fn to_record(m: metric::Model) -> Result<MetricRecord> {
    let kind: MetricKind = m.kind.parse()?;
    Ok(MetricRecord {
        key: metric_key(kind, &m.name),
        kind,
        name: m.name,
        delta: m.delta,
        value: m.value,
    })
}

#[async_trait]
impl MetricRepository for SqlRepository {
    async fn upsert(&self, record: MetricRecord) -> Result<()> {
        let stmt = self.upsert_statement(&record, OnConflict::Merge)?;
        self.db.execute(stmt).await?;
        Ok(())
    }

    async fn find(&self, kind: MetricKind, name: &str) -> Result<Option<MetricRecord>> {
        let row = MetricEntity::find()
            .filter(MetricCol::Kind.eq(kind.as_str()))
            .filter(MetricCol::Name.eq(name))
            .one(&self.db)
            .await?;
        row.map(to_record).transpose()
    }

    async fn all(&self) -> Result<Vec<MetricRecord>> {
        let stream = MetricEntity::find().stream(&self.db).await?;
        futures_util::pin_mut!(stream);
        let mut records = Vec::new();
        while let Some(row) = stream.try_next().await? {
            records.push(to_record(row)?);
        }
        Ok(records)
    }

    async fn remove(&self, kind: MetricKind, name: &str) -> Result<()> {
        MetricEntity::delete_many()
            .filter(MetricCol::Kind.eq(kind.as_str()))
            .filter(MetricCol::Name.eq(name))
            .exec(&self.db)
            .await?;
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
impl BatchRepository for SqlRepository {
    async fn upsert_all(&self, records: &[MetricRecord]) -> Result<()> {
        self.upsert_in_transaction(records, OnConflict::Merge).await
    }
}

#[async_trait]
impl BackupRepository for SqlRepository {
    async fn backup(&self) -> Result<()> {
        let Some(store) = self.snapshot.clone() else {
            return Ok(());
        };
        let records = self.all().await?;
        tokio::task::spawn_blocking(move || store.write(&records)).await?
    }

    /// The table already holds accumulated counters, so the snapshot only
    /// fills in missing rows and refreshes gauges.
    async fn restore(&self) -> Result<usize> {
        let Some(store) = self.snapshot.clone() else {
            return Ok(0);
        };
        let records = tokio::task::spawn_blocking(move || store.read()).await??;
        self.upsert_in_transaction(&records, OnConflict::Replace).await?;
        Ok(records.len())
    }
}
