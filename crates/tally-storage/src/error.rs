use sea_orm::{sqlx, DbErr, RuntimeErr};
use tally_common::error::MetricError;

/// Errors that can occur within the storage layer.
///
/// Repository I/O failures travel unchanged through the collector service to
/// the HTTP layer, which reports them generically.
///
/// # Examples
///
/// ```rust
/// use tally_storage::error::StorageError;
///
/// let err = StorageError::Other("snapshot path is a directory".to_string());
/// assert!(err.to_string().contains("snapshot path"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An error reported by the database driver.
    #[error("Storage: database error: {0}")]
    Db(#[from] DbErr),

    /// Snapshot file I/O failure.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot line could not be encoded or decoded.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored row does not describe a valid metric.
    #[error("Storage: invalid stored metric: {0}")]
    Metric(#[from] MetricError),

    /// A connection attempt did not finish in time.
    #[error("Storage: timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A blocking snapshot task panicked or was cancelled.
    #[error("Storage: background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Generic storage error for cases not covered by other variants.
    #[error("Storage: {0}")]
    Other(String),
}

impl StorageError {
    /// True for failures that may go away by themselves: refused or dropped
    /// connections, exhausted pools and timeouts.
    ///
    /// sea-orm reports every failed connect as `DbErr::Conn`, including ones
    /// the server answered (bad credentials, unknown database) and SQLite
    /// failing to open its file. Only transport-level sqlx errors count.
    pub fn is_connection_error(&self) -> bool {
        match self {
            StorageError::Db(DbErr::ConnectionAcquire(_)) => true,
            StorageError::Db(DbErr::Conn(RuntimeErr::SqlxError(e))) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            StorageError::Timeout(_) => true,
            _ => false,
        }
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
