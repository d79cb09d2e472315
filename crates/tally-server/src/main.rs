use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tally_common::retry::RetryPolicy;
use tally_server::app;
use tally_server::collector::{self, Collector};
use tally_server::config::ServerConfig;
use tally_server::state::AppState;
use tally_storage::{db, MemRepository, MetricRepository, SnapshotStore, SqlRepository};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = ServerConfig::resolve(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        address = %config.bind_address(),
        store_interval_secs = config.store_interval_secs,
        snapshot = %config.file_storage_path,
        restore = config.restore,
        db = %config.redacted_dsn(),
        signed = config.key.is_some(),
        "tally-server starting"
    );

    let snapshot = config
        .snapshot_enabled()
        .then(|| SnapshotStore::new(&config.file_storage_path));

    let mut db = None;
    let repo: Arc<dyn MetricRepository> = if config.database_dsn.is_empty() {
        Arc::new(match snapshot {
            Some(store) => MemRepository::with_snapshot(store),
            None => MemRepository::new(),
        })
    } else {
        let conn = db::connect(&config.database_dsn, &mut RetryPolicy::default()).await?;
        db = Some(conn.clone());
        Arc::new(match snapshot {
            Some(store) => SqlRepository::with_snapshot(conn, store),
            None => SqlRepository::new(conn),
        })
    };

    let collector = Arc::new(Collector::new(repo).with_sync_backup(config.sync_backup()));

    if config.restore {
        match collector.restore().await {
            Ok(count) => tracing::info!(count, "Metrics restored from snapshot"),
            Err(e) => tracing::error!(error = %e, "Restore failed, starting with current contents"),
        }
    }

    let token = CancellationToken::new();
    let backup_task = (!config.sync_backup()).then(|| {
        tokio::spawn(collector::run_backup_loop(
            collector.clone(),
            Duration::from_secs(config.store_interval_secs),
            token.clone(),
        ))
    });

    let bind = config.bind_address();
    let state = AppState::new(collector.clone(), db, config);
    let router = app::build_http_app(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(address = %bind, "HTTP server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(tally_common::shutdown::signal())
        .await?;

    tracing::info!("Shutting down gracefully");
    token.cancel();
    match backup_task {
        Some(task) => {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Backup task failed");
            }
        }
        None => {
            if let Err(e) = collector.backup().await {
                tracing::error!(error = %e, "Final backup failed");
            }
        }
    }
    tracing::info!("tally-server stopped");
    Ok(())
}
