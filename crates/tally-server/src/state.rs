use crate::collector::Collector;
use crate::config::ServerConfig;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tally_common::retry::DEFAULT_DELAYS;

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<Collector>,
    /// Present only when a SQL backend is configured; `/ping` probes it.
    pub db: Option<DatabaseConnection>,
    pub config: Arc<ServerConfig>,
    pub ping_delays: Arc<Vec<Duration>>,
}

impl AppState {
    pub fn new(collector: Arc<Collector>, db: Option<DatabaseConnection>, config: ServerConfig) -> Self {
        Self {
            collector,
            db,
            config: Arc::new(config),
            ping_delays: Arc::new(DEFAULT_DELAYS.to_vec()),
        }
    }

    pub fn with_ping_delays(mut self, delays: Vec<Duration>) -> Self {
        self.ping_delays = Arc::new(delays);
        self
    }

    pub fn signing_key(&self) -> Option<&str> {
        self.config.key.as_deref().filter(|k| !k.is_empty())
    }
}
