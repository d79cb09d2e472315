use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address, `host:port` or `:port` for every interface.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seconds between scheduled backups; 0 backs up after every write.
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: u64,
    /// Snapshot file; empty disables file snapshots.
    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: String,
    /// Re-seed the repository from the snapshot on startup.
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// SQL backend; empty keeps metrics in memory.
    #[serde(default)]
    pub database_dsn: String,
    /// Key for `HashSHA256` verification and response signing
    #[serde(default)]
    pub key: Option<String>,
}

fn default_address() -> String {
    ":8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_store_interval() -> u64 {
    300
}

fn default_file_storage_path() -> String {
    "/tmp/metrics-db.json".to_string()
}

fn default_restore() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            log_level: default_log_level(),
            store_interval_secs: default_store_interval(),
            file_storage_path: default_file_storage_path(),
            restore: default_restore(),
            database_dsn: String::new(),
            key: None,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads `path` when it exists, falls back to defaults otherwise, then
    /// applies environment overrides and validates the result.
    pub fn resolve(path: &str) -> anyhow::Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from `ADDRESS`, `STORE_INTERVAL`, `FILE_STORAGE_PATH`,
    /// `RESTORE`, `DATABASE_DSN`, `KEY` and `LOG_LEVEL`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = var("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = var("STORE_INTERVAL") {
            self.store_interval_secs = v
                .parse()
                .map_err(|e| anyhow::anyhow!("STORE_INTERVAL '{v}': {e}"))?;
        }
        if let Some(v) = var("FILE_STORAGE_PATH") {
            self.file_storage_path = v;
        }
        if let Some(v) = var("RESTORE") {
            self.restore = v
                .parse()
                .map_err(|e| anyhow::anyhow!("RESTORE '{v}': {e}"))?;
        }
        if let Some(v) = var("DATABASE_DSN") {
            self.database_dsn = v;
        }
        if let Some(v) = var("KEY") {
            self.key = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.address.trim().is_empty() {
            anyhow::bail!("address is required");
        }
        Ok(())
    }

    /// Socket address to bind. A bare `:port` listens on all interfaces.
    pub fn bind_address(&self) -> String {
        let addr = self.address.trim();
        match addr.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => addr.to_string(),
        }
    }

    pub fn snapshot_enabled(&self) -> bool {
        !self.file_storage_path.trim().is_empty()
    }

    pub fn sync_backup(&self) -> bool {
        self.store_interval_secs == 0
    }

    /// DSN with any password replaced, for logging.
    pub fn redacted_dsn(&self) -> String {
        let dsn = &self.database_dsn;
        let (Some(scheme_end), Some(at)) = (dsn.find("://"), dsn.rfind('@')) else {
            return dsn.clone();
        };
        if at < scheme_end + 3 {
            return dsn.clone();
        }
        match dsn[scheme_end + 3..at].split_once(':') {
            Some((user, _)) => {
                format!("{}{user}:***{}", &dsn[..scheme_end + 3], &dsn[at..])
            }
            _ => dsn.clone(),
        }
    }
}
