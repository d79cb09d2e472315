use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Server address, `host:port` or a full URL.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Send one `/updates/` request per report instead of one request per metric.
    #[serde(default)]
    pub batch_enabled: bool,
    /// Signing key for the `HashSHA256` header
    #[serde(default)]
    pub key: Option<String>,
    /// Parallel senders in per-metric mode
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_report_interval() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    2
}

fn default_rate_limit() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            report_interval_secs: default_report_interval(),
            poll_interval_secs: default_poll_interval(),
            batch_enabled: false,
            key: None,
            rate_limit: default_rate_limit(),
            log_level: default_log_level(),
        }
    }
}

impl AgentConfig {
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

    /// Overrides fields from `ADDRESS`, `REPORT_INTERVAL`, `POLL_INTERVAL`,
    /// `BATCH_ENABLED`, `KEY`, `RATE_LIMIT` and `LOG_LEVEL`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = var("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = var("REPORT_INTERVAL") {
            self.report_interval_secs = v
                .parse()
                .map_err(|e| anyhow::anyhow!("REPORT_INTERVAL '{v}': {e}"))?;
        }
        if let Some(v) = var("POLL_INTERVAL") {
            self.poll_interval_secs = v
                .parse()
                .map_err(|e| anyhow::anyhow!("POLL_INTERVAL '{v}': {e}"))?;
        }
        if let Some(v) = var("BATCH_ENABLED") {
            self.batch_enabled = v
                .parse()
                .map_err(|e| anyhow::anyhow!("BATCH_ENABLED '{v}': {e}"))?;
        }
        if let Some(v) = var("KEY") {
            self.key = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = var("RATE_LIMIT") {
            self.rate_limit = v
                .parse()
                .map_err(|e| anyhow::anyhow!("RATE_LIMIT '{v}': {e}"))?;
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
        if self.report_interval_secs == 0 {
            anyhow::bail!("report interval must be at least 1 second");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll interval must be at least 1 second");
        }
        Ok(())
    }

    /// Base URL of the server, adding `http://` when no scheme is given.
    pub fn server_url(&self) -> String {
        let addr = self.address.trim().trim_end_matches('/');
        if addr.contains("://") {
            return addr.to_string();
        }
        format!("http://{addr}")
    }

    /// Capacity of the poll channel: enough for two report intervals' worth
    /// of batches from every poller.
    pub fn channel_capacity(&self, pollers: usize) -> usize {
        let per_report = self.report_interval_secs.div_ceil(self.poll_interval_secs.max(1));
        (per_report as usize * 2 * pollers.max(1)).max(1)
    }
}
