use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tally_agent::config::AgentConfig;
use tally_agent::dispatcher::Dispatcher;
use tally_agent::poller;
use tally_agent::report::Reporter;
use tally_agent::transport::HttpTransport;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());
    let config = AgentConfig::resolve(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        server = %config.server_url(),
        poll_secs = config.poll_interval_secs,
        report_secs = config.report_interval_secs,
        batch = config.batch_enabled,
        rate_limit = config.rate_limit,
        signed = config.key.is_some(),
        "tally-agent starting"
    );

    let collectors = tally_collector::default_collectors();
    let (tx, rx) = mpsc::channel(config.channel_capacity(collectors.len()));
    let token = CancellationToken::new();

    let mut tasks = Vec::new();
    for collector in collectors {
        tasks.push(tokio::spawn(poller::run(
            collector,
            Duration::from_secs(config.poll_interval_secs),
            tx.clone(),
            token.clone(),
        )));
    }
    drop(tx);

    let transport = Arc::new(HttpTransport::new(config.server_url(), config.key.clone())?);
    let dispatcher = Dispatcher::new(transport, config.batch_enabled, config.rate_limit);
    let reporter = Reporter::new(
        dispatcher,
        rx,
        Duration::from_secs(config.report_interval_secs),
    );
    tasks.push(tokio::spawn(reporter.run(token.clone())));

    tally_common::shutdown::signal().await;
    tracing::info!("Shutting down gracefully");
    token.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Agent task failed");
        }
    }
    tracing::info!("tally-agent stopped");
    Ok(())
}
