use crate::transport::{Transport, TransportError};
use std::collections::VecDeque;
use std::sync::Arc;
use tally_common::types::Metrics;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The scope was cancelled before every metric was handed out.
    #[error("dispatch cancelled with {undelivered} metrics not sent")]
    Cancelled { undelivered: usize },

    #[error("send worker failed: {0}")]
    Worker(String),
}

/// Delivers one report's worth of metrics through a [`Transport`].
///
/// In batch mode the whole slice goes out as one request. Otherwise up to
/// `rate_limit` workers pull metrics from a shared queue and send them one
/// by one; a worker stops at its first failure while the others keep
/// draining, and the last failure observed becomes the result.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    batch_enabled: bool,
    rate_limit: usize,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, batch_enabled: bool, rate_limit: usize) -> Self {
        Self {
            transport,
            batch_enabled,
            rate_limit: rate_limit.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.rate_limit
    }

    pub async fn dispatch(
        &self,
        metrics: Vec<Metrics>,
        token: &CancellationToken,
    ) -> Result<(), DispatchError> {
        if metrics.is_empty() {
            return Ok(());
        }
        if token.is_cancelled() {
            return Err(DispatchError::Cancelled {
                undelivered: metrics.len(),
            });
        }
        if self.batch_enabled {
            self.transport.send_batch(&metrics).await?;
            tracing::debug!(count = metrics.len(), "Batch delivered");
            return Ok(());
        }
        self.fan_out(metrics, token).await
    }

    async fn fan_out(&self, metrics: Vec<Metrics>, token: &CancellationToken) -> Result<(), DispatchError> {
        let total = metrics.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(metrics)));
        let mut workers = JoinSet::new();

        for worker in 0..self.rate_limit.min(total) {
            let queue = queue.clone();
            let transport = self.transport.clone();
            let token = token.clone();
            workers.spawn(async move {
                let mut sent = 0usize;
                loop {
                    if token.is_cancelled() {
                        break;
                    }
                    let Some(metric) = queue.lock().await.pop_front() else {
                        break;
                    };
                    if let Err(e) = transport.send(&metric).await {
                        tracing::error!(worker, metric = %metric.id, error = %e, "Send failed, worker stopping");
                        return Err(e);
                    }
                    sent += 1;
                }
                Ok(sent)
            });
        }

        let mut delivered = 0usize;
        let mut last_error = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(sent)) => delivered += sent,
                Ok(Err(e)) => last_error = Some(DispatchError::Transport(e)),
                Err(e) => {
                    tracing::error!(error = %e, "Send worker panicked");
                    last_error = Some(DispatchError::Worker(e.to_string()));
                }
            }
        }

        if let Some(e) = last_error {
            return Err(e);
        }
        let undelivered = queue.lock().await.len();
        if undelivered > 0 {
            return Err(DispatchError::Cancelled { undelivered });
        }
        tracing::debug!(count = delivered, "Metrics delivered");
        Ok(())
    }
}
