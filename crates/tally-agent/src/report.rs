use crate::aggregate::Aggregator;
use crate::dispatcher::{DispatchError, Dispatcher};
use std::time::Duration;
use tally_common::retry::{Attempt, RetryPolicy, DEFAULT_DELAYS};
use tally_common::types::Metrics;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Periodic report loop: drains queued polls, aggregates them and dispatches
/// the result under a retry policy.
///
/// A retry re-sends the whole report, including metrics that already reached
/// the server on the failed attempt.
pub struct Reporter {
    dispatcher: Dispatcher,
    aggregator: Aggregator,
    rx: mpsc::Receiver<Vec<Metrics>>,
    period: Duration,
    delays: Vec<Duration>,
    unsent: Vec<Metrics>,
}

impl Reporter {
    pub fn new(dispatcher: Dispatcher, rx: mpsc::Receiver<Vec<Metrics>>, period: Duration) -> Self {
        Self {
            dispatcher,
            aggregator: Aggregator::new(),
            rx,
            period,
            delays: DEFAULT_DELAYS.to_vec(),
            unsent: Vec::new(),
        }
    }

    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    fn drain(&mut self) -> Vec<Metrics> {
        let mut polls = Vec::new();
        while let Ok(batch) = self.rx.try_recv() {
            polls.push(batch);
        }
        self.aggregator.process(polls)
    }

    /// Sends one report, retrying on failure. A report interrupted by
    /// cancellation is kept for the final flush.
    pub async fn report(&mut self, token: &CancellationToken) -> Result<(), DispatchError> {
        let batch = self.drain();
        let count = batch.len();
        let dispatcher = &self.dispatcher;
        let mut policy = RetryPolicy::with_delays(self.delays.clone());

        let result = policy
            .execute(|attempt| {
                let batch = batch.clone();
                async move {
                    if token.is_cancelled() {
                        return Attempt::Abort(DispatchError::Cancelled { undelivered: count });
                    }
                    match dispatcher.dispatch(batch, token).await {
                        Ok(()) => Attempt::Done(()),
                        Err(e @ DispatchError::Cancelled { .. }) => Attempt::Abort(e),
                        Err(e) => {
                            tracing::warn!(attempt = attempt + 1, error = %e, "Report failed");
                            Attempt::Retry(e)
                        }
                    }
                }
            })
            .await;

        match &result {
            Ok(()) => tracing::debug!(count, attempts = policy.attempts(), "Report sent"),
            Err(DispatchError::Cancelled { .. }) => self.unsent = batch,
            Err(e) => tracing::error!(count, attempts = policy.attempts(), error = %e, "Report dropped after retries"),
        }
        result
    }

    /// Last report on shutdown: whatever is queued plus any report cut short
    /// by cancellation, sent once with a fresh scope.
    pub async fn flush(&mut self) -> Result<(), DispatchError> {
        let mut batch = std::mem::take(&mut self.unsent);
        batch.extend(self.drain());
        let count = batch.len();
        let result = self.dispatcher.dispatch(batch, &CancellationToken::new()).await;
        match &result {
            Ok(()) => tracing::info!(count, "Final report sent"),
            Err(e) => tracing::warn!(count, error = %e, "Final report failed"),
        }
        result
    }

    pub async fn run(mut self, token: CancellationToken) {
        let mut tick = interval_at(Instant::now() + self.period, self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {
                    let _ = self.report(&token).await;
                }
            }
        }

        let _ = self.flush().await;
        tracing::debug!("Reporter stopped");
    }
}
