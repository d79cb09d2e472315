use std::time::Duration;
use tally_collector::Collector;
use tally_common::types::Metrics;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Samples `collector` every `period` and pushes each batch into `tx` until
/// the token is cancelled or the receiver goes away. The first sample is
/// taken one period after start.
pub async fn run(
    mut collector: Box<dyn Collector>,
    period: Duration,
    tx: mpsc::Sender<Vec<Metrics>>,
    token: CancellationToken,
) {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => {
                let batch = match collector.collect() {
                    Ok(batch) => batch,
                    Err(e) => {
                        tracing::warn!(collector = collector.name(), error = %e, "Collection failed");
                        continue;
                    }
                };
                tracing::trace!(collector = collector.name(), count = batch.len(), "Collected");
                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = tx.send(batch) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
    tracing::debug!(collector = collector.name(), "Poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        calls: usize,
        fail_every: Option<usize>,
    }

    impl Collector for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn collect(&mut self) -> anyhow::Result<Vec<Metrics>> {
            self.calls += 1;
            if self.fail_every.is_some_and(|n| self.calls % n == 0) {
                anyhow::bail!("sensor offline");
            }
            Ok(vec![Metrics::gauge("Calls", self.calls as f64)])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pushes_one_batch_per_period() {
        let (tx, mut rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        let task = tokio::spawn(run(
            Box::new(Fixed { calls: 0, fail_every: None }),
            Duration::from_secs(2),
            tx,
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(6500)).await;
        token.cancel();
        task.await.unwrap();

        let mut got = Vec::new();
        while let Ok(batch) = rx.try_recv() {
            got.push(batch[0].value.unwrap());
        }
        assert_eq!(got, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn collection_errors_are_skipped() {
        let (tx, mut rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        let task = tokio::spawn(run(
            Box::new(Fixed { calls: 0, fail_every: Some(2) }),
            Duration::from_secs(1),
            tx,
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(4500)).await;
        token.cancel();
        task.await.unwrap();

        let mut got = Vec::new();
        while let Ok(batch) = rx.try_recv() {
            got.push(batch[0].value.unwrap());
        }
        assert_eq!(got, vec![1.0, 3.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_receiver_is_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        run(
            Box::new(Fixed { calls: 0, fail_every: None }),
            Duration::from_secs(1),
            tx,
            CancellationToken::new(),
        )
        .await;
    }
}
