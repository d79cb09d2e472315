use std::collections::BTreeMap;
use tally_common::types::{Metrics, POLL_COUNT, RANDOM_VALUE};

/// Folds the poll batches queued since the last report into one list.
///
/// Readings are merged by `type:name`, later polls winning. Two synthetic metrics
/// are appended: `PollCount`, a counter holding the number of polls folded
/// in, and `RandomValue`, a fresh random gauge.
pub struct Aggregator {
    random: fn() -> f64,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self::with_random(rand::random::<f64>)
    }

    pub fn with_random(random: fn() -> f64) -> Self {
        Self { random }
    }

    pub fn process(&self, polls: Vec<Vec<Metrics>>) -> Vec<Metrics> {
        let poll_count = polls.len() as i64;
        let mut merged = BTreeMap::new();
        for batch in polls {
            for metric in batch {
                merged.insert(metric.key(), metric);
            }
        }

        let mut out: Vec<Metrics> = merged.into_values().collect();
        out.push(Metrics::counter(POLL_COUNT, poll_count));
        out.push(Metrics::gauge(RANDOM_VALUE, (self.random)()));
        out
    }
}
