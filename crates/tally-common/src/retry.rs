use std::future::Future;
use std::time::Duration;

/// Backoff schedule used by agent delivery and by server start-up: 1s, 3s, 5s.
pub const DEFAULT_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// Outcome of one attempt driven by [`RetryPolicy::execute`].
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// Success, stop and return the value.
    Done(T),
    /// Failure worth another try, if attempts remain.
    Retry(E),
    /// Failure that no amount of waiting will fix, stop now.
    Abort(E),
}

impl<T, E> From<Result<T, E>> for Attempt<T, E> {
    fn from(r: Result<T, E>) -> Self {
        match r {
            Ok(v) => Attempt::Done(v),
            Err(e) => Attempt::Retry(e),
        }
    }
}

/// Bounded, deterministic backoff driver.
///
/// The handler runs at least once. After a retryable failure the policy
/// sleeps `delays[min(i, len - 1)]` and tries again, until `max_attempts`
/// invocations have been made. There is no jitter.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tally_common::retry::RetryPolicy;
///
/// let policy = RetryPolicy::new(3, vec![Duration::from_millis(10)]);
/// assert_eq!(policy.max_attempts(), 3);
///
/// // Without delays there is nothing to wait on, so no retry either.
/// assert_eq!(RetryPolicy::new(5, vec![]).max_attempts(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    delays: Vec<Duration>,
    attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_delays(DEFAULT_DELAYS.to_vec())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delays: Vec<Duration>) -> Self {
        let max_attempts = if delays.is_empty() {
            1
        } else {
            max_attempts.max(1)
        };
        Self {
            max_attempts,
            delays,
            attempts: 0,
        }
    }

    /// One initial attempt plus one retry per delay.
    pub fn with_delays(delays: Vec<Duration>) -> Self {
        let max = delays.len() + 1;
        Self::new(max, delays)
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Number of handler invocations made by the last `execute` call.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let last = self.delays.len().saturating_sub(1);
        self.delays
            .get(attempt.min(last))
            .copied()
            .unwrap_or_default()
    }

    /// Drives `handler` until it succeeds, aborts or the attempt budget runs
    /// out, and returns the terminal result. The handler receives the 0-based
    /// attempt index.
    pub async fn execute<T, E, F, Fut>(&mut self, mut handler: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
        E: std::fmt::Display,
    {
        self.attempts = 0;
        loop {
            let attempt = self.attempts;
            self.attempts += 1;
            match handler(attempt).await {
                Attempt::Done(v) => return Ok(v),
                Attempt::Abort(e) => return Err(e),
                Attempt::Retry(e) => {
                    if self.attempts >= self.max_attempts {
                        return Err(e);
                    }
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        attempt = self.attempts,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn always_fail(calls: Arc<AtomicUsize>) -> impl FnMut(usize) -> std::future::Ready<Attempt<(), String>> {
        move |i| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Attempt::Retry(format!("attempt {i} failed")))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_does_not_sleep() {
        let start = Instant::now();
        let mut policy = RetryPolicy::default();
        let out: Result<u32, String> = policy.execute(|_| async { Attempt::Done(7) }).await;
        assert_eq!(out, Ok(7));
        assert_eq!(policy.attempts(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_handler_runs_max_attempts_with_schedule() {
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();
        let mut policy = RetryPolicy::default();

        let out = policy.execute(always_fail(calls.clone())).await;

        assert_eq!(out, Err("attempt 3 failed".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(policy.attempts(), 4);
        // Three sleeps of 1s, 3s and 5s between four attempts.
        assert_eq!(start.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn last_delay_repeats() {
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();
        let mut policy = RetryPolicy::new(
            5,
            vec![Duration::from_millis(100), Duration::from_millis(500)],
        );

        let _ = policy.execute(always_fail(calls.clone())).await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // 100 + 500 + 500 + 500
        assert_eq!(start.elapsed(), Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_immediately() {
        let calls = AtomicUsize::new(0);
        let mut policy = RetryPolicy::default();
        let out: Result<(), &str> = policy
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Attempt::Abort("permission denied") }
            })
            .await;
        assert_eq!(out, Err("permission denied"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let mut policy = RetryPolicy::default();
        let out: Result<usize, String> = policy
            .execute(|i| async move {
                if i < 2 {
                    Attempt::Retry("connection refused".to_string())
                } else {
                    Attempt::Done(i)
                }
            })
            .await;
        assert_eq!(out, Ok(2));
        assert_eq!(policy.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn degenerate_policies_make_one_attempt() {
        for mut policy in [
            RetryPolicy::new(10, vec![]),
            RetryPolicy::new(0, vec![Duration::from_secs(1)]),
            RetryPolicy::with_delays(vec![]),
        ] {
            let calls = Arc::new(AtomicUsize::new(0));
            let _ = policy.execute(always_fail(calls.clone())).await;
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn result_converts_to_retry() {
        let mut policy = RetryPolicy::new(2, vec![Duration::from_millis(1)]);
        let out: Result<(), String> = policy
            .execute(|_| async { Err::<(), _>("boom".to_string()).into() })
            .await;
        assert_eq!(out, Err("boom".to_string()));
        assert_eq!(policy.attempts(), 2);
    }
}
