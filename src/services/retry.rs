//! Fibonacci backoff retry engine.
//!
//! Every external I/O in the substrate is driven through this engine.
//! The schedule is fixed at seven Fibonacci steps, so the worst-case
//! sleep is bounded: sum(F) × base interval, 33 s at defaults.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};

/// Backoff multipliers per retry. F[n] = F[n−1] + F[n−2] for n ≥ 2.
pub const FIB_SCHEDULE: [u64; 7] = [1, 1, 2, 3, 5, 8, 13];

/// Retries beyond the first attempt; at most 8 invocations total.
pub const MAX_RETRIES: usize = FIB_SCHEDULE.len();

/// Signal checked between attempts; flipping it to true stops the run
/// at the next wake-up.
pub type CancelSignal = watch::Receiver<bool>;

/// One attempt in the log.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Backoff slept before this attempt; zero for the first.
    pub delay: Duration,
    /// Error text when the attempt failed.
    pub error: Option<String>,
}

/// Full outcome of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Final value or the last attempt's error.
    pub result: DomainResult<T>,
    /// Invocations made, including the first.
    pub attempts: u32,
    /// Total backoff slept; zero iff the first attempt succeeded.
    pub total_delay: Duration,
    pub attempt_log: Vec<AttemptRecord>,
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Bounded Fibonacci-with-jitter retry driver.
#[derive(Debug, Clone)]
pub struct FibonacciRetry {
    base_interval: Duration,
    /// Jitter fraction r: each delay is scaled by (1 + x), x ∈ [−r, +r].
    jitter: f64,
    max_retries: usize,
}

impl Default for FibonacciRetry {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(1_000),
            jitter: 0.10,
            max_retries: MAX_RETRIES,
        }
    }
}

impl FibonacciRetry {
    pub fn new(base_interval: Duration, jitter: f64, max_retries: usize) -> Self {
        Self {
            base_interval,
            jitter: jitter.clamp(0.0, 1.0),
            max_retries: max_retries.min(MAX_RETRIES),
        }
    }

    /// Deterministic delay for retry index `i` (0 = first retry) before
    /// jitter.
    pub fn base_delay(&self, retry_index: usize) -> Duration {
        let multiplier = FIB_SCHEDULE[retry_index.min(FIB_SCHEDULE.len() - 1)];
        self.base_interval * u32::try_from(multiplier).unwrap_or(u32::MAX)
    }

    /// Jittered delay for retry index `i`, clamped at zero.
    fn jittered_delay(&self, retry_index: usize) -> Duration {
        let base = self.base_delay(retry_index).as_secs_f64();
        let spread = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        Duration::from_secs_f64((base * (1.0 + spread)).max(0.0))
    }

    /// Upper bound on total sleep across a full run, before jitter.
    pub fn max_total_delay(&self) -> Duration {
        FIB_SCHEDULE[..self.max_retries]
            .iter()
            .map(|&f| self.base_interval * u32::try_from(f).unwrap_or(u32::MAX))
            .sum()
    }

    /// Run the operation, retrying transient failures on the Fibonacci
    /// schedule. Returns on the first success; non-transient errors
    /// abort immediately; exhaustion surfaces the last error.
    pub async fn execute<F, Fut, T>(&self, op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        self.run(op, None).await
    }

    /// Like [`Self::execute`], but stops with a cancelled error when the
    /// signal flips between attempts.
    pub async fn execute_cancellable<F, Fut, T>(
        &self,
        op: F,
        cancel: CancelSignal,
    ) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        self.run(op, Some(cancel)).await
    }

    async fn run<F, Fut, T>(&self, mut op: F, cancel: Option<CancelSignal>) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        let mut attempt_log = Vec::new();
        let mut total_delay = Duration::ZERO;

        for attempt in 1..=(self.max_retries as u32 + 1) {
            // First attempt runs undelayed.
            let delay = if attempt == 1 {
                Duration::ZERO
            } else {
                self.jittered_delay(attempt as usize - 2)
            };

            if !delay.is_zero() {
                if let Some(cancel) = &cancel {
                    let mut cancel = cancel.clone();
                    tokio::select! {
                        () = sleep(delay) => {}
                        _ = cancel.wait_for(|&c| c) => {
                            attempt_log.push(AttemptRecord {
                                attempt,
                                delay,
                                error: Some("cancelled".to_string()),
                            });
                            return RetryOutcome {
                                result: Err(DomainError::Cancelled),
                                attempts: attempt - 1,
                                total_delay,
                                attempt_log,
                            };
                        }
                    }
                } else {
                    sleep(delay).await;
                }
                total_delay += delay;
            } else if let Some(cancel) = &cancel {
                if *cancel.borrow() {
                    return RetryOutcome {
                        result: Err(DomainError::Cancelled),
                        attempts: attempt - 1,
                        total_delay,
                        attempt_log,
                    };
                }
            }

            match op(attempt).await {
                Ok(value) => {
                    attempt_log.push(AttemptRecord {
                        attempt,
                        delay,
                        error: None,
                    });
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        total_delay,
                        attempt_log,
                    };
                }
                Err(err) => {
                    let exhausted = attempt as usize > self.max_retries;
                    attempt_log.push(AttemptRecord {
                        attempt,
                        delay,
                        error: Some(err.to_string()),
                    });

                    if !err.is_transient() {
                        debug!(attempt, error = %err, "non-retriable error, aborting");
                        return RetryOutcome {
                            result: Err(err),
                            attempts: attempt,
                            total_delay,
                            attempt_log,
                        };
                    }
                    if exhausted {
                        warn!(attempt, error = %err, "retry budget exhausted");
                        return RetryOutcome {
                            result: Err(DomainError::Exhausted {
                                attempts: attempt,
                                last_error: err.to_string(),
                            }),
                            attempts: attempt,
                            total_delay,
                            attempt_log,
                        };
                    }
                    debug!(attempt, error = %err, "transient failure, will retry");
                }
            }
        }

        unreachable!("retry loop returns from within");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_retry(max_retries: usize) -> FibonacciRetry {
        FibonacciRetry::new(Duration::from_millis(1), 0.0, max_retries)
    }

    #[test]
    fn schedule_is_fibonacci() {
        for n in 2..FIB_SCHEDULE.len() {
            assert_eq!(FIB_SCHEDULE[n], FIB_SCHEDULE[n - 1] + FIB_SCHEDULE[n - 2]);
        }
        assert_eq!(FIB_SCHEDULE.iter().sum::<u64>(), 33);
    }

    #[test]
    fn default_schedule_bounds_total_delay() {
        let retry = FibonacciRetry::default();
        assert_eq!(retry.max_total_delay(), Duration::from_millis(33_000));
        // Retry index 4 maps to multiplier 5: 5000 ms at the default base.
        assert_eq!(retry.base_delay(4), Duration::from_millis(5_000));
    }

    #[tokio::test]
    async fn first_success_returns_immediately() {
        let retry = fast_retry(7);
        let outcome = retry.execute(|_| async { Ok::<_, DomainError>(42) }).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.total_delay, Duration::ZERO);
        assert_eq!(outcome.attempt_log.len(), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let retry = fast_retry(7);
        let calls = Arc::new(AtomicU32::new(0));
        let outcome = retry
            .execute(|_| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(DomainError::Transient("flaky".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(outcome.total_delay > Duration::ZERO);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error() {
        let retry = fast_retry(2);
        let calls = Arc::new(AtomicU32::new(0));
        let outcome: RetryOutcome<()> = retry
            .execute(|_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(DomainError::Transient("still down".into()))
                }
            })
            .await;
        assert!(!outcome.is_success());
        // max_retries + 1 invocations.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.attempts, 3);
        match outcome.result {
            Err(DomainError::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("still down"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_transient_errors_abort_immediately() {
        let retry = fast_retry(7);
        let calls = Arc::new(AtomicU32::new(0));
        let outcome: RetryOutcome<()> = retry
            .execute(|_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(DomainError::InvalidInput("bad request".into()))
                }
            })
            .await;
        assert!(!outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_between_attempts() {
        let retry = FibonacciRetry::new(Duration::from_millis(50), 0.0, 7);
        let (tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in_op = Arc::clone(&calls);
        let handle = tokio::spawn(async move {
            retry
                .execute_cancellable(
                    move |_| {
                        let calls = Arc::clone(&calls_in_op);
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Err::<(), _>(DomainError::Transient("down".into()))
                        }
                    },
                    rx,
                )
                .await
        });

        // Let the first attempt fail, then cancel during the backoff.
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome.result, Err(DomainError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_jitter_delays_match_schedule() {
        let retry = FibonacciRetry::new(Duration::from_millis(1), 0.0, 3);
        let outcome: RetryOutcome<()> = retry
            .execute(|_| async { Err(DomainError::Transient("x".into())) })
            .await;
        // Delays: 0, 1, 1, 2 ms → total 4 ms of backoff.
        assert_eq!(outcome.total_delay, Duration::from_millis(4));
        assert_eq!(outcome.attempt_log[0].delay, Duration::ZERO);
        assert_eq!(outcome.attempt_log[1].delay, Duration::from_millis(1));
        assert_eq!(outcome.attempt_log[3].delay, Duration::from_millis(2));
    }
}
