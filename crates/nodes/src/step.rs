//! `StepRunner`: the retriable, memoized unit of work inside an executor.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::NodeError;

/// Upper bound on a single back-off sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retry tuning for steps.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of re-attempts after the first failure.
    pub max_retries: u32,
    /// Base back-off; attempt `n` waits `base * 2^(n-1)`, capped at
    /// [`MAX_BACKOFF`].
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Runs the side-effecting steps of one workflow run.
///
/// A step that has already succeeded in this run is not re-invoked: its
/// recorded result is returned instead.
#[derive(Debug, Default)]
pub struct StepRunner {
    policy: RetryPolicy,
    completed: Mutex<HashMap<String, Value>>,
}

impl StepRunner {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            completed: Mutex::new(HashMap::new()),
        }
    }

    /// Run step `name` for `node_id`, retrying retryable failures.
    pub async fn run<T, F, Fut>(&self, node_id: &str, name: &str, mut f: F) -> Result<T, NodeError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        let key = format!("{node_id}:{name}");

        if let Some(recorded) = self.recorded(&key) {
            if let Ok(value) = serde_json::from_value(recorded) {
                debug!(step = %key, "replaying recorded step result");
                return Ok(value);
            }
        }

        let mut attempts = 0u32;
        loop {
            match f().await {
                Ok(value) => {
                    self.record(&key, &value);
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => {
                    attempts += 1;
                    if attempts > self.policy.max_retries {
                        return Err(NodeError::RetryExhausted {
                            step: key,
                            attempts,
                            message: err.to_string(),
                        });
                    }

                    let delay = backoff(self.policy.base_delay, attempts);
                    warn!(
                        step = %key,
                        attempt = attempts,
                        max_retries = self.policy.max_retries,
                        ?delay,
                        error = %err,
                        "retryable step failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Number of steps that completed in this run.
    pub fn completed_steps(&self) -> usize {
        self.lock().len()
    }

    fn recorded(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    fn record<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => {
                self.lock().insert(key.to_owned(), v);
            }
            Err(e) => warn!(step = %key, error = %e, "step result is not serializable; not recorded"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sleep before re-attempt `attempt` (1-based).
fn backoff(base: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> StepRunner {
        StepRunner::new(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
        })
    }

    #[tokio::test]
    async fn completed_step_is_not_invoked_again() {
        let runner = fast();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        for _ in 0..2 {
            let out: u32 = runner
                .run("n1", "send", move || async move {
                    Ok(calls.fetch_add(1, Ordering::SeqCst) + 40)
                })
                .await
                .unwrap();
            assert_eq!(out, 40);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(runner.completed_steps(), 1);
    }

    #[tokio::test]
    async fn same_step_name_on_different_nodes_is_distinct() {
        let runner = fast();
        let a: String = runner.run("a", "s", || async { Ok("a".to_owned()) }).await.unwrap();
        let b: String = runner.run("b", "s", || async { Ok("b".to_owned()) }).await.unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("a", "b"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_with_backoff() {
        let runner = fast();
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let started = tokio::time::Instant::now();

        let out: u32 = runner
            .run("n1", "flaky", move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(NodeError::transient("503")),
                    n => Ok(n),
                }
            })
            .await
            .unwrap();

        assert_eq!(out, 2);
        // 10ms + 20ms of back-off.
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_report_the_attempt_count() {
        let runner = fast();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let err = runner
            .run::<(), _, _>("n1", "down", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(NodeError::transient("connection refused"))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            err,
            NodeError::RetryExhausted {
                step: "n1:down".into(),
                attempts: 3,
                message: "connection refused".into(),
            }
        );
    }

    #[test]
    fn backoff_doubles_then_saturates() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff(base, 1), Duration::from_millis(100));
        assert_eq!(backoff(base, 3), Duration::from_millis(400));
        assert_eq!(backoff(base, 20), MAX_BACKOFF);
        assert_eq!(backoff(base, 33), MAX_BACKOFF);
        assert_eq!(backoff(Duration::from_secs(u64::MAX / 2), 2), MAX_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn large_retry_budget_runs_to_exhaustion() {
        let runner = StepRunner::new(RetryPolicy {
            max_retries: 40,
            base_delay: Duration::from_millis(1),
        });
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let err = runner
            .run::<(), _, _>("n1", "down", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(NodeError::transient("503"))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 41);
        assert!(matches!(err, NodeError::RetryExhausted { attempts: 41, .. }));
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let runner = fast();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let err = runner
            .run::<(), _, _>("n1", "bad", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(NodeError::permanent("HTTP 404"))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err, NodeError::permanent("HTTP 404"));
        assert_eq!(runner.completed_steps(), 0);
    }
}
