//! Bounded retries of a collaborator call inside one overall time budget.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::EnrichmentError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, at least one.
    pub max_attempts: u32,
    /// Budget shared by every attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            timeout,
        }
    }

    /// Call `op` until it succeeds, the attempts run out, or the budget
    /// elapses. Attempts are back to back.
    pub async fn run<T, F, Fut>(&self, service: &'static str, mut op: F) -> Result<T, EnrichmentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EnrichmentError>>,
    {
        let attempts = self.max_attempts.max(1);
        let budget = async {
            for attempt in 1..=attempts {
                match op().await {
                    Ok(value) => return Ok(value),
                    Err(e) => warn!(
                        service,
                        attempt,
                        remaining = attempts - attempt,
                        error = %e,
                        "Collaborator call failed"
                    ),
                }
            }
            Err(EnrichmentError::RetriesExhausted { service, attempts })
        };

        match tokio::time::timeout(self.timeout, budget).await {
            Ok(result) => result,
            Err(_) => Err(EnrichmentError::Timeout {
                service,
                after: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> EnrichmentError {
        EnrichmentError::Unavailable {
            service: "test",
            reason: "503".into(),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let value = policy
            .run("test", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(2, Duration::from_secs(5));
        let err = policy
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(unavailable())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::RetriesExhausted { attempts: 2, .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_bounds_a_hanging_call() {
        let policy = RetryPolicy::new(5, Duration::from_secs(3));
        let err = policy
            .run("test", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, EnrichmentError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::Timeout { .. }));
        assert!(err.is_collaborator_failure());
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1)).max_attempts, 1);
    }
}
