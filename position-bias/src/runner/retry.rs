//! Retry wrapper for rate-limited scorers

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::scorer::RowScorer;
use crate::dataset::QuestionRow;
use crate::providers::ProviderResult;
use crate::response::ScoreOutcome;

/// Exponential backoff with a floor and a ceiling
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            multiplier: Duration::from_secs(1),
            min_wait: Duration::from_secs(4),
            max_wait: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Never wait between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            multiplier: Duration::ZERO,
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
    }

    /// Wait after the `attempt`-th failure (1-based): `multiplier * 2^(attempt - 1)`
    /// clamped to `[min_wait, max_wait]`
    pub fn wait_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let raw = self.multiplier.saturating_mul(1u32 << exponent);
        raw.max(self.min_wait).min(self.max_wait.max(self.min_wait))
    }
}

/// Retries the inner scorer while the provider reports rate limiting.
///
/// Every other error is returned at once. When attempts run out the last
/// rate-limit error is returned.
pub struct RetryingScorer {
    inner: Arc<dyn RowScorer>,
    policy: RetryPolicy,
}

impl RetryingScorer {
    pub fn new(inner: Arc<dyn RowScorer>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl RowScorer for RetryingScorer {
    async fn score(&self, row: &QuestionRow) -> ProviderResult<ScoreOutcome> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.score(row).await {
                Err(e) if e.is_rate_limit() && attempt < max_attempts => {
                    let wait = self.policy.wait_for(attempt);
                    tracing::warn!(
                        "Attempt {}/{} rate limited ({}), retrying in {:?}",
                        attempt,
                        max_attempts,
                        e,
                        wait
                    );
                    sleep(wait).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::response::ModelResponse;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the given error a fixed number of times, then scores
    struct Flaky {
        failures: u32,
        rate_limited: bool,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32, rate_limited: bool) -> Self {
            Self {
                failures,
                rate_limited,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RowScorer for Flaky {
        async fn score(&self, _row: &QuestionRow) -> ProviderResult<ScoreOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(if self.rate_limited {
                    ProviderError::RateLimited { retry_after_ms: 0 }
                } else {
                    ProviderError::Api {
                        status: 500,
                        message: "boom".into(),
                    }
                });
            }
            Ok(ScoreOutcome::Scored(ModelResponse {
                proba: vec![1.0],
                response_idx: 0,
            }))
        }
    }

    fn row() -> QuestionRow {
        QuestionRow::new("Q", vec!["a".into(), "b".into()], "a").unwrap()
    }

    #[test]
    fn test_wait_schedule() {
        let policy = RetryPolicy::default();
        let waits: Vec<u64> = (1..=6).map(|a| policy.wait_for(a).as_secs()).collect();
        assert_eq!(waits, vec![4, 4, 4, 8, 10, 10]);
        assert_eq!(RetryPolicy::immediate(3).wait_for(4), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retries_rate_limits_until_success() {
        let inner = Arc::new(Flaky::new(3, true));
        let scorer = RetryingScorer::new(inner.clone(), RetryPolicy::immediate(5));
        assert!(scorer.score(&row()).await.unwrap().is_scored());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = Arc::new(Flaky::new(10, true));
        let scorer = RetryingScorer::new(inner.clone(), RetryPolicy::immediate(5));
        assert!(scorer.score(&row()).await.unwrap_err().is_rate_limit());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let inner = Arc::new(Flaky::new(1, false));
        let scorer = RetryingScorer::new(inner.clone(), RetryPolicy::immediate(5));
        let err = scorer.score(&row()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 500, .. }));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
