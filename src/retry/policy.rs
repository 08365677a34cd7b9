//! # Retry Policy
//!
//! Maps a failure onto a [`RetryStrategy`] through an ordered rule list and drives
//! an async operation through that schedule. Every error is classified again as it
//! arrives, so a timeout followed by a syntax error stops at the syntax error.

use std::future::Future;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::RetryStrategy;
use crate::error::{CollectorError, FailureFamily, FailureKind, Result};
use crate::models::RetryPolicyConfig;

/// What a rule matches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMatcher {
    /// Exact failure kind
    Kind(FailureKind),
    /// Any kind that rolls up into the family
    Family(FailureFamily),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryRule {
    pub matcher: RetryMatcher,
    pub strategy: RetryStrategy,
}

impl RetryRule {
    pub fn kind(kind: FailureKind, strategy: RetryStrategy) -> Self {
        Self {
            matcher: RetryMatcher::Kind(kind),
            strategy,
        }
    }

    pub fn family(family: FailureFamily, strategy: RetryStrategy) -> Self {
        Self {
            matcher: RetryMatcher::Family(family),
            strategy,
        }
    }
}

/// Ordered classification table plus the fallback strategy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    rules: Vec<RetryRule>,
    default_strategy: RetryStrategy,
}

impl RetryPolicy {
    pub fn new(rules: Vec<RetryRule>, default_strategy: RetryStrategy) -> Self {
        Self {
            rules,
            default_strategy,
        }
    }

    /// The collector's built-in table
    pub fn standard() -> Self {
        Self::new(
            vec![
                RetryRule::kind(FailureKind::Timeout, RetryStrategy::exponential(3, 1000, 2.0)),
                RetryRule::kind(FailureKind::Syntax, RetryStrategy::NoRetry),
                RetryRule::kind(FailureKind::Configuration, RetryStrategy::NoRetry),
                RetryRule::kind(FailureKind::Capacity, RetryStrategy::NoRetry),
                RetryRule::kind(FailureKind::Network, RetryStrategy::fixed(5, 1000)),
                RetryRule::family(FailureFamily::Database, RetryStrategy::fixed(2, 5000)),
            ],
            RetryStrategy::fixed(1, 1000),
        )
    }

    pub fn rules(&self) -> &[RetryRule] {
        &self.rules
    }

    /// Exact kind rules first, then family rules, then the default
    pub fn classify(&self, error: &CollectorError) -> RetryStrategy {
        let kind = error.kind();
        let family = kind.family();

        self.rules
            .iter()
            .find(|rule| rule.matcher == RetryMatcher::Kind(kind))
            .or_else(|| {
                self.rules
                    .iter()
                    .find(|rule| rule.matcher == RetryMatcher::Family(family))
            })
            .map(|rule| rule.strategy)
            .unwrap_or(self.default_strategy)
    }

    /// Classified strategy, replaced by the metric's own schedule for retryable failures
    pub fn strategy_for(
        &self,
        error: &CollectorError,
        metric_policy: Option<&RetryPolicyConfig>,
    ) -> RetryStrategy {
        let classified = self.classify(error);
        match metric_policy {
            Some(policy) if policy.enabled && classified.is_retryable() => {
                RetryStrategy::from_metric_policy(policy)
            }
            _ => classified,
        }
    }

    /// Run `operation` until it succeeds or its failures run out of retries.
    ///
    /// Returns the last error on exhaustion.
    ///
    /// ```
    /// use dbcli_core::retry::RetryPolicy;
    /// use dbcli_core::CollectorError;
    ///
    /// # tokio_test::block_on(async {
    /// let policy = RetryPolicy::standard();
    /// let answer = policy
    ///     .execute_with_retry("inventory/uptime", None, || async {
    ///         Ok::<_, CollectorError>(42)
    ///     })
    ///     .await;
    /// assert_eq!(answer, Ok(42));
    /// # });
    /// ```
    pub async fn execute_with_retry<F, Fut, T>(
        &self,
        label: &str,
        metric_policy: Option<&RetryPolicyConfig>,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut retries: u32 = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        info!(
                            operation = %label,
                            retries = retries,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "🔁 RETRY: Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let strategy = self.strategy_for(&error, metric_policy);
                    if retries >= strategy.max_retries() {
                        if strategy.is_retryable() {
                            warn!(
                                operation = %label,
                                retries = retries,
                                kind = %error.kind(),
                                error = %error,
                                "❌ RETRY: Retries exhausted"
                            );
                        } else {
                            debug!(
                                operation = %label,
                                kind = %error.kind(),
                                "RETRY: Failure is not retryable"
                            );
                        }
                        return Err(error);
                    }

                    let delay = strategy.delay_for(retries);
                    warn!(
                        operation = %label,
                        attempt = retries + 1,
                        max_retries = strategy.max_retries(),
                        delay_ms = delay.as_millis() as u64,
                        strategy = %strategy,
                        error = %error,
                        "🔁 RETRY: Scheduling retry"
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn timeout_error() -> CollectorError {
        CollectorError::QueryTimeout {
            metric: "m".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_classification_table() {
        let policy = RetryPolicy::standard();
        assert_eq!(
            policy.classify(&timeout_error()),
            RetryStrategy::exponential(3, 1000, 2.0)
        );
        assert_eq!(
            policy.classify(&CollectorError::Syntax("bad".into())),
            RetryStrategy::NoRetry
        );
        assert_eq!(
            policy.classify(&CollectorError::Network("reset".into())),
            RetryStrategy::fixed(5, 1000)
        );
        assert_eq!(
            policy.classify(&CollectorError::Authentication("denied".into())),
            RetryStrategy::fixed(2, 5000)
        );
        assert_eq!(
            policy.classify(&CollectorError::CircuitOpen { target: "s".into() }),
            RetryStrategy::NoRetry
        );
        assert_eq!(
            policy.classify(&CollectorError::Internal("?".into())),
            RetryStrategy::fixed(1, 1000)
        );
    }

    #[test]
    fn test_kind_rules_win_over_family_rules_regardless_of_order() {
        let policy = RetryPolicy::new(
            vec![
                RetryRule::family(FailureFamily::Database, RetryStrategy::fixed(2, 5000)),
                RetryRule::kind(FailureKind::Syntax, RetryStrategy::NoRetry),
            ],
            RetryStrategy::NoRetry,
        );
        assert_eq!(
            policy.classify(&CollectorError::Syntax("bad".into())),
            RetryStrategy::NoRetry
        );
        assert_eq!(
            policy.classify(&CollectorError::Database("ora-600".into())),
            RetryStrategy::fixed(2, 5000)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_backoff_schedule_returns_last_error() {
        let policy = RetryPolicy::standard();
        let attempts = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let counter = Arc::clone(&attempts);
        let result: Result<()> = policy
            .execute_with_retry("timeout", None, || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(CollectorError::QueryTimeout {
                        metric: format!("attempt-{n}"),
                        timeout: Duration::from_secs(30),
                    })
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_millis(7000));
        match result {
            Err(CollectorError::QueryTimeout { metric, .. }) => assert_eq!(metric, "attempt-3"),
            other => panic!("expected last timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_syntax_error_is_not_retried() {
        let policy = RetryPolicy::standard();
        let attempts = AtomicU32::new(0);

        let result: Result<()> = policy
            .execute_with_retry("syntax", None, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(CollectorError::Syntax("ORA-00900".into())) }
            })
            .await;

        assert!(matches!(result, Err(CollectorError::Syntax(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry() {
        let policy = RetryPolicy::standard();
        let attempts = AtomicU32::new(0);

        let result = policy
            .execute_with_retry("flaky", None, || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CollectorError::Network("connection reset".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_metric_policy_overrides_retryable_failures_only() {
        let policy = RetryPolicy::standard();
        let metric_policy = RetryPolicyConfig {
            enabled: true,
            max_attempts: 2,
            delay_ms: 10,
            backoff_ms: 0,
        };

        let attempts = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let _: Result<()> = policy
            .execute_with_retry("override", Some(&metric_policy), || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(timeout_error()) }
            })
            .await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(10));

        assert_eq!(
            policy.strategy_for(&CollectorError::Syntax("x".into()), Some(&metric_policy)),
            RetryStrategy::NoRetry
        );
    }
}
