//! # Retry Strategies
//!
//! How many times a failure is retried and how long to wait before each retry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::models::RetryPolicyConfig;

/// Retry schedule for one class of failure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Fail on the first error
    NoRetry,

    /// Same delay before every retry
    Fixed { retries: u32, delay: Duration },

    /// `base × multiplier^i` before retry `i`
    Exponential {
        retries: u32,
        base: Duration,
        multiplier: f64,
    },

    /// `base + increment × i` before retry `i`
    Linear {
        retries: u32,
        base: Duration,
        increment: Duration,
    },
}

impl RetryStrategy {
    pub fn fixed(retries: u32, delay_ms: u64) -> Self {
        RetryStrategy::Fixed {
            retries,
            delay: Duration::from_millis(delay_ms),
        }
    }

    pub fn exponential(retries: u32, base_ms: u64, multiplier: f64) -> Self {
        RetryStrategy::Exponential {
            retries,
            base: Duration::from_millis(base_ms),
            multiplier,
        }
    }

    /// Linear schedule described by a metric's own retry settings
    pub fn from_metric_policy(policy: &RetryPolicyConfig) -> Self {
        RetryStrategy::Linear {
            retries: policy.max_attempts.saturating_sub(1),
            base: policy.delay(),
            increment: policy.backoff(),
        }
    }

    pub fn max_retries(&self) -> u32 {
        match self {
            RetryStrategy::NoRetry => 0,
            RetryStrategy::Fixed { retries, .. }
            | RetryStrategy::Exponential { retries, .. }
            | RetryStrategy::Linear { retries, .. } => *retries,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, RetryStrategy::NoRetry)
    }

    /// Delay before retry `retry_index` (0-based)
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        match self {
            RetryStrategy::NoRetry => Duration::ZERO,
            RetryStrategy::Fixed { delay, .. } => *delay,
            RetryStrategy::Exponential {
                base, multiplier, ..
            } => {
                let factor = multiplier.powi(retry_index.min(i32::MAX as u32) as i32);
                Duration::from_secs_f64((base.as_secs_f64() * factor).max(0.0))
            }
            RetryStrategy::Linear {
                base, increment, ..
            } => base.saturating_add(increment.saturating_mul(retry_index)),
        }
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryStrategy::NoRetry => write!(f, "no-retry"),
            RetryStrategy::Fixed { retries, delay } => {
                write!(f, "fixed({retries} x {}ms)", delay.as_millis())
            }
            RetryStrategy::Exponential {
                retries,
                base,
                multiplier,
            } => write!(
                f,
                "exponential({retries} from {}ms x{multiplier})",
                base.as_millis()
            ),
            RetryStrategy::Linear {
                retries,
                base,
                increment,
            } => write!(
                f,
                "linear({retries} from {}ms +{}ms)",
                base.as_millis(),
                increment.as_millis()
            ),
        }
    }
}
