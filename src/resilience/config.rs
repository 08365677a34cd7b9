//! # Circuit Breaker Configuration
//!
//! Settings for a single breaker. The serializable, file-backed form lives in
//! [`crate::config::CircuitBreakerSettings`] and converts into this one.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time since the last failure after which one probe call is admitted
    pub retry_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.retry_timeout.is_zero() {
            return Err("retry_timeout must be greater than 0".to_string());
        }

        if self.retry_timeout > Duration::from_secs(3600) {
            return Err("retry_timeout should not exceed 3600 seconds".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            retry_timeout: Duration::from_secs(60),
        }
    }
}
