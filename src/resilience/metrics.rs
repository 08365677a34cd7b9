//! # Circuit Breaker Metrics
//!
//! Snapshots of breaker counters, per breaker and aggregated across every target.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Calls that reached the operation
    pub total_calls: u64,

    pub success_count: u64,

    pub failure_count: u64,

    /// Calls turned away while open; never counted as failures
    pub rejected_count: u64,

    pub consecutive_failures: u64,

    /// Total duration of all operations
    pub total_duration: Duration,

    pub current_state: CircuitState,

    /// Calculated failure rate (0.0 to 1.0)
    pub failure_rate: f64,
}

impl CircuitBreakerMetrics {
    /// Create new metrics instance with zero values
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_count: 0,
            consecutive_failures: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
        }
    }

    /// Check if metrics indicate healthy operation
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    /// Get human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Probing target",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Calls: {} | Failures: {} | Rejected: {} | Failure rate: {:.1}%",
            self.state_description(),
            self.total_calls,
            self.failure_count,
            self.rejected_count,
            self.failure_rate * 100.0
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics of every breaker, keyed by target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    pub circuit_breakers: HashMap<String, CircuitBreakerMetrics>,

    /// Timestamp of last metrics collection
    pub collected_at: std::time::SystemTime,
}

impl SystemCircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            circuit_breakers: HashMap::new(),
            collected_at: std::time::SystemTime::now(),
        }
    }

    pub fn add_circuit_breaker(&mut self, name: String, metrics: CircuitBreakerMetrics) {
        self.circuit_breakers.insert(name, metrics);
        self.collected_at = std::time::SystemTime::now();
    }

    /// Get count of circuit breakers by state
    pub fn count_by_state(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();
        for metrics in self.circuit_breakers.values() {
            *counts.entry(metrics.current_state).or_insert(0) += 1;
        }
        counts
    }

    /// Targets whose breaker reports unhealthy operation
    pub fn unhealthy_targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = self
            .circuit_breakers
            .iter()
            .filter(|(_, m)| !m.is_healthy())
            .map(|(name, _)| name.as_str())
            .collect();
        targets.sort_unstable();
        targets
    }

    pub fn total_rejections(&self) -> u64 {
        self.circuit_breakers.values().map(|m| m.rejected_count).sum()
    }

    /// Format summary for logging
    pub fn format_summary(&self) -> String {
        let state_counts = self.count_by_state();
        let count = |state| state_counts.get(&state).copied().unwrap_or(0);
        format!(
            "Circuit Breakers: {} total | {} closed | {} open | {} half-open | {} rejections",
            self.circuit_breakers.len(),
            count(CircuitState::Closed),
            count(CircuitState::Open),
            count(CircuitState::HalfOpen),
            self.total_rejections()
        )
    }
}

impl Default for SystemCircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_summary_counts_states() {
        let mut system = SystemCircuitBreakerMetrics::new();
        system.add_circuit_breaker("a".to_string(), CircuitBreakerMetrics::new());
        system.add_circuit_breaker(
            "c".to_string(),
            CircuitBreakerMetrics {
                total_calls: 10,
                failure_count: 4,
                failure_rate: 0.4,
                ..CircuitBreakerMetrics::new()
            },
        );
        system.add_circuit_breaker(
            "b".to_string(),
            CircuitBreakerMetrics {
                current_state: CircuitState::Open,
                rejected_count: 3,
                ..CircuitBreakerMetrics::new()
            },
        );
        assert_eq!(system.unhealthy_targets(), vec!["b", "c"]);
        assert_eq!(system.total_rejections(), 3);
        assert!(system.format_summary().contains("1 open"));
    }
}
