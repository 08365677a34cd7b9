//! # Circuit Breaker Manager
//!
//! One breaker per target, created on first use. Creation goes through the map's entry
//! API so concurrent first calls for a target always end up sharing one breaker.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState,
    SystemCircuitBreakerMetrics,
};

#[derive(Debug, Clone)]
pub struct CircuitBreakerManager {
    circuit_breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        info!(
            failure_threshold = config.failure_threshold,
            retry_timeout_seconds = config.retry_timeout.as_secs(),
            "Initializing circuit breaker manager"
        );
        Self {
            circuit_breakers: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get or create circuit breaker for a target
    pub fn get_circuit_breaker(&self, target: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.circuit_breakers.get(target) {
            return Arc::clone(existing.value());
        }

        let breaker = self
            .circuit_breakers
            .entry(target.to_string())
            .or_insert_with(|| {
                info!(component = target, "Created new circuit breaker");
                Arc::new(CircuitBreaker::new(target, self.config.clone()))
            });
        Arc::clone(breaker.value())
    }

    /// Get all circuit breaker names
    pub fn list_components(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .circuit_breakers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn get_component_metrics(&self, target: &str) -> Option<CircuitBreakerMetrics> {
        self.circuit_breakers.get(target).map(|b| b.metrics())
    }

    pub fn get_system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();
        for entry in self.circuit_breakers.iter() {
            system_metrics.add_circuit_breaker(entry.key().clone(), entry.value().metrics());
        }
        system_metrics
    }

    pub fn get_state_summary(&self) -> HashMap<CircuitState, usize> {
        self.get_system_metrics().count_by_state()
    }

    /// Close every breaker and clear its counters
    pub fn reset_all(&self) {
        warn!("🚨 Resetting all circuit breakers");
        for entry in self.circuit_breakers.iter() {
            entry.value().reset();
        }
    }

    pub fn remove_circuit_breaker(&self, target: &str) -> bool {
        self.circuit_breakers.remove(target).is_some()
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_target_shares_breaker() {
        let manager = CircuitBreakerManager::default();
        let a = manager.get_circuit_breaker("s1");
        let b = manager.get_circuit_breaker("s1");
        let c = manager.get_circuit_breaker("s2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(manager.list_components(), vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_concurrent_creation_has_single_winner() {
        let manager = CircuitBreakerManager::default();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_circuit_breaker("shared") })
            })
            .collect();

        let mut breakers = Vec::new();
        for handle in handles {
            breakers.push(handle.await.unwrap());
        }
        assert!(breakers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_state_summary_and_reset() {
        let manager = CircuitBreakerManager::default();
        manager.get_circuit_breaker("s1").force_open();
        manager.get_circuit_breaker("s2");

        let summary = manager.get_state_summary();
        assert_eq!(summary.get(&CircuitState::Open), Some(&1));
        assert_eq!(summary.get(&CircuitState::Closed), Some(&1));

        manager.reset_all();
        assert_eq!(manager.get_state_summary().get(&CircuitState::Closed), Some(&2));
        assert!(manager.remove_circuit_breaker("s1"));
    }
}
