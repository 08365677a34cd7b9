//! # Resilience Module
//!
//! Per-target circuit breakers. Every system gets its own breaker so that one
//! consistently failing system is isolated without affecting the others.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dbcli_core::resilience::{CircuitBreakerConfig, CircuitBreakerManager};
//! use dbcli_core::error::CollectorError;
//!
//! # async fn example() -> Result<(), CollectorError> {
//! let manager = CircuitBreakerManager::new(CircuitBreakerConfig::default());
//! let breaker = manager.get_circuit_breaker("billing");
//!
//! let rows = breaker.call(|| async {
//!     // query the billing system here
//!     Ok::<u64, CollectorError>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::CircuitBreakerConfig;
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
