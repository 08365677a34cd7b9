//! Engine-tuned connection pool strategies.
//!
//! Every engine gets its own defaults (sizing, timeouts, validation query). Per-system
//! overrides from the system configuration layer on top, and `DBCLI_DB_*` environment
//! variables layer last.

use serde::Serialize;
use std::env;
use std::time::Duration;
use tracing::info;

use crate::models::{EngineType, PoolOverrides};

/// Connection pool configuration for one engine
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfiguration {
    pub engine: EngineType,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub validation_query: &'static str,
}

impl PoolConfiguration {
    /// Large pool with long lifetimes; Oracle sessions are expensive to establish
    pub fn oracle() -> Self {
        Self {
            engine: EngineType::Oracle,
            max_connections: 20,
            min_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600), // 10 minutes
            max_lifetime: Duration::from_secs(1800), // 30 minutes
            validation_query: "SELECT 1 FROM DUAL",
        }
    }

    pub fn mysql() -> Self {
        Self {
            engine: EngineType::MySql,
            max_connections: 15,
            min_connections: 3,
            acquire_timeout: Duration::from_secs(20),
            idle_timeout: Duration::from_secs(300), // 5 minutes
            max_lifetime: Duration::from_secs(1200), // 20 minutes
            validation_query: "SELECT 1",
        }
    }

    pub fn postgresql() -> Self {
        Self {
            engine: EngineType::PostgreSql,
            max_connections: 12,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(25),
            idle_timeout: Duration::from_secs(400),
            max_lifetime: Duration::from_secs(1500), // 25 minutes
            validation_query: "SELECT 1",
        }
    }

    pub fn dm() -> Self {
        Self {
            engine: EngineType::Dm,
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(25),
            idle_timeout: Duration::from_secs(500),
            max_lifetime: Duration::from_secs(1600),
            validation_query: "SELECT 1 FROM DUAL",
        }
    }

    /// Small pool with fast timeouts for in-process databases
    pub fn embedded() -> Self {
        Self {
            engine: EngineType::Embedded,
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(1800),
            validation_query: "SELECT 1",
        }
    }

    pub fn for_engine(engine: EngineType) -> Self {
        match engine {
            EngineType::Oracle => Self::oracle(),
            EngineType::MySql => Self::mysql(),
            EngineType::PostgreSql => Self::postgresql(),
            EngineType::Dm => Self::dm(),
            EngineType::Embedded => Self::embedded(),
        }
    }

    /// Layer a system's explicit pool settings over the engine defaults
    pub fn with_overrides(mut self, overrides: &PoolOverrides) -> Self {
        if let Some(max) = overrides.max_pool_size.filter(|v| *v > 0) {
            self.max_connections = max;
        }
        if let Some(min) = overrides.min_idle {
            self.min_connections = min;
        }
        if let Some(ms) = overrides.connection_timeout_ms.filter(|v| *v > 0) {
            self.acquire_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = overrides.idle_timeout_ms.filter(|v| *v > 0) {
            self.idle_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = overrides.max_lifetime_ms.filter(|v| *v > 0) {
            self.max_lifetime = Duration::from_millis(ms);
        }
        self.clamped()
    }

    /// Apply environment variable overrides to configuration
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    /// Apply `DBCLI_DB_*` overrides from an arbitrary lookup
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(max) = lookup("DBCLI_DB_MAX_CONNECTIONS").and_then(|v| v.trim().parse::<u32>().ok()) {
            self.max_connections = max;
            info!(engine = %self.engine, max, "Overriding max_connections from env");
        }

        if let Some(min) = lookup("DBCLI_DB_MIN_CONNECTIONS").and_then(|v| v.trim().parse::<u32>().ok()) {
            self.min_connections = min;
            info!(engine = %self.engine, min, "Overriding min_connections from env");
        }

        if let Some(secs) =
            lookup("DBCLI_DB_ACQUIRE_TIMEOUT_SECS").and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.acquire_timeout = Duration::from_secs(secs);
            info!(engine = %self.engine, secs, "Overriding acquire_timeout from env");
        }

        self.clamped()
    }

    fn clamped(mut self) -> Self {
        self.max_connections = self.max_connections.max(1);
        self.min_connections = self.min_connections.min(self.max_connections);
        self
    }
}

/// Point-in-time view of one pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolMetrics {
    pub pool_name: String,
    pub engine: EngineType,
    pub size: u32,
    pub num_idle: u32,
    pub is_closed: bool,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl PoolMetrics {
    /// Calculate pool utilization percentage
    pub fn utilization_percentage(&self) -> f64 {
        if self.max_connections == 0 {
            0.0
        } else {
            (self.size.saturating_sub(self.num_idle) as f64 / self.max_connections as f64) * 100.0
        }
    }

    /// Check if pool is under stress
    pub fn is_under_stress(&self) -> bool {
        self.utilization_percentage() > 80.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_engine_defaults() {
        let oracle = PoolConfiguration::for_engine(EngineType::Oracle);
        assert_eq!(oracle.max_connections, 20);
        assert_eq!(oracle.min_connections, 5);
        assert_eq!(oracle.validation_query, "SELECT 1 FROM DUAL");

        let pg = PoolConfiguration::for_engine(EngineType::PostgreSql);
        assert_eq!(pg.max_connections, 12);
        assert_eq!(pg.acquire_timeout, Duration::from_secs(25));
        assert_eq!(pg.max_lifetime, Duration::from_secs(1500));

        let dm = PoolConfiguration::for_engine(EngineType::Dm);
        assert_eq!(dm.idle_timeout, Duration::from_secs(500));
    }

    #[test]
    fn test_system_overrides_layer_on_defaults() {
        let overrides = PoolOverrides {
            max_pool_size: Some(4),
            min_idle: Some(10),
            connection_timeout_ms: Some(1500),
            ..PoolOverrides::default()
        };
        let config = PoolConfiguration::mysql().with_overrides(&overrides);
        assert_eq!(config.max_connections, 4);
        // min never exceeds max
        assert_eq!(config.min_connections, 4);
        assert_eq!(config.acquire_timeout, Duration::from_millis(1500));
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_env_overrides_ignore_garbage() {
        let env: HashMap<&str, &str> = [
            ("DBCLI_DB_MAX_CONNECTIONS", "8"),
            ("DBCLI_DB_MIN_CONNECTIONS", "lots"),
            ("DBCLI_DB_ACQUIRE_TIMEOUT_SECS", "7"),
        ]
        .into_iter()
        .collect();
        let config = PoolConfiguration::postgresql()
            .with_overrides_from(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.acquire_timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_pool_metrics_utilization() {
        let metrics = PoolMetrics {
            pool_name: "s1-h-mysql-pool".to_string(),
            engine: EngineType::MySql,
            size: 10,
            num_idle: 1,
            is_closed: false,
            max_connections: 10,
            min_connections: 3,
        };
        assert!((metrics.utilization_percentage() - 90.0).abs() < f64::EPSILON);
        assert!(metrics.is_under_stress());
    }
}
