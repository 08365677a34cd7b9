//! # Collector Configuration
//!
//! Runtime settings for the collection engine, layered the same way for every deployment:
//!
//! 1. Compiled defaults (every field has one)
//! 2. An optional YAML/TOML file
//! 3. `DBCLI__SECTION__KEY` environment variables
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dbcli_core::config::CollectorConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CollectorConfig::load(Some(Path::new("dbcli.yml")))?;
//! println!("statement timeout: {:?}", config.query.statement_timeout());
//! # Ok(())
//! # }
//! ```
//!
//! Worker pool sizing has its own environment overrides (`DBCLI_POOL_CORE`,
//! `DBCLI_POOL_MAX`, `DBCLI_POOL_QUEUE`) that are applied when pools are sized, see
//! [`crate::executor::PoolSizing`].

pub mod error;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub use error::ConfigurationError;

use crate::resilience::CircuitBreakerConfig;

/// Fixed key for the failure ledger hash when none is configured.
///
/// Changing it invalidates every persisted blacklist entry.
pub const DEFAULT_LEDGER_HASH_KEY: &str = "60f560e7c72a35c2d1969f83b78aafb8";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub worker_pool: WorkerPoolConfig,
    pub query: QueryConfig,
    pub collection: CollectionConfig,
    pub connectivity: ConnectivityConfig,
    pub ledger: LedgerConfig,
    pub circuit_breaker: CircuitBreakerSettings,
}

/// Per-engine worker pool sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Base concurrency the default core/max sizes are derived from
    pub base_concurrency: usize,
    /// Explicit core size; computed from `base_concurrency` when absent
    pub core_size: Option<usize>,
    /// Explicit max size; computed from `base_concurrency` when absent
    pub max_size: Option<usize>,
    /// Explicit queue capacity; 100 when absent
    pub queue_capacity: Option<usize>,
    pub monitor_interval_seconds: u64,
    /// Queue depth above which the monitor grows a pool
    pub queue_high_water: usize,
    /// Utilization (0.0-1.0) above which the monitor logs a capacity warning
    pub utilization_warning: f64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            base_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            core_size: None,
            max_size: None,
            queue_capacity: None,
            monitor_interval_seconds: 30,
            queue_high_water: 50,
            utilization_warning: 0.8,
        }
    }
}

impl WorkerPoolConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    pub statement_timeout_seconds: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            statement_timeout_seconds: 30,
        }
    }
}

impl QueryConfig {
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Global deadline for one collection run
    pub timeout_seconds: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
        }
    }
}

impl CollectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Login timeout for direct connection tests
    pub login_timeout_seconds: u64,
    /// Outer bound for a single probe including driver setup
    pub probe_timeout_seconds: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            login_timeout_seconds: 3,
            probe_timeout_seconds: 15,
        }
    }
}

impl ConnectivityConfig {
    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub blacklist_path: PathBuf,
    pub error_log_path: PathBuf,
    pub greylist_ttl_seconds: u64,
    pub hash_key: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            blacklist_path: PathBuf::from("logs/db_conn_blacklist.txt"),
            error_log_path: PathBuf::from("logs/db_conn_error.txt"),
            greylist_ttl_seconds: 15 * 60,
            hash_key: DEFAULT_LEDGER_HASH_KEY.to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn greylist_ttl(&self) -> Duration {
        Duration::from_secs(self.greylist_ttl_seconds)
    }
}

/// Serializable breaker settings, converted into [`CircuitBreakerConfig`]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub retry_timeout_seconds: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            retry_timeout_seconds: 60,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            retry_timeout: Duration::from_secs(self.retry_timeout_seconds),
        }
    }
}

impl CollectorConfig {
    /// Load configuration from an optional file plus `DBCLI__` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigurationError::ConfigFileNotFound {
                    path: path.to_path_buf(),
                });
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DBCLI")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let source_name = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        let loaded = builder
            .build()
            .map_err(|e| ConfigurationError::load_error(source_name.clone(), e))?;
        let config: CollectorConfig = loaded
            .try_deserialize()
            .map_err(|e| ConfigurationError::load_error(source_name.clone(), e))?;

        config.validate()?;

        info!(
            source = %source_name,
            base_concurrency = config.worker_pool.base_concurrency,
            statement_timeout_seconds = config.query.statement_timeout_seconds,
            collection_timeout_seconds = config.collection.timeout_seconds,
            "🔧 CONFIG: Collector configuration loaded"
        );

        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.worker_pool.base_concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker_pool.base_concurrency",
                "0",
                "must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.worker_pool.utilization_warning) {
            return Err(ConfigurationError::invalid_value(
                "worker_pool.utilization_warning",
                self.worker_pool.utilization_warning.to_string(),
                "must be between 0.0 and 1.0",
            ));
        }

        if self.query.statement_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "query.statement_timeout_seconds",
                "0",
                "must be greater than 0",
            ));
        }

        if self.collection.timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "collection.timeout_seconds",
                "0",
                "must be greater than 0",
            ));
        }

        if self.ledger.hash_key.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "hash_key", "ledger",
            ));
        }

        self.circuit_breaker
            .to_resilience_config()
            .validate()
            .map_err(ConfigurationError::validation_error)?;

        Ok(())
    }
}
