//! # Engine Drivers
//!
//! Drivers are the seam between the collector and a concrete database client. An
//! [`EngineDriver`] opens pooled [`MetricSource`]s and performs direct connectivity
//! probes; the [`DriverRegistry`] records which engines this process can talk to.
//!
//! The registry is built once by [`DriverRegistry::initialize`] and passed explicitly to
//! the connection registry. PostgreSQL, MySQL and the embedded SQLite engine come built
//! in (behind their cargo features). Oracle and DM have no native driver in this crate;
//! deployments that reach them register their own implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::connection_pool_strategies::{PoolConfiguration, PoolMetrics};
use super::connection_string::ConnectionIdentity;
use crate::error::{CollectorError, Result};
use crate::models::{EngineType, MetricValue};

/// Rows returned by one statement, column-aligned
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    /// Column labels reported by the driver; empty when no row came back
    pub columns: Vec<String>,
    pub rows: Vec<Vec<MetricValue>>,
}

impl QueryOutcome {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<MetricValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Everything a driver needs to reach one node
#[derive(Clone)]
pub struct ConnectRequest {
    pub identity: ConnectionIdentity,
    pub pool_name: String,
    pub host: String,
    pub port: i64,
    /// Service name, else instance identifier
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("identity", &self.identity)
            .field("pool_name", &self.pool_name)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username.as_ref().map(|_| "***"))
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A pooled source metrics are fetched from
#[async_trait]
pub trait MetricSource: Send + Sync {
    fn name(&self) -> &str;

    /// Run one statement and decode every row
    async fn fetch(&self, sql: &str) -> Result<QueryOutcome>;

    fn stats(&self) -> PoolMetrics;

    async fn close(&self);
}

/// A client library for one engine
#[async_trait]
pub trait EngineDriver: Send + Sync {
    fn engine(&self) -> EngineType;

    /// Open a pool and validate it with the configuration's validation query
    async fn open_pool(
        &self,
        request: &ConnectRequest,
        pool: &PoolConfiguration,
    ) -> Result<Arc<dyn MetricSource>>;

    /// Connect directly, bypassing any pool, and ping
    async fn probe(&self, request: &ConnectRequest, login_timeout: Duration) -> Result<()>;
}

/// Explicit capability registry of engine drivers
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<EngineType, Arc<dyn EngineDriver>>,
}

impl DriverRegistry {
    /// Registry with no drivers at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every driver compiled into this build
    pub fn initialize() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::empty();

        #[cfg(feature = "postgres")]
        registry.register(Arc::new(super::sqlx_driver::PostgresDriver));
        #[cfg(feature = "mysql")]
        registry.register(Arc::new(super::sqlx_driver::MySqlDriver));
        #[cfg(feature = "embedded")]
        registry.register(Arc::new(super::sqlx_driver::EmbeddedDriver));

        info!(engines = ?registry.engines(), "🔌 Engine drivers initialized");
        registry
    }

    /// Add or replace the driver for its engine
    pub fn register(&mut self, driver: Arc<dyn EngineDriver>) -> &mut Self {
        let engine = driver.engine();
        if self.drivers.insert(engine, driver).is_some() {
            debug!(engine = %engine, "Replaced engine driver");
        }
        self
    }

    pub fn with_driver(mut self, driver: Arc<dyn EngineDriver>) -> Self {
        self.register(driver);
        self
    }

    pub fn driver(&self, engine: EngineType) -> Result<Arc<dyn EngineDriver>> {
        self.drivers
            .get(&engine)
            .cloned()
            .ok_or_else(|| CollectorError::DriverUnavailable {
                engine: engine.to_string(),
            })
    }

    pub fn supports(&self, engine: EngineType) -> bool {
        self.drivers.contains_key(&engine)
    }

    /// Engines with a driver, in canonical order
    pub fn engines(&self) -> Vec<EngineType> {
        EngineType::ALL
            .into_iter()
            .filter(|e| self.drivers.contains_key(e))
            .collect()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("engines", &self.engines())
            .finish()
    }
}
