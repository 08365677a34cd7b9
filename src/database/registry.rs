//! # Connection Registry
//!
//! One lazily created pool per `(engine, system, node)`. Concurrent first calls for the
//! same key race on a shared `OnceCell`, so exactly one of them opens the pool and the
//! rest wait for it. A failed creation leaves the cell empty: nothing is cached and the
//! next call tries again.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use super::connection_pool_strategies::{PoolConfiguration, PoolMetrics};
use super::connection_string::{
    build_connection_string, pool_key, pool_name, resolve_port, ConnectionIdentity,
};
use super::driver::{ConnectRequest, DriverRegistry, MetricSource};
use crate::error::Result;
use crate::models::{EngineType, Node, SystemConfig};

/// Login timeout of direct connectivity tests
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(3);

type PoolCell = Arc<OnceCell<Arc<dyn MetricSource>>>;

pub struct ConnectionRegistry {
    drivers: DriverRegistry,
    pools: DashMap<String, PoolCell>,
    login_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(drivers: DriverRegistry) -> Self {
        Self {
            drivers,
            pools: DashMap::new(),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
        }
    }

    pub fn with_login_timeout(mut self, login_timeout: Duration) -> Self {
        self.login_timeout = login_timeout;
        self
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    /// Pooled source for a node, creating the pool on first use
    pub async fn acquire(
        &self,
        system_name: &str,
        node: &Node,
        system: &SystemConfig,
        engine: EngineType,
    ) -> Result<Arc<dyn MetricSource>> {
        let key = pool_key(engine, system_name, node);
        let cell = self
            .pools
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let source = cell
            .get_or_try_init(|| self.create_pool(&key, system_name, node, system, engine))
            .await?;
        Ok(Arc::clone(source))
    }

    async fn create_pool(
        &self,
        key: &str,
        system_name: &str,
        node: &Node,
        system: &SystemConfig,
        engine: EngineType,
    ) -> Result<Arc<dyn MetricSource>> {
        let driver = self.drivers.driver(engine)?;
        let request = connect_request(system_name, node, system, engine)?;
        let config = PoolConfiguration::for_engine(engine)
            .with_overrides(&system.pool)
            .with_env_overrides();

        info!(
            pool = %request.pool_name,
            engine = %engine,
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            acquire_timeout_secs = config.acquire_timeout.as_secs(),
            "🏊 Creating connection pool"
        );

        let started = Instant::now();
        match driver.open_pool(&request, &config).await {
            Ok(source) => {
                info!(
                    pool = %request.pool_name,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "✅ Connection pool ready"
                );
                Ok(source)
            }
            Err(e) => {
                error!(
                    pool = %request.pool_name,
                    key = %key,
                    connection = %request.identity,
                    error = %e,
                    "❌ Connection pool creation failed"
                );
                Err(e)
            }
        }
    }

    /// Direct connect and ping, bypassing every pool
    pub async fn test_connection(
        &self,
        system_name: &str,
        node: &Node,
        system: &SystemConfig,
        engine: EngineType,
    ) -> Result<()> {
        let driver = self.drivers.driver(engine)?;
        let request = connect_request(system_name, node, system, engine)?;
        debug!(connection = %request.identity, "Testing connection");
        driver.probe(&request, self.login_timeout).await
    }

    /// Number of pools that have been created successfully
    pub fn pool_count(&self) -> usize {
        self.pools
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn pool_snapshots(&self) -> Vec<PoolMetrics> {
        let mut snapshots: Vec<PoolMetrics> = self
            .pools
            .iter()
            .filter_map(|entry| entry.value().get().map(|source| source.stats()))
            .collect();
        snapshots.sort_by(|a, b| a.pool_name.cmp(&b.pool_name));
        snapshots
    }

    /// Close and forget every pool
    pub async fn close_all(&self) {
        let sources: Vec<Arc<dyn MetricSource>> = self
            .pools
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .collect();
        self.pools.clear();

        for source in &sources {
            source.close().await;
        }
        info!(closed = sources.len(), "🔒 All connection pools closed");
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("drivers", &self.drivers)
            .field("pools", &self.pools.len())
            .field("login_timeout", &self.login_timeout)
            .finish()
    }
}

/// Everything a driver needs for one node; fails fast on configuration problems
pub fn connect_request(
    system_name: &str,
    node: &Node,
    system: &SystemConfig,
    engine: EngineType,
) -> Result<ConnectRequest> {
    let connection_string = build_connection_string(engine, node, system)?;
    Ok(ConnectRequest {
        identity: ConnectionIdentity::new(engine, connection_string),
        pool_name: pool_name(engine, system_name, node),
        host: node.host.trim().to_string(),
        port: resolve_port(engine, node, system)?,
        database: node
            .service()
            .or_else(|| node.sid())
            .map(str::to_string),
        username: system.username.clone(),
        password: system.password.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::driver::{EngineDriver, QueryOutcome};
    use crate::error::CollectorError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticSource(String);

    #[async_trait]
    impl MetricSource for StaticSource {
        fn name(&self) -> &str {
            &self.0
        }

        async fn fetch(&self, _sql: &str) -> Result<QueryOutcome> {
            Ok(QueryOutcome::default())
        }

        fn stats(&self) -> PoolMetrics {
            PoolMetrics {
                pool_name: self.0.clone(),
                engine: EngineType::Dm,
                size: 1,
                num_idle: 1,
                is_closed: false,
                max_connections: 10,
                min_connections: 2,
            }
        }

        async fn close(&self) {}
    }

    /// Fails the first `failures` pool creations, then succeeds
    struct FlakyDriver {
        opened: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl EngineDriver for FlakyDriver {
        fn engine(&self) -> EngineType {
            EngineType::Dm
        }

        async fn open_pool(
            &self,
            request: &ConnectRequest,
            _pool: &PoolConfiguration,
        ) -> Result<Arc<dyn MetricSource>> {
            let attempt = self.opened.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if attempt < self.failures {
                return Err(CollectorError::PoolCreation {
                    key: request.pool_name.clone(),
                    reason: "listener refused".to_string(),
                });
            }
            Ok(Arc::new(StaticSource(request.pool_name.clone())))
        }

        async fn probe(&self, _request: &ConnectRequest, _login_timeout: Duration) -> Result<()> {
            Ok(())
        }
    }

    fn fixture(failures: usize) -> (Arc<FlakyDriver>, ConnectionRegistry, SystemConfig) {
        let driver = Arc::new(FlakyDriver {
            opened: AtomicUsize::new(0),
            failures,
        });
        let registry =
            ConnectionRegistry::new(DriverRegistry::empty().with_driver(driver.clone()));
        let system = SystemConfig::new("dm1", EngineType::Dm)
            .with_port(5236)
            .with_node(Node::new("10.9.8.7"));
        (driver, registry, system)
    }

    #[tokio::test]
    async fn test_concurrent_acquire_creates_one_pool() {
        let (driver, registry, system) = fixture(0);
        let registry = Arc::new(registry);
        let node = system.nodes[0].clone();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let system = system.clone();
                let node = node.clone();
                tokio::spawn(async move {
                    registry
                        .acquire("dm1", &node, &system, EngineType::Dm)
                        .await
                        .map(|s| s.name().to_string())
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "dm1-***.***.8.7-dm-pool");
        }
        assert_eq!(driver.opened.load(Ordering::SeqCst), 1);
        assert_eq!(registry.pool_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_creation_is_not_cached() {
        let (driver, registry, system) = fixture(1);
        let node = &system.nodes[0];

        let first = registry.acquire("dm1", node, &system, EngineType::Dm).await;
        assert!(matches!(first, Err(CollectorError::PoolCreation { .. })));
        assert_eq!(registry.pool_count(), 0);

        let second = registry.acquire("dm1", node, &system, EngineType::Dm).await;
        assert!(second.is_ok());
        assert_eq!(driver.opened.load(Ordering::SeqCst), 2);
        assert_eq!(registry.pool_snapshots().len(), 1);

        registry.close_all().await;
        assert_eq!(registry.pool_count(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_engine_fails_without_caching() {
        let registry = ConnectionRegistry::new(DriverRegistry::empty());
        let system = SystemConfig::new("ora", EngineType::Oracle)
            .with_port(1521)
            .with_node(Node::new("h").with_service("ORCL"));
        let err = registry
            .acquire("ora", &system.nodes[0], &system, EngineType::Oracle)
            .await
            .err();
        assert!(matches!(err, Some(CollectorError::DriverUnavailable { .. })));
        assert_eq!(registry.pool_count(), 0);
    }

    #[test]
    fn test_connect_request_resolves_database_and_port() {
        let system = SystemConfig::new("pg1", EngineType::PostgreSql)
            .with_port(5432)
            .with_credentials("monitor", "pw");
        let node = Node::new(" db01 ").with_sid("reporting");
        let request = connect_request("pg1", &node, &system, EngineType::PostgreSql).unwrap();
        assert_eq!(request.host, "db01");
        assert_eq!(request.port, 5432);
        assert_eq!(request.database.as_deref(), Some("reporting"));
        assert_eq!(request.username.as_deref(), Some("monitor"));
    }
}
