//! Shared fixtures for integration tests: a scripted engine driver that records every
//! connection attempt, plus builders for systems, ledgers and executors.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use dbcli_core::config::LedgerConfig;
use dbcli_core::database::{
    ConnectRequest, ConnectionRegistry, DriverRegistry, EngineDriver, MetricSource,
    PoolConfiguration, PoolMetrics, QueryOutcome,
};
use dbcli_core::error::{CollectorError, Result};
use dbcli_core::ledger::FailureLedger;
use dbcli_core::models::{EngineType, MetricValue, Node, NodeRole, SystemConfig};

/// Canned behaviour for one SQL text
#[derive(Debug, Clone)]
pub enum Reply {
    Rows(QueryOutcome),
    Fail(CollectorError),
    /// Sleep, then answer with the rows
    Slow(Duration, QueryOutcome),
    /// The query task panics
    Panic,
}

#[derive(Default)]
struct Script {
    replies: HashMap<String, Reply>,
    unreachable: HashSet<String>,
}

/// Engine driver whose answers are scripted per SQL text and per host
pub struct ScriptedDriver {
    engine: EngineType,
    script: Arc<Mutex<Script>>,
    connections: Arc<Mutex<Vec<String>>>,
    queries: Arc<AtomicUsize>,
}

impl ScriptedDriver {
    pub fn new(engine: EngineType) -> Self {
        Self {
            engine,
            script: Arc::new(Mutex::new(Script::default())),
            connections: Arc::new(Mutex::new(Vec::new())),
            queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn reply(self, sql: &str, reply: Reply) -> Self {
        self.set_reply(sql, reply);
        self
    }

    /// Change the reply of a driver already in use
    pub fn set_reply(&self, sql: &str, reply: Reply) {
        self.script.lock().replies.insert(sql.to_string(), reply);
    }

    pub fn rows(self, sql: &str, columns: &[&str], rows: Vec<Vec<MetricValue>>) -> Self {
        self.reply(sql, Reply::Rows(outcome(columns, rows)))
    }

    /// Every connection attempt to `host` fails with a network error
    pub fn unreachable(self, host: &str) -> Self {
        self.script.lock().unreachable.insert(host.to_string());
        self
    }

    /// Hosts of every pool creation attempt, in order
    pub fn connection_attempts(&self) -> Vec<String> {
        self.connections.lock().clone()
    }

    pub fn attempts_to(&self, host: &str) -> usize {
        self.connections.lock().iter().filter(|h| *h == host).count()
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineDriver for ScriptedDriver {
    fn engine(&self) -> EngineType {
        self.engine
    }

    async fn open_pool(
        &self,
        request: &ConnectRequest,
        _pool: &PoolConfiguration,
    ) -> Result<Arc<dyn MetricSource>> {
        self.connections.lock().push(request.host.clone());
        if self.script.lock().unreachable.contains(&request.host) {
            return Err(CollectorError::Network(format!(
                "connection refused: {}",
                request.pool_name
            )));
        }
        Ok(Arc::new(ScriptedSource {
            name: request.pool_name.clone(),
            engine: self.engine,
            script: Arc::clone(&self.script),
            queries: Arc::clone(&self.queries),
        }))
    }

    async fn probe(&self, request: &ConnectRequest, _login_timeout: Duration) -> Result<()> {
        self.connections.lock().push(request.host.clone());
        if self.script.lock().unreachable.contains(&request.host) {
            return Err(CollectorError::Network("connection refused".to_string()));
        }
        Ok(())
    }
}

struct ScriptedSource {
    name: String,
    engine: EngineType,
    script: Arc<Mutex<Script>>,
    queries: Arc<AtomicUsize>,
}

#[async_trait]
impl MetricSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, sql: &str) -> Result<QueryOutcome> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let reply = self.script.lock().replies.get(sql).cloned();
        match reply {
            Some(Reply::Rows(outcome)) => Ok(outcome),
            Some(Reply::Fail(error)) => Err(error),
            Some(Reply::Slow(delay, outcome)) => {
                tokio::time::sleep(delay).await;
                Ok(outcome)
            }
            Some(Reply::Panic) => panic!("driver crashed on {sql}"),
            None => Err(CollectorError::Syntax(format!("unknown statement: {sql}"))),
        }
    }

    fn stats(&self) -> PoolMetrics {
        PoolMetrics {
            pool_name: self.name.clone(),
            engine: self.engine,
            size: 1,
            num_idle: 1,
            is_closed: false,
            max_connections: 4,
            min_connections: 1,
        }
    }

    async fn close(&self) {}
}

pub fn outcome(columns: &[&str], rows: Vec<Vec<MetricValue>>) -> QueryOutcome {
    QueryOutcome {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
    }
}

/// Oracle system with one node per `(host, role)`
pub fn oracle_system(name: &str, nodes: &[(&str, NodeRole)]) -> SystemConfig {
    nodes.iter().fold(
        SystemConfig::new(name, EngineType::Oracle)
            .with_port(1521)
            .with_credentials("monitor", "secret"),
        |system, (host, role)| {
            system.with_node(Node::new(*host).with_service("ORCL").with_role(*role))
        },
    )
}

/// Ledger writing into a fresh temporary directory
pub fn temp_ledger() -> (TempDir, LedgerConfig, Arc<FailureLedger>) {
    let dir = TempDir::new().expect("temp dir");
    let config = ledger_config(&dir);
    let ledger = Arc::new(FailureLedger::new(&config));
    (dir, config, ledger)
}

pub fn ledger_config(dir: &TempDir) -> LedgerConfig {
    LedgerConfig {
        blacklist_path: dir.path().join("db_conn_blacklist.txt"),
        error_log_path: dir.path().join("db_conn_error.txt"),
        ..LedgerConfig::default()
    }
}

pub fn registry_with(driver: Arc<ScriptedDriver>) -> Arc<ConnectionRegistry> {
    Arc::new(ConnectionRegistry::new(DriverRegistry::empty().with_driver(driver)))
}
