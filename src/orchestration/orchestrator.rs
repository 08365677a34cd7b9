//! # Collection Orchestrator
//!
//! Plans one collection run from the metric catalog and the system definitions, fans the
//! resulting work units out to the per-engine worker pools and gathers the results under
//! a single deadline.
//!
//! ## Planning
//!
//! - Metrics are grouped by engine and paired with every enabled system of that engine.
//! - Systems whose every node the failure ledger skips are dropped before planning.
//! - `all` yields one unit per node, `master`/`standby` one unit per node with that role,
//!   `first` one unit whose node the executor resolves.
//! - Units are de-duplicated by (system, node, metric).
//!
//! Units still running when the deadline hits are aborted and produce no result.

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::catalog::MetricCatalog;
use super::stats::CollectionStats;
use crate::config::CollectorConfig;
use crate::database::ConnectionRegistry;
use crate::error::CollectorError;
use crate::executor::{NodeSelector, QueryExecutor, WorkerPoolManager};
use crate::ledger::FailureLedger;
use crate::logging::{log_collection_summary, log_error};
use crate::masking::{mask_database_name, mask_host};
use crate::models::{
    EngineType, ExecutionMode, MetricDefinition, MetricResult, NodeRole, ResultContext,
    SystemConfig,
};

pub const DEFAULT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(300);

/// One (system, node, metric) execution
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub engine: EngineType,
    pub system: Arc<SystemConfig>,
    pub metric: Arc<MetricDefinition>,
    pub selector: NodeSelector,
}

impl WorkUnit {
    fn dedup_key(&self) -> (String, String, String) {
        let node = match &self.selector {
            NodeSelector::Node(node) => format!("{}:{}", node.host, node.database_label()),
            NodeSelector::Role(role) => format!("role:{role}"),
            NodeSelector::First => "first".to_string(),
        };
        (self.system.name.clone(), node, self.metric.name.clone())
    }
}

/// Results and counters of one collection run
#[derive(Debug, Clone)]
pub struct CollectionReport {
    pub run_id: String,
    pub results: Vec<MetricResult>,
    pub stats: CollectionStats,
}

pub struct Orchestrator {
    executor: Arc<QueryExecutor>,
    pools: WorkerPoolManager,
    collection_timeout: Duration,
}

impl Orchestrator {
    pub fn new(executor: Arc<QueryExecutor>, pools: WorkerPoolManager) -> Self {
        Self {
            executor,
            pools,
            collection_timeout: DEFAULT_COLLECTION_TIMEOUT,
        }
    }

    /// Executor, breakers and worker pools wired from configuration
    pub fn from_config(
        registry: Arc<ConnectionRegistry>,
        ledger: Arc<FailureLedger>,
        config: &CollectorConfig,
    ) -> Self {
        let executor = Arc::new(QueryExecutor::from_config(registry, ledger, config));
        Self::new(executor, WorkerPoolManager::new(&config.worker_pool))
            .with_collection_timeout(config.collection.timeout())
    }

    pub fn with_collection_timeout(mut self, collection_timeout: Duration) -> Self {
        self.collection_timeout = collection_timeout;
        self
    }

    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    pub fn worker_pools(&self) -> &WorkerPoolManager {
        &self.pools
    }

    fn ledger(&self) -> &FailureLedger {
        self.executor.ledger()
    }

    /// Run every catalog metric against every matching system
    pub async fn collect(&self, systems: &[SystemConfig], catalog: &MetricCatalog) -> CollectionReport {
        let run_id = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.collection_timeout;
        self.pools.start_monitor();

        let (units, mut stats) = self.plan(systems, catalog);
        info!(
            run_id = %run_id,
            units = units.len(),
            systems = stats.systems_total,
            timeout_secs = self.collection_timeout.as_secs(),
            "🚀 Starting metric collection"
        );

        let results = self.execute_units(units, deadline, &mut stats).await;

        if stats.units_abandoned > 0 {
            warn!(
                run_id = %run_id,
                abandoned = stats.units_abandoned,
                "⏰ Collection deadline reached, completed {}/{} units",
                stats.units_completed,
                stats.units_planned
            );
        }
        if stats.units_panicked > 0 {
            warn!(
                run_id = %run_id,
                panicked = stats.units_panicked,
                "💥 Collection completed {}/{} units, {} metric tasks panicked",
                stats.units_completed,
                stats.units_planned,
                stats.units_panicked
            );
        }
        if !stats.is_partial() {
            info!(
                run_id = %run_id,
                "✅ Collection completed {}/{} units",
                stats.units_completed,
                stats.units_planned
            );
        }

        if let Err(e) = self.ledger().persist().await {
            log_error("orchestrator", "persist_ledger", &e.to_string(), Some(run_id.as_str()));
        }
        if let Some(breakers) = self.executor.circuit_breakers() {
            let breaker_metrics = breakers.get_system_metrics();
            debug!(run_id = %run_id, "🛡️ {}", breaker_metrics.format_summary());
            stats.unhealthy_breakers = breaker_metrics
                .unhealthy_targets()
                .into_iter()
                .map(str::to_string)
                .collect();
        }
        log_collection_summary(&run_id, &stats);

        CollectionReport {
            run_id,
            results,
            stats,
        }
    }

    /// Work units for one run, with planning counters filled in
    pub fn plan(&self, systems: &[SystemConfig], catalog: &MetricCatalog) -> (Vec<WorkUnit>, CollectionStats) {
        let mut stats = CollectionStats::default();
        let mut units = Vec::new();
        let mut seen = HashSet::new();
        let mut skipped_nodes = HashSet::new();

        for (engine, metrics) in catalog.iter() {
            if metrics.is_empty() {
                continue;
            }
            let metrics: Vec<Arc<MetricDefinition>> = metrics.iter().cloned().map(Arc::new).collect();

            for system in systems.iter().filter(|s| s.engine == engine) {
                stats.systems_total += 1;
                if !system.enable {
                    debug!(system = %system.name, "System disabled, skipping");
                    stats.systems_skipped += 1;
                    continue;
                }
                if self.ledger().should_skip_system(system) {
                    info!(system = %system.name, "⏭️ Every node of system is known to be failing, skipping");
                    stats.systems_skipped += 1;
                    continue;
                }

                let system = Arc::new(system.clone());
                for metric in &metrics {
                    for selector in self.selectors(&system, metric, &mut skipped_nodes) {
                        let unit = WorkUnit {
                            engine,
                            system: Arc::clone(&system),
                            metric: Arc::clone(metric),
                            selector,
                        };
                        if seen.insert(unit.dedup_key()) {
                            units.push(unit);
                        }
                    }
                }
            }
        }

        stats.nodes_skipped = skipped_nodes.len();
        stats.units_planned = units.len();
        (units, stats)
    }

    fn selectors(
        &self,
        system: &SystemConfig,
        metric: &MetricDefinition,
        skipped_nodes: &mut HashSet<(String, String)>,
    ) -> Vec<NodeSelector> {
        let role = match metric.mode() {
            ExecutionMode::First => return vec![NodeSelector::First],
            ExecutionMode::All => None,
            ExecutionMode::Master => Some(NodeRole::Master),
            ExecutionMode::Standby => Some(NodeRole::Standby),
        };

        let nodes: Vec<_> = match role {
            Some(role) => {
                let nodes = system.nodes_with_role(role);
                if nodes.is_empty() {
                    warn!(
                        system = %system.name,
                        metric = %metric.name,
                        role = %role,
                        "⚠️ No node with required role, skipping metric"
                    );
                }
                nodes
            }
            None => system.nodes.iter().collect(),
        };

        nodes
            .into_iter()
            .filter(|node| {
                if self.ledger().should_skip_node(system, node) {
                    debug!(
                        system = %system.name,
                        node = %mask_host(&node.host),
                        database = %mask_database_name(node.database_label()),
                        metric = %metric.name,
                        "Node known to be failing, skipping"
                    );
                    skipped_nodes.insert((system.name.clone(), node.host.clone()));
                    return false;
                }
                true
            })
            .map(|node| NodeSelector::Node(node.clone()))
            .collect()
    }

    async fn execute_units(
        &self,
        units: Vec<WorkUnit>,
        deadline: Instant,
        stats: &mut CollectionStats,
    ) -> Vec<MetricResult> {
        let units: Arc<[WorkUnit]> = units.into();
        let mut results = Vec::with_capacity(units.len());
        let mut pending = FuturesUnordered::new();
        let mut abort_handles: Vec<AbortHandle> = Vec::with_capacity(units.len());
        let mut rejected = Vec::new();

        let submission = async {
            for (index, unit) in units.iter().enumerate() {
                let executor = Arc::clone(&self.executor);
                let task_unit = unit.clone();
                let task = async move {
                    executor
                        .execute_metric(
                            task_unit.engine,
                            &task_unit.system,
                            &task_unit.metric,
                            &task_unit.selector,
                        )
                        .await
                };

                match self.pools.submit(unit.engine, task).await {
                    Ok(handle) => {
                        abort_handles.push(handle.abort_handle());
                        pending.push(async move { (index, handle.await) });
                    }
                    Err(e) => rejected.push((index, e)),
                }
            }
        };

        if tokio::time::timeout_at(deadline, submission).await.is_err() {
            warn!(
                submitted = pending.len() + rejected.len(),
                planned = units.len(),
                "⏰ Collection deadline reached during submission"
            );
        }

        for (index, error) in rejected {
            let result = rejection_result(&units[index], &error);
            stats.record_result(&result);
            results.push(result);
        }

        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((index, joined))) => match joined {
                    Ok(Ok(result)) => {
                        stats.record_result(&result);
                        results.push(result);
                    }
                    Ok(Err(error)) => {
                        let result = rejection_result(&units[index], &error);
                        stats.record_result(&result);
                        results.push(result);
                    }
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => {
                        let unit = &units[index];
                        stats.units_panicked += 1;
                        let context = format!("{}/{}", unit.system.name, unit.metric.name);
                        log_error("orchestrator", "metric_task", &e.to_string(), Some(context.as_str()));
                    }
                },
                Ok(None) => break,
                Err(_) => {
                    for handle in &abort_handles {
                        handle.abort();
                    }
                    break;
                }
            }
        }

        stats.units_abandoned = stats
            .units_planned
            .saturating_sub(stats.units_completed + stats.units_panicked);
        results
    }

    /// Stop the worker pools and close every connection pool
    pub async fn shutdown(&self) {
        self.pools.shutdown();
        self.executor.registry().close_all().await;
    }
}

fn rejection_result(unit: &WorkUnit, error: &CollectorError) -> MetricResult {
    let context = match &unit.selector {
        NodeSelector::Node(node) => {
            ResultContext::new(&unit.system.name, unit.engine, &node.host, node.role)
        }
        _ => ResultContext::unresolved(&unit.system.name, unit.engine),
    };
    MetricResult::failure(context, &unit.metric, error, Duration::ZERO)
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("executor", &self.executor)
            .field("pools", &self.pools.stats())
            .field("collection_timeout", &self.collection_timeout)
            .finish()
    }
}
