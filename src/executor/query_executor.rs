//! # Query Executor
//!
//! Runs one metric against one node and turns every outcome into a [`MetricResult`].
//!
//! ## Execution order
//!
//! 1. Resolve the node (explicit, by role, or first available).
//! 2. Ledger check: known-bad endpoints fail immediately without a connection attempt.
//! 3. Circuit breaker for the system, around
//! 4. the retry policy, around
//! 5. pool acquisition and the statement, bounded by the statement timeout.
//! 6. Shape extraction and threshold evaluation.
//!
//! Connectivity failures that survive the retries are recorded into the ledger.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::threshold;
use crate::config::CollectorConfig;
use crate::database::{ConnectionIdentity, ConnectionRegistry, QueryOutcome};
use crate::error::{CollectorError, Result};
use crate::ledger::FailureLedger;
use crate::masking::mask_host;
use crate::models::{
    EngineType, MetricDefinition, MetricPayload, MetricResult, MetricShape, Node, NodeRole,
    ResultContext, SystemConfig,
};
use crate::resilience::CircuitBreakerManager;
use crate::retry::RetryPolicy;

pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Which node of a system a metric runs on
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSelector {
    /// Exactly this node
    Node(Node),
    /// First usable node with this role, else the first usable node
    Role(NodeRole),
    /// First usable node
    First,
}

pub struct QueryExecutor {
    registry: Arc<ConnectionRegistry>,
    ledger: Arc<FailureLedger>,
    breakers: Option<CircuitBreakerManager>,
    retry: RetryPolicy,
    statement_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(registry: Arc<ConnectionRegistry>, ledger: Arc<FailureLedger>) -> Self {
        Self {
            registry,
            ledger,
            breakers: Some(CircuitBreakerManager::default()),
            retry: RetryPolicy::standard(),
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
        }
    }

    pub fn from_config(
        registry: Arc<ConnectionRegistry>,
        ledger: Arc<FailureLedger>,
        config: &CollectorConfig,
    ) -> Self {
        let breakers = config
            .circuit_breaker
            .enabled
            .then(|| CircuitBreakerManager::new(config.circuit_breaker.to_resilience_config()));
        Self::new(registry, ledger)
            .with_circuit_breakers(breakers)
            .with_statement_timeout(config.query.statement_timeout())
    }

    /// `None` runs without circuit breakers
    pub fn with_circuit_breakers(mut self, breakers: Option<CircuitBreakerManager>) -> Self {
        self.breakers = breakers;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_statement_timeout(mut self, statement_timeout: Duration) -> Self {
        self.statement_timeout = statement_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<FailureLedger> {
        &self.ledger
    }

    pub fn circuit_breakers(&self) -> Option<&CircuitBreakerManager> {
        self.breakers.as_ref()
    }

    /// Execute `metric` on the selected node of `system`. Never fails: errors become
    /// failed results.
    pub async fn execute_metric(
        &self,
        engine: EngineType,
        system: &SystemConfig,
        metric: &MetricDefinition,
        selector: &NodeSelector,
    ) -> MetricResult {
        let started = Instant::now();

        let Some(node) = self.resolve_node(system, selector) else {
            let error = CollectorError::Configuration(format!(
                "system {} has no nodes configured",
                system.name
            ));
            warn!(system = %system.name, metric = %metric.name, "⚠️ No node to run metric on");
            return MetricResult::failure(
                ResultContext::unresolved(&system.name, engine),
                metric,
                &error,
                started.elapsed(),
            );
        };

        let context = ResultContext::new(&system.name, engine, &node.host, node.role);
        match self.run_on_node(engine, system, node, metric).await {
            Ok(payload) => {
                let level = threshold::evaluate(metric.threshold.as_ref(), &payload);
                if let Some(level) = level {
                    info!(
                        system = %system.name,
                        node = %context.node,
                        metric = %metric.name,
                        level = %level.as_str(),
                        "🚩 Metric crossed threshold"
                    );
                }
                debug!(
                    system = %system.name,
                    node = %context.node,
                    metric = %metric.name,
                    rows = payload.row_count(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "✅ Metric collected"
                );
                MetricResult::success(context, metric, payload, level, started.elapsed())
            }
            Err(error) => {
                warn!(
                    system = %system.name,
                    node = %context.node,
                    metric = %metric.name,
                    kind = %error.kind(),
                    error = %error,
                    "❌ Metric collection failed"
                );
                MetricResult::failure(context, metric, &error, started.elapsed())
            }
        }
    }

    async fn run_on_node(
        &self,
        engine: EngineType,
        system: &SystemConfig,
        node: &Node,
        metric: &MetricDefinition,
    ) -> Result<MetricPayload> {
        let identity = ConnectionIdentity::for_node(system, node)?;
        if self.ledger.should_skip(&identity) {
            debug!(
                system = %system.name,
                connection = %identity,
                "⏭️ Endpoint known to be failing, not connecting"
            );
            return Err(CollectorError::Blacklisted(identity.masked()));
        }

        let label = format!("{}/{}/{}", system.name, mask_host(&node.host), metric.name);
        let label = label.as_str();
        let retry_policy = metric.enabled_retry_policy();
        let attempts = move || {
            self.retry.execute_with_retry(label, retry_policy, move || {
                self.attempt(engine, system, node, metric)
            })
        };

        let outcome = match &self.breakers {
            Some(breakers) => breakers.get_circuit_breaker(&system.name).call(attempts).await,
            None => attempts().await,
        };

        match outcome {
            Ok(outcome) => Ok(extract_payload(metric, outcome)),
            Err(error) => {
                if error.is_connectivity() {
                    self.ledger.record_failure(&system.name, &identity);
                }
                Err(error)
            }
        }
    }

    async fn attempt(
        &self,
        engine: EngineType,
        system: &SystemConfig,
        node: &Node,
        metric: &MetricDefinition,
    ) -> Result<QueryOutcome> {
        let source = self
            .registry
            .acquire(&system.name, node, system, engine)
            .await?;

        match tokio::time::timeout(self.statement_timeout, source.fetch(&metric.sql)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CollectorError::QueryTimeout {
                metric: metric.name.clone(),
                timeout: self.statement_timeout,
            }),
        }
    }

    /// Node for `selector`, preferring nodes the ledger does not skip
    pub fn resolve_node<'a>(
        &self,
        system: &'a SystemConfig,
        selector: &'a NodeSelector,
    ) -> Option<&'a Node> {
        let role = match selector {
            NodeSelector::Node(node) => return Some(node),
            NodeSelector::Role(role) => Some(*role),
            NodeSelector::First => None,
        };

        let usable: Vec<&Node> = system
            .nodes
            .iter()
            .filter(|node| !self.ledger.should_skip_node(system, node))
            .collect();
        let candidates = if usable.is_empty() {
            system.nodes.iter().collect()
        } else {
            usable
        };

        let Some(role) = role else {
            return candidates.first().copied();
        };

        if let Some(node) = candidates.iter().find(|node| node.role == role) {
            return Some(*node);
        }

        let fallback = candidates.first().copied();
        if let Some(node) = fallback {
            warn!(
                system = %system.name,
                role = %role,
                fallback = %mask_host(&node.host),
                "⚠️ No node with requested role, using first available node"
            );
        }
        fallback
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("registry", &self.registry)
            .field("breakers", &self.breakers.is_some())
            .field("statement_timeout", &self.statement_timeout)
            .finish()
    }
}

/// Shape a raw query outcome according to the metric definition
pub fn extract_payload(metric: &MetricDefinition, outcome: QueryOutcome) -> MetricPayload {
    let QueryOutcome { columns, mut rows } = outcome;
    match metric.shape {
        MetricShape::Single => {
            if rows.is_empty() {
                return MetricPayload::Empty;
            }
            let first = rows.swap_remove(0);

            if !metric.columns.is_empty() {
                let names = column_names(metric, &columns, first.len());
                return MetricPayload::rows(names, vec![first]);
            }

            let index = if is_name_value_pair(&columns) { 1 } else { 0 };
            match first.into_iter().nth(index) {
                Some(value) => MetricPayload::Scalar { value },
                None => MetricPayload::Empty,
            }
        }
        MetricShape::Multi => {
            let width = rows.first().map_or(columns.len(), Vec::len);
            let names = column_names(metric, &columns, width);
            MetricPayload::rows(names, rows)
        }
    }
}

/// Configured names by position, falling back to the driver's labels
fn column_names(metric: &MetricDefinition, labels: &[String], width: usize) -> Vec<String> {
    let width = width.max(labels.len());
    if width == 0 {
        return metric.columns.clone();
    }
    (0..width)
        .map(|i| {
            metric
                .columns
                .get(i)
                .or_else(|| labels.get(i))
                .cloned()
                .unwrap_or_else(|| format!("column_{}", i + 1))
        })
        .collect()
}

/// `SHOW STATUS`-style results: a name column followed by a value column
fn is_name_value_pair(labels: &[String]) -> bool {
    let [first, second] = labels else {
        return false;
    };
    let first = first.to_lowercase();
    let second = second.to_lowercase();
    (first.contains("variable") || first.contains("name")) && second.contains("value")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricValue;

    fn outcome(columns: &[&str], rows: Vec<Vec<MetricValue>>) -> QueryOutcome {
        QueryOutcome {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn test_single_uses_value_column_of_name_value_pair() {
        let metric = MetricDefinition::new("threads", MetricShape::Single, "SHOW STATUS");
        let payload = extract_payload(
            &metric,
            outcome(
                &["Variable_name", "Value"],
                vec![vec!["Threads_connected".into(), "17".into()]],
            ),
        );
        assert_eq!(payload, MetricPayload::scalar("17"));
    }

    #[test]
    fn test_single_defaults_to_first_column() {
        let metric = MetricDefinition::new("uptime", MetricShape::Single, "SELECT 1");
        let payload = extract_payload(
            &metric,
            outcome(&["uptime", "host"], vec![vec![42_i64.into(), "db1".into()]]),
        );
        assert_eq!(payload, MetricPayload::scalar(42_i64));
    }

    #[test]
    fn test_single_with_columns_yields_one_row() {
        let metric = MetricDefinition::new("mem", MetricShape::Single, "SELECT ...")
            .with_columns(["Total"]);
        let payload = extract_payload(
            &metric,
            outcome(
                &["TOTAL_MB", "FREE_MB"],
                vec![vec![1024_i64.into(), 256_i64.into()], vec![1_i64.into(), 1_i64.into()]],
            ),
        );
        assert_eq!(payload.columns(), ["Total".to_string(), "FREE_MB".to_string()]);
        assert_eq!(payload.row_count(), 1);
    }

    #[test]
    fn test_single_without_rows_is_empty() {
        let metric = MetricDefinition::new("none", MetricShape::Single, "SELECT 1 WHERE 1=0");
        assert_eq!(extract_payload(&metric, outcome(&[], vec![])), MetricPayload::Empty);
    }

    #[test]
    fn test_multi_keeps_all_rows() {
        let metric = MetricDefinition::new("ts", MetricShape::Multi, "SELECT ...");
        let payload = extract_payload(
            &metric,
            outcome(
                &["name", "pct"],
                vec![vec!["USERS".into(), 92_i64.into()], vec!["SYSTEM".into(), 60_i64.into()]],
            ),
        );
        assert_eq!(payload.columns(), ["name".to_string(), "pct".to_string()]);
        assert_eq!(payload.row_count(), 2);

        let empty = extract_payload(&metric.with_columns(["a"]), outcome(&[], vec![]));
        assert_eq!(empty, MetricPayload::rows(vec!["a".into()], vec![]));
    }
}
