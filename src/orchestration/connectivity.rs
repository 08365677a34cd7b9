//! # Connectivity Probe
//!
//! Pre-flight check of every node of every enabled system. Each node gets a direct
//! connect-and-ping that bypasses the pools; endpoints that fail are recorded into the
//! failure ledger so the collection run that follows skips them.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::ConnectivityConfig;
use crate::database::{ConnectionIdentity, ConnectionRegistry};
use crate::error::CollectorError;
use crate::ledger::FailureLedger;
use crate::masking::MaskedHost;
use crate::models::{EngineType, Node, SystemConfig};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ProbeStatus {
    Reachable,
    Failed(String),
    /// Already known to the ledger; not contacted
    Skipped,
    /// Node definition cannot produce a connection string
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub system_name: String,
    pub engine: EngineType,
    pub node: MaskedHost,
    /// Masked connection string, empty for invalid nodes
    pub connection: String,
    pub status: ProbeStatus,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeReport {
    pub outcomes: Vec<ProbeOutcome>,
}

impl ProbeReport {
    fn count(&self, predicate: impl Fn(&ProbeStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.status)).count()
    }

    pub fn reachable(&self) -> usize {
        self.count(|s| matches!(s, ProbeStatus::Reachable))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ProbeStatus::Failed(_) | ProbeStatus::Invalid(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ProbeStatus::Skipped))
    }

    pub fn all_reachable(&self) -> bool {
        self.reachable() == self.outcomes.len()
    }
}

pub struct ConnectivityProbe {
    registry: Arc<ConnectionRegistry>,
    ledger: Arc<FailureLedger>,
    probe_timeout: Duration,
}

impl ConnectivityProbe {
    pub fn new(registry: Arc<ConnectionRegistry>, ledger: Arc<FailureLedger>) -> Self {
        Self {
            registry,
            ledger,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn from_config(
        registry: Arc<ConnectionRegistry>,
        ledger: Arc<FailureLedger>,
        config: &ConnectivityConfig,
    ) -> Self {
        Self::new(registry, ledger).with_probe_timeout(config.probe_timeout())
    }

    /// Outer bound for one probe, on top of the registry's login timeout
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Probe every node of every enabled system concurrently, then persist the ledger
    pub async fn run(&self, systems: &[SystemConfig]) -> ProbeReport {
        let started = Instant::now();
        let probes = systems
            .iter()
            .filter(|system| system.enable)
            .flat_map(|system| system.nodes.iter().map(move |node| (system, node)))
            .map(|(system, node)| self.probe_node(system, node));

        let report = ProbeReport {
            outcomes: join_all(probes).await,
        };

        if let Err(e) = self.ledger.persist().await {
            error!(error = %e, "❌ Failed to persist connection failures after probe");
        }

        info!(
            nodes = report.outcomes.len(),
            reachable = report.reachable(),
            failed = report.failed(),
            skipped = report.skipped(),
            duration_ms = started.elapsed().as_millis() as u64,
            "🔌 Connectivity probe finished"
        );
        report
    }

    async fn probe_node(&self, system: &SystemConfig, node: &Node) -> ProbeOutcome {
        let started = Instant::now();
        let outcome = |connection: String, status: ProbeStatus| ProbeOutcome {
            system_name: system.name.clone(),
            engine: system.engine,
            node: MaskedHost::from_host(&node.host),
            connection,
            status,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        let identity = match ConnectionIdentity::for_node(system, node) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(system = %system.name, error = %e, "⚠️ Invalid node definition");
                return outcome(String::new(), ProbeStatus::Invalid(e.to_string()));
            }
        };

        if self.ledger.should_skip(&identity) {
            return outcome(identity.masked(), ProbeStatus::Skipped);
        }

        let attempt = self
            .registry
            .test_connection(&system.name, node, system, system.engine);
        let result = match tokio::time::timeout(self.probe_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(CollectorError::ConnectTimeout {
                target: identity.masked(),
                timeout: self.probe_timeout,
            }),
        };

        match result {
            Ok(()) => outcome(identity.masked(), ProbeStatus::Reachable),
            Err(e) => {
                warn!(
                    system = %system.name,
                    connection = %identity,
                    error = %e,
                    "🔌 Connectivity probe failed"
                );
                if e.is_connectivity() {
                    self.ledger.record_failure(&system.name, &identity);
                }
                outcome(identity.masked(), ProbeStatus::Failed(e.to_string()))
            }
        }
    }
}
