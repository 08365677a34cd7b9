//! Counters describing one collection run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{EngineType, MetricResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub systems_total: usize,
    /// Disabled systems and systems whose every node the ledger skips
    pub systems_skipped: usize,
    pub nodes_skipped: usize,
    pub units_planned: usize,
    pub units_completed: usize,
    /// Units still pending or unsubmitted when the deadline hit
    pub units_abandoned: usize,
    /// Units whose task panicked instead of producing a result
    pub units_panicked: usize,
    pub results_succeeded: usize,
    pub results_failed: usize,
    pub results_by_engine: BTreeMap<EngineType, usize>,
    /// Systems whose circuit breaker reported unhealthy operation at the end of the run
    pub unhealthy_breakers: Vec<String>,
}

impl CollectionStats {
    pub fn record_result(&mut self, result: &MetricResult) {
        self.units_completed += 1;
        if result.success {
            self.results_succeeded += 1;
        } else {
            self.results_failed += 1;
        }
        *self.results_by_engine.entry(result.engine).or_insert(0) += 1;
    }

    pub fn is_partial(&self) -> bool {
        self.units_completed < self.units_planned
    }

    /// Share of planned units that produced a result, 1.0 for an empty run
    pub fn completion_ratio(&self) -> f64 {
        if self.units_planned == 0 {
            return 1.0;
        }
        self.units_completed as f64 / self.units_planned as f64
    }
}
