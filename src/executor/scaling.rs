//! # Worker Pool Scaling
//!
//! Growth decisions for engine worker pools. Pools only ever grow; concurrency added
//! by the monitor stays until the manager shuts down.

use tracing::{debug, info, warn};

use super::worker_pool::WorkerPoolStats;

/// Concurrency added per growth step
const GROWTH_STEP: usize = 2;

/// Scaling action recommendations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingAction {
    /// Add the specified number of workers
    ScaleUp { count: usize },
    /// No scaling action needed
    NoChange,
}

/// Scaling thresholds shared by every engine pool
#[derive(Debug, Clone)]
pub struct ScalingPolicy {
    /// Queue depth above which a pool grows
    queue_high_water: usize,
    /// Utilization (0.0-1.0) above which a capacity warning is logged
    utilization_warning: f64,
}

impl ScalingPolicy {
    pub fn new(queue_high_water: usize, utilization_warning: f64) -> Self {
        info!(
            "🎛️ SCALING: Creating scaling policy (queue high water: {}, utilization warning: {:.1}%)",
            queue_high_water,
            utilization_warning * 100.0
        );
        Self {
            queue_high_water,
            utilization_warning,
        }
    }

    /// Evaluate scaling action for a pool based on its stats
    pub fn evaluate(&self, stats: &WorkerPoolStats) -> ScalingAction {
        if stats.utilization() > self.utilization_warning {
            warn!(
                engine = %stats.engine,
                active = stats.active,
                max = stats.max,
                "⚠️ SCALING: {} pool above {:.0}% utilization",
                stats.engine,
                self.utilization_warning * 100.0
            );
        }

        if stats.queued <= self.queue_high_water {
            return ScalingAction::NoChange;
        }

        let headroom = stats.ceiling.saturating_sub(stats.concurrency);
        if headroom == 0 {
            debug!(
                "SCALING: {} pool at ceiling ({}), queue depth {}",
                stats.engine, stats.ceiling, stats.queued
            );
            return ScalingAction::NoChange;
        }

        let count = GROWTH_STEP.min(headroom);
        info!(
            "🎛️ SCALING: {} queue depth {} above {}, growing by {}",
            stats.engine, stats.queued, self.queue_high_water, count
        );
        ScalingAction::ScaleUp { count }
    }
}
