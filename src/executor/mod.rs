//! # Executor Module
//!
//! Metric execution against single nodes, per-engine worker pools that bound how many
//! executions run at once, and threshold evaluation of captured values.

pub mod query_executor;
pub mod scaling;
pub mod sizing;
pub mod threshold;
pub mod worker_pool;

pub use query_executor::{extract_payload, NodeSelector, QueryExecutor, DEFAULT_STATEMENT_TIMEOUT};
pub use scaling::{ScalingAction, ScalingPolicy};
pub use sizing::{PoolSizing, ENV_POOL_CORE, ENV_POOL_MAX, ENV_POOL_QUEUE};
pub use threshold::{evaluate as evaluate_threshold, normalize_column, parse_number};
pub use worker_pool::{EnginePool, WorkerPoolManager, WorkerPoolStats};
