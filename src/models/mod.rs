pub mod engine;
pub mod metric;
pub mod result;
pub mod system;
pub mod threshold;

// Re-export core models for easy access
pub use engine::EngineType;
pub use metric::{ExecutionMode, ExecutionStrategy, MetricDefinition, MetricShape, RetryPolicyConfig};
pub use result::{MetricPayload, MetricResult, MetricValue, ResultContext};
pub use system::{Node, NodeRole, PoolOverrides, SystemConfig};
pub use threshold::{ThresholdLevel, ThresholdOperator, ThresholdRule, ThresholdScalar, ThresholdSpec, ThresholdValue};
