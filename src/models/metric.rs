//! Metric definitions loaded from per-engine metric files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use super::ThresholdSpec;
use crate::error::CollectorError;

/// Shape of a metric's result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MetricShape {
    /// One scalar, or one row when explicit columns are configured
    #[default]
    Single,
    /// Every row of the result set
    Multi,
}

impl FromStr for MetricShape {
    type Err = CollectorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "SINGLE" => Ok(MetricShape::Single),
            "MULTI" => Ok(MetricShape::Multi),
            other => Err(CollectorError::Catalog(format!(
                "unsupported metric type '{other}', expected SINGLE or MULTI"
            ))),
        }
    }
}

impl TryFrom<String> for MetricShape {
    type Error = CollectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MetricShape> for String {
    fn from(shape: MetricShape) -> Self {
        shape.to_string()
    }
}

impl fmt::Display for MetricShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricShape::Single => write!(f, "SINGLE"),
            MetricShape::Multi => write!(f, "MULTI"),
        }
    }
}

/// Node fan-out policy for a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExecutionMode {
    /// Every node of the system
    All,
    /// Nodes with the master role
    Master,
    /// Nodes with the standby role
    Standby,
    /// One node, the first available
    #[default]
    First,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::All => "all",
            ExecutionMode::Master => "master",
            ExecutionMode::Standby => "standby",
            ExecutionMode::First => "first",
        }
    }
}

impl From<String> for ExecutionMode {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "all" => ExecutionMode::All,
            "master" => ExecutionMode::Master,
            "standby" => ExecutionMode::Standby,
            "first" | "" => ExecutionMode::First,
            "role" => {
                warn!("⚠️ execution_strategy.mode=role is deprecated, treating as first");
                ExecutionMode::First
            }
            other => {
                warn!(mode = %other, "⚠️ Unsupported execution_strategy.mode, treating as first");
                ExecutionMode::First
            }
        }
    }
}

impl From<ExecutionMode> for String {
    fn from(mode: ExecutionMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric-level retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(default)]
    pub delay_ms: u64,
    /// Added to the delay for every further retry
    #[serde(default)]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

impl RetryPolicyConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStrategy {
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicyConfig>,
}

/// One configured metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub shape: MetricShape,
    pub sql: String,
    /// Explicit column names; override the labels reported by the driver
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub execution_strategy: ExecutionStrategy,
    #[serde(default)]
    pub threshold: Option<ThresholdSpec>,
}

impl MetricDefinition {
    pub fn new(name: impl Into<String>, shape: MetricShape, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            shape,
            sql: sql.into(),
            columns: Vec::new(),
            execution_strategy: ExecutionStrategy::default(),
            threshold: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_strategy.mode = mode;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicyConfig) -> Self {
        self.execution_strategy.retry_policy = Some(retry_policy);
        self
    }

    pub fn with_threshold(mut self, threshold: ThresholdSpec) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.execution_strategy.mode
    }

    /// The metric's retry settings when they are switched on
    pub fn enabled_retry_policy(&self) -> Option<&RetryPolicyConfig> {
        self.execution_strategy
            .retry_policy
            .as_ref()
            .filter(|p| p.enabled)
    }
}
