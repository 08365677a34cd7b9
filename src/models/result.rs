//! Metric results handed to report generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::{EngineType, MetricDefinition, MetricShape, NodeRole, ThresholdLevel};
use crate::error::{CollectorError, Result};
use crate::masking::MaskedHost;

/// One decoded cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetricValue {
    pub fn is_null(&self) -> bool {
        matches!(self, MetricValue::Null)
    }

    /// Numeric view of typed numbers only; text is parsed by threshold evaluation
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Integer(i) => Some(*i as f64),
            MetricValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Textual view; `None` for NULL
    pub fn as_text(&self) -> Option<String> {
        match self {
            MetricValue::Null => None,
            MetricValue::Bool(b) => Some(b.to_string()),
            MetricValue::Integer(i) => Some(i.to_string()),
            MetricValue::Float(f) => Some(f.to_string()),
            MetricValue::Text(s) => Some(s.clone()),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Integer(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Float(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

/// Captured value(s) of one execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricPayload {
    /// Query returned no rows, or the execution failed
    #[default]
    Empty,
    Scalar { value: MetricValue },
    /// Column-aligned rows; a SINGLE metric with explicit columns yields exactly one row
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<MetricValue>>,
    },
}

impl MetricPayload {
    pub fn scalar(value: impl Into<MetricValue>) -> Self {
        MetricPayload::Scalar {
            value: value.into(),
        }
    }

    pub fn rows(columns: Vec<String>, rows: Vec<Vec<MetricValue>>) -> Self {
        MetricPayload::Rows { columns, rows }
    }

    pub fn value(&self) -> Option<&MetricValue> {
        match self {
            MetricPayload::Scalar { value } => Some(value),
            _ => None,
        }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            MetricPayload::Rows { columns, .. } => columns,
            _ => &[],
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            MetricPayload::Empty => 0,
            MetricPayload::Scalar { .. } => 1,
            MetricPayload::Rows { rows, .. } => rows.len(),
        }
    }
}

/// Where a result was collected. The host is masked on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultContext {
    pub system_name: String,
    pub engine: EngineType,
    pub node: MaskedHost,
    pub node_role: NodeRole,
}

impl ResultContext {
    pub fn new(system_name: impl Into<String>, engine: EngineType, host: &str, role: NodeRole) -> Self {
        Self {
            system_name: system_name.into(),
            engine,
            node: MaskedHost::from_host(host),
            node_role: role,
        }
    }

    /// Context for failures that happen before a node is resolved
    pub fn unresolved(system_name: impl Into<String>, engine: EngineType) -> Self {
        Self {
            system_name: system_name.into(),
            engine,
            node: MaskedHost::unknown(),
            node_role: NodeRole::Unknown,
        }
    }
}

/// Outcome of one (system, node, metric) execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub system_name: String,
    pub engine: EngineType,
    pub node: MaskedHost,
    pub node_role: NodeRole,
    pub metric_name: String,
    pub description: String,
    pub shape: MetricShape,
    pub payload: MetricPayload,
    pub success: bool,
    pub error: Option<String>,
    pub threshold_level: Option<ThresholdLevel>,
    pub collected_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl MetricResult {
    pub fn success(
        context: ResultContext,
        metric: &MetricDefinition,
        payload: MetricPayload,
        threshold_level: Option<ThresholdLevel>,
        duration: Duration,
    ) -> Self {
        Self::build(context, metric, payload, None, threshold_level, duration)
    }

    pub fn failure(
        context: ResultContext,
        metric: &MetricDefinition,
        error: &CollectorError,
        duration: Duration,
    ) -> Self {
        Self::build(
            context,
            metric,
            MetricPayload::Empty,
            Some(error.to_string()),
            None,
            duration,
        )
    }

    fn build(
        context: ResultContext,
        metric: &MetricDefinition,
        payload: MetricPayload,
        error: Option<String>,
        threshold_level: Option<ThresholdLevel>,
        duration: Duration,
    ) -> Self {
        Self {
            system_name: context.system_name,
            engine: context.engine,
            node: context.node,
            node_role: context.node_role,
            metric_name: metric.name.clone(),
            description: metric.description.clone(),
            shape: metric.shape,
            payload,
            success: error.is_none(),
            error,
            threshold_level,
            collected_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn value(&self) -> Option<&MetricValue> {
        self.payload.value()
    }

    pub fn is_flagged(&self) -> bool {
        self.threshold_level.is_some()
    }
}

/// Serialize a result list for the report collaborator
pub fn results_to_json(results: &[MetricResult]) -> Result<String> {
    Ok(serde_json::to_string_pretty(results)?)
}
