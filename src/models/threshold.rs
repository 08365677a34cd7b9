//! Threshold definitions attached to metrics.
//!
//! Two forms are accepted. The legacy form carries a single `operator`/`value`/`level`
//! (optionally a `column`, or a per-column map of values). The rule form is an ordered
//! `rules` list. When both are present the rules win.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::CollectorError;

/// Severity of a threshold hit, ordered `Medium < High`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ThresholdLevel {
    Medium,
    High,
}

impl ThresholdLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdLevel::Medium => "medium",
            ThresholdLevel::High => "high",
        }
    }
}

impl TryFrom<String> for ThresholdLevel {
    type Error = CollectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "high" => Ok(ThresholdLevel::High),
            "medium" => Ok(ThresholdLevel::Medium),
            other => Err(CollectorError::Catalog(format!(
                "unsupported threshold level '{other}', expected high or medium"
            ))),
        }
    }
}

impl From<ThresholdLevel> for String {
    fn from(level: ThresholdLevel) -> Self {
        level.as_str().to_string()
    }
}

impl fmt::Display for ThresholdLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator. Unrecognized operators are kept so they can be reported, and
/// never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ThresholdOperator {
    #[default]
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    Unknown(String),
}

impl ThresholdOperator {
    pub fn as_str(&self) -> &str {
        match self {
            ThresholdOperator::Gt => ">",
            ThresholdOperator::Ge => ">=",
            ThresholdOperator::Lt => "<",
            ThresholdOperator::Le => "<=",
            ThresholdOperator::Eq => "=",
            ThresholdOperator::Ne => "!=",
            ThresholdOperator::Unknown(raw) => raw,
        }
    }
}

impl From<String> for ThresholdOperator {
    fn from(value: String) -> Self {
        match value.trim() {
            ">" | "" => ThresholdOperator::Gt,
            ">=" => ThresholdOperator::Ge,
            "<" => ThresholdOperator::Lt,
            "<=" => ThresholdOperator::Le,
            "=" | "==" => ThresholdOperator::Eq,
            "!=" | "<>" => ThresholdOperator::Ne,
            other => ThresholdOperator::Unknown(other.to_string()),
        }
    }
}

impl From<ThresholdOperator> for String {
    fn from(operator: ThresholdOperator) -> Self {
        operator.as_str().to_string()
    }
}

impl fmt::Display for ThresholdOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A threshold operand as written in the metric file: `90`, `"85%"`, `"ONLINE"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdScalar {
    Number(f64),
    Text(String),
}

impl ThresholdScalar {
    pub fn as_text(&self) -> String {
        match self {
            ThresholdScalar::Number(n) => n.to_string(),
            ThresholdScalar::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for ThresholdScalar {
    fn from(value: f64) -> Self {
        ThresholdScalar::Number(value)
    }
}

impl From<&str> for ThresholdScalar {
    fn from(value: &str) -> Self {
        ThresholdScalar::Text(value.to_string())
    }
}

/// Legacy `value`: one operand, or one operand per column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdValue {
    PerColumn(BTreeMap<String, ThresholdScalar>),
    Scalar(ThresholdScalar),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub level: ThresholdLevel,
    #[serde(default)]
    pub operator: ThresholdOperator,
    pub value: ThresholdScalar,
    #[serde(default)]
    pub column: Option<String>,
}

impl ThresholdRule {
    pub fn new(
        level: ThresholdLevel,
        operator: impl Into<String>,
        value: impl Into<ThresholdScalar>,
    ) -> Self {
        Self {
            level,
            operator: ThresholdOperator::from(operator.into()),
            value: value.into(),
            column: None,
        }
    }

    pub fn on_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSpec {
    /// Level of the legacy single threshold; `high` when absent
    #[serde(default)]
    pub level: Option<ThresholdLevel>,
    #[serde(default)]
    pub operator: ThresholdOperator,
    #[serde(default)]
    pub value: Option<ThresholdValue>,
    /// Target column of the legacy threshold, and the default column for rules
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub rules: Vec<ThresholdRule>,
}

impl ThresholdSpec {
    /// Rule-based spec
    pub fn with_rules(rules: Vec<ThresholdRule>) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Legacy scalar spec
    pub fn legacy(
        level: ThresholdLevel,
        operator: impl Into<String>,
        value: impl Into<ThresholdScalar>,
    ) -> Self {
        Self {
            level: Some(level),
            operator: ThresholdOperator::from(operator.into()),
            value: Some(ThresholdValue::Scalar(value.into())),
            ..Self::default()
        }
    }

    pub fn on_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn legacy_level(&self) -> ThresholdLevel {
        self.level.unwrap_or(ThresholdLevel::High)
    }
}
