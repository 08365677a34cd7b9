//! # Threshold Evaluation
//!
//! Pure evaluation of a metric's threshold definition against a captured payload.
//!
//! Rule-based definitions take precedence over the legacy single-threshold form. Scalars
//! use the first matching rule; rows report the highest level any cell reaches. Column
//! names are compared after [`normalize_column`].

use crate::models::{
    MetricPayload, MetricValue, ThresholdLevel, ThresholdOperator, ThresholdRule, ThresholdScalar,
    ThresholdSpec, ThresholdValue,
};

const EPSILON: f64 = 1e-4;

/// Level reached by `payload`, or `None` when nothing matches or no threshold is defined
pub fn evaluate(threshold: Option<&ThresholdSpec>, payload: &MetricPayload) -> Option<ThresholdLevel> {
    let spec = threshold?;
    if spec.rules.is_empty() {
        evaluate_legacy(spec, payload)
    } else {
        evaluate_rules(spec, payload)
    }
}

fn evaluate_rules(spec: &ThresholdSpec, payload: &MetricPayload) -> Option<ThresholdLevel> {
    match payload {
        MetricPayload::Empty => None,
        MetricPayload::Scalar { value } => spec
            .rules
            .iter()
            .find(|rule| matches(value, &rule.operator, &rule.value))
            .map(|rule| rule.level),
        MetricPayload::Rows { columns, rows } => {
            let mut highest = None;
            for (index, column) in columns.iter().enumerate() {
                let normalized = normalize_column(column);
                let applicable: Vec<&ThresholdRule> = spec
                    .rules
                    .iter()
                    .filter(|rule| {
                        rule.column
                            .as_deref()
                            .or(spec.column.as_deref())
                            .is_some_and(|c| normalize_column(c) == normalized)
                    })
                    .collect();
                if applicable.is_empty() {
                    continue;
                }

                for row in rows {
                    let Some(cell) = row.get(index) else { continue };
                    for rule in &applicable {
                        if matches(cell, &rule.operator, &rule.value) {
                            highest = highest.max(Some(rule.level));
                        }
                    }
                }
            }
            highest
        }
    }
}

fn evaluate_legacy(spec: &ThresholdSpec, payload: &MetricPayload) -> Option<ThresholdLevel> {
    let level = spec.legacy_level();
    match (payload, spec.value.as_ref()?) {
        (MetricPayload::Scalar { value }, ThresholdValue::Scalar(expected)) => {
            matches(value, &spec.operator, expected).then_some(level)
        }
        (MetricPayload::Rows { columns, rows }, ThresholdValue::PerColumn(per_column)) => {
            let hit = per_column.iter().any(|(column, expected)| {
                column_matches(columns, rows, column, |cell| {
                    matches(cell, &spec.operator, expected)
                })
            });
            hit.then_some(level)
        }
        (MetricPayload::Rows { columns, rows }, ThresholdValue::Scalar(expected)) => {
            let hit = match spec.column.as_deref() {
                Some(column) => column_matches(columns, rows, column, |cell| {
                    matches(cell, &spec.operator, expected)
                }),
                // no column named: the first cell stands in for the metric's value
                None => rows
                    .first()
                    .and_then(|row| row.first())
                    .is_some_and(|cell| matches(cell, &spec.operator, expected)),
            };
            hit.then_some(level)
        }
        _ => None,
    }
}

fn column_matches(
    columns: &[String],
    rows: &[Vec<MetricValue>],
    target: &str,
    predicate: impl Fn(&MetricValue) -> bool,
) -> bool {
    let target = normalize_column(target);
    columns
        .iter()
        .enumerate()
        .filter(|(_, c)| normalize_column(c) == target)
        .any(|(index, _)| rows.iter().filter_map(|row| row.get(index)).any(&predicate))
}

/// Compare one cell against one operand
pub fn matches(actual: &MetricValue, operator: &ThresholdOperator, expected: &ThresholdScalar) -> bool {
    let Some(actual_text) = actual.as_text() else {
        return false;
    };

    let actual_number = actual.as_f64().or_else(|| parse_number(&actual_text));
    let expected_number = match expected {
        ThresholdScalar::Number(n) => Some(*n),
        ThresholdScalar::Text(s) => parse_number(s),
    };

    match (actual_number, expected_number) {
        (Some(a), Some(e)) => match operator {
            ThresholdOperator::Gt => a > e,
            ThresholdOperator::Ge => a >= e,
            ThresholdOperator::Lt => a < e,
            ThresholdOperator::Le => a <= e,
            ThresholdOperator::Eq => (a - e).abs() < EPSILON,
            ThresholdOperator::Ne => (a - e).abs() >= EPSILON,
            ThresholdOperator::Unknown(_) => false,
        },
        _ => match operator {
            ThresholdOperator::Eq => actual_text == expected.as_text(),
            ThresholdOperator::Ne => actual_text != expected.as_text(),
            _ => false,
        },
    }
}

/// Numeric reading of a cell or operand; tolerates `%` and thousands separators
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '%' && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Lowercase, letters and digits only: `Usage %` and `usage_percent` differ, `USAGE` and `usage` do not
pub fn normalize_column(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
