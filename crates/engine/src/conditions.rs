//! Workflow-level trigger conditions.
//!
//! A workflow only starts when every condition holds against the trigger
//! payload. Field paths use the same dotted syntax as step templates.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use steps::expression::{as_number, values_equal};
use steps::resolver::lookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    #[default]
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Exists,
    NotExists,
    In,
    NotIn,
}

/// `{ "field": "booking.total", "operator": "greater_than", "value": 1000 }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    #[serde(default)]
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn matches(&self, payload: &Value) -> bool {
        let actual = lookup(payload, &self.field).filter(|v| !v.is_null());
        let expected = &self.value;

        use ConditionOperator::*;
        match self.operator {
            Exists => actual.is_some(),
            NotExists => actual.is_none(),
            Equals => actual.is_some_and(|a| values_equal(a, expected)),
            NotEquals => !actual.is_some_and(|a| values_equal(a, expected)),
            Contains => actual.is_some_and(|a| contains(a, expected)),
            NotContains => !actual.is_some_and(|a| contains(a, expected)),
            GreaterThan => compare(actual, expected, |a, b| a > b),
            LessThan => compare(actual, expected, |a, b| a < b),
            GreaterOrEqual => compare(actual, expected, |a, b| a >= b),
            LessOrEqual => compare(actual, expected, |a, b| a <= b),
            In => actual.is_some_and(|a| member_of(a, expected)),
            NotIn => !actual.is_some_and(|a| member_of(a, expected)),
        }
    }
}

/// True when every condition holds. An empty list always matches.
pub fn conditions_match(conditions: &[Condition], payload: &Value) -> bool {
    conditions.iter().all(|c| c.matches(payload))
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

fn member_of(actual: &Value, expected: &Value) -> bool {
    match expected {
        Value::Array(items) => items.iter().any(|item| values_equal(actual, item)),
        _ => false,
    }
}

fn compare(actual: Option<&Value>, expected: &Value, cmp: fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(as_number), as_number(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}
