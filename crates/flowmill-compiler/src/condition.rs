//! Shared condition evaluator for conditional and loop nodes.

use serde::Deserialize;
use tracing::warn;

use crate::expr::Expr;

/// The supported comparison modes. Anything else is carried as
/// `Other` and evaluates false with a logged warning.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionKind {
  Contains,
  Equals,
  GreaterThan,
  LessThan,
  Expression,
  Other(String),
}

impl ConditionKind {
  pub fn from_name(name: &str) -> Self {
    match name {
      "contains" => ConditionKind::Contains,
      "equals" => ConditionKind::Equals,
      "greater_than" => ConditionKind::GreaterThan,
      "less_than" => ConditionKind::LessThan,
      "expression" => ConditionKind::Expression,
      other => ConditionKind::Other(other.to_string()),
    }
  }
}

/// Raw condition config as it appears in node data.
#[derive(Debug, Clone, Deserialize)]
struct RawCondition {
  #[serde(rename = "kind", alias = "type")]
  kind: String,
  #[serde(default)]
  expected: serde_json::Value,
  #[serde(default)]
  expression: Option<String>,
}

/// A condition attached to a conditional or loop node.
#[derive(Debug, Clone)]
pub struct ConditionSpec {
  pub kind: ConditionKind,
  pub expected: serde_json::Value,
  /// Pre-parsed at compile time for the expression mode.
  pub expression: Option<Expr>,
}

impl ConditionSpec {
  /// Parse a condition out of node config. Returns `Ok(None)` when the
  /// node declares no condition; expression syntax errors surface so
  /// the control-flow compiler can fail the build.
  pub fn from_config(
    config: &serde_json::Map<String, serde_json::Value>,
  ) -> Result<Option<Self>, String> {
    let Some(raw_value) = config.get("condition") else {
      return Ok(None);
    };
    let raw: RawCondition = serde_json::from_value(raw_value.clone())
      .map_err(|e| format!("malformed condition config: {}", e))?;

    let kind = ConditionKind::from_name(&raw.kind);
    let expression = match (&kind, raw.expression.as_deref()) {
      (ConditionKind::Expression, Some(text)) => {
        Some(Expr::parse(text).map_err(|e| e.to_string())?)
      }
      (ConditionKind::Expression, None) => {
        return Err("expression condition without an expression".to_string());
      }
      _ => None,
    };

    Ok(Some(Self {
      kind,
      expected: raw.expected,
      expression,
    }))
  }

  /// Evaluate against the single candidate value. No ambient scope.
  pub fn evaluate(&self, candidate: &serde_json::Value) -> bool {
    match &self.kind {
      ConditionKind::Contains => match (candidate, &self.expected) {
        (serde_json::Value::String(haystack), serde_json::Value::String(needle)) => {
          haystack.contains(needle.as_str())
        }
        (serde_json::Value::Array(items), needle) => items.contains(needle),
        _ => false,
      },
      ConditionKind::Equals => stringify(candidate) == stringify(&self.expected),
      ConditionKind::GreaterThan => match (candidate.as_f64(), self.expected.as_f64()) {
        (Some(l), Some(r)) => l > r,
        _ => false,
      },
      ConditionKind::LessThan => match (candidate.as_f64(), self.expected.as_f64()) {
        (Some(l), Some(r)) => l < r,
        _ => false,
      },
      ConditionKind::Expression => self
        .expression
        .as_ref()
        .is_some_and(|expr| expr.eval(candidate)),
      ConditionKind::Other(name) => {
        warn!(kind = %name, "unknown condition kind evaluates false");
        false
      }
    }
  }
}

fn stringify(value: &serde_json::Value) -> String {
  match value {
    serde_json::Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn spec(config: serde_json::Value) -> ConditionSpec {
    let map = config.as_object().unwrap().clone();
    ConditionSpec::from_config(&map).unwrap().unwrap()
  }

  #[test]
  fn test_contains_substring() {
    let c = spec(json!({"condition": {"kind": "contains", "expected": "ell"}}));
    assert!(c.evaluate(&json!("hello")));
    assert!(!c.evaluate(&json!("goodbye")));
  }

  #[test]
  fn test_equals_string_equality() {
    let c = spec(json!({"condition": {"kind": "equals", "expected": "5"}}));
    assert!(c.evaluate(&json!("5")));
    assert!(c.evaluate(&json!(5)));
  }

  #[test]
  fn test_numeric_comparisons() {
    let gt = spec(json!({"condition": {"kind": "greater_than", "expected": 3}}));
    assert!(gt.evaluate(&json!(4)));
    assert!(!gt.evaluate(&json!(3)));
    assert!(!gt.evaluate(&json!("not a number")));

    let lt = spec(json!({"condition": {"kind": "less_than", "expected": 3}}));
    assert!(lt.evaluate(&json!(2)));
  }

  #[test]
  fn test_expression_mode() {
    let c = spec(json!({
      "condition": {"kind": "expression", "expression": "value > 2 && value < 10"}
    }));
    assert!(c.evaluate(&json!(5)));
    assert!(!c.evaluate(&json!(12)));
  }

  #[test]
  fn test_bad_expression_is_a_compile_error() {
    let map = json!({"condition": {"kind": "expression", "expression": "import os"}})
      .as_object()
      .unwrap()
      .clone();
    assert!(ConditionSpec::from_config(&map).is_err());
  }

  #[test]
  fn test_unknown_kind_evaluates_false() {
    let c = spec(json!({"condition": {"kind": "regex", "expected": ".*"}}));
    assert!(!c.evaluate(&json!("anything")));
  }

  #[test]
  fn test_absent_condition_is_none() {
    let map = serde_json::Map::new();
    assert!(ConditionSpec::from_config(&map).unwrap().is_none());
  }
}
