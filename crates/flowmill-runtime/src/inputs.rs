//! Input resolution and many-connection aggregation.

use flowmill_compiler::{CompiledNode, ConnectionInfo, OneOrMany};
use tracing::debug;

use crate::state::ExecutionState;

/// The single most relevant value in a node's raw result, used for
/// chaining, templating and previews.
pub fn primary_output(raw: &serde_json::Value) -> serde_json::Value {
  if let serde_json::Value::Object(map) = raw {
    for key in ["output", "result", "text", "documents"] {
      if let Some(value) = map.get(key) {
        return value.clone();
      }
    }
  }
  raw.clone()
}

/// Resolve every input handle of a node against the upstream outputs
/// stored in the run state.
///
/// A handle bound to exactly one connection always resolves to a
/// single record, never a one-element list; plural handles aggregate
/// per [`aggregate`].
pub(crate) fn resolve_inputs(
  node: &CompiledNode,
  state: &ExecutionState,
) -> serde_json::Map<String, serde_json::Value> {
  let mut inputs = serde_json::Map::new();

  for (handle, binding) in &node.input_bindings {
    let mut value = match binding {
      OneOrMany::One(info) => lookup(state, info),
      OneOrMany::Many(infos) => {
        let values: Vec<serde_json::Value> = infos.iter().map(|i| lookup(state, i)).collect();
        // Defensive: a plural binding can still hold one entry after
        // upstream filtering.
        if values.len() == 1 {
          values.into_iter().next().unwrap_or(serde_json::Value::Null)
        } else {
          aggregate(infos, values)
        }
      }
    };

    if handle == "tools" {
      value = unwrap_tools(value);
    }
    inputs.insert(handle.clone(), value);
  }

  // No inbound connection on "input": seed from the pipeline.
  if !inputs.contains_key("input") {
    inputs.insert("input".to_string(), state.last_output.clone());
  }

  inputs
}

/// Look up one upstream node's stored output for a single connection:
/// prefer the connection's source-handle key, then "documents", then
/// "output", then the whole record.
fn lookup(state: &ExecutionState, info: &ConnectionInfo) -> serde_json::Value {
  let Some(raw) = state.node_outputs.get(&info.node) else {
    debug!(upstream = %info.node, "upstream output missing; resolving to null");
    return serde_json::Value::Null;
  };
  if let serde_json::Value::Object(map) = raw {
    for key in [info.handle.as_str(), "documents", "output"] {
      if let Some(value) = map.get(key) {
        return value.clone();
      }
    }
  }
  raw.clone()
}

/// Aggregation for a handle with more than one inbound connection, in
/// precedence order: all-list values flatten; else a nonzero-priority
/// connection wins outright; else a type-directed merge.
fn aggregate(infos: &[ConnectionInfo], values: Vec<serde_json::Value>) -> serde_json::Value {
  if !values.is_empty() && values.iter().all(|v| v.is_array()) {
    let mut flat = Vec::new();
    for value in values {
      if let serde_json::Value::Array(items) = value {
        flat.extend(items);
      }
    }
    return serde_json::Value::Array(flat);
  }

  if infos.iter().any(|i| i.priority != 0) {
    let mut best = 0usize;
    for (index, info) in infos.iter().enumerate() {
      if info.priority > infos[best].priority {
        best = index;
      }
    }
    return values.into_iter().nth(best).unwrap_or(serde_json::Value::Null);
  }

  merge_by_type(values)
}

fn merge_by_type(values: Vec<serde_json::Value>) -> serde_json::Value {
  if values.iter().all(|v| v.is_object()) {
    let mut merged = serde_json::Map::new();
    for value in values {
      if let serde_json::Value::Object(map) = value {
        // Later connections override earlier ones on key collision.
        merged.extend(map);
      }
    }
    return serde_json::Value::Object(merged);
  }

  if values.iter().all(|v| v.is_string()) {
    let parts: Vec<&str> = values.iter().filter_map(|v| v.as_str()).collect();
    return serde_json::Value::String(parts.join("\n"));
  }

  if values.iter().all(|v| v.is_number()) {
    let sum: f64 = values.iter().filter_map(|v| v.as_f64()).sum();
    if let Some(number) = serde_json::Number::from_f64(sum) {
      return serde_json::Value::Number(number);
    }
  }

  serde_json::Value::Array(values)
}

/// A "tools" handle unwraps a dict result's "tools"/"tool" sub-field.
fn unwrap_tools(value: serde_json::Value) -> serde_json::Value {
  if let serde_json::Value::Object(map) = &value {
    if let Some(inner) = map.get("tools").or_else(|| map.get("tool")) {
      return inner.clone();
    }
  }
  value
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn info(node: &str, priority: i32) -> ConnectionInfo {
    ConnectionInfo {
      node: node.to_string(),
      handle: "output".to_string(),
      data_type: "any".to_string(),
      priority,
    }
  }

  #[test]
  fn test_all_lists_flatten() {
    let infos = vec![info("a", 0), info("b", 0)];
    let out = aggregate(&infos, vec![json!([1, 2]), json!([3])]);
    assert_eq!(out, json!([1, 2, 3]));
  }

  #[test]
  fn test_priority_winner_beats_type_merge() {
    let infos = vec![info("a", 0), info("b", 5)];
    let out = aggregate(&infos, vec![json!({"v": 1}), json!({"v": 2})]);
    assert_eq!(out, json!({"v": 2}));
  }

  #[test]
  fn test_lists_flatten_even_with_priorities() {
    let infos = vec![info("a", 9), info("b", 0)];
    let out = aggregate(&infos, vec![json!([1]), json!([2])]);
    assert_eq!(out, json!([1, 2]));
  }

  #[test]
  fn test_dicts_shallow_merge_later_wins() {
    let infos = vec![info("a", 0), info("b", 0)];
    let out = aggregate(&infos, vec![json!({"v": 1, "k": 0}), json!({"v": 2})]);
    assert_eq!(out, json!({"v": 2, "k": 0}));
  }

  #[test]
  fn test_strings_join_numbers_sum() {
    let infos = vec![info("a", 0), info("b", 0)];
    assert_eq!(
      aggregate(&infos, vec![json!("x"), json!("y")]),
      json!("x\ny")
    );
    assert_eq!(aggregate(&infos, vec![json!(1), json!(2.5)]), json!(3.5));
  }

  #[test]
  fn test_mixed_types_stay_a_list() {
    let infos = vec![info("a", 0), info("b", 0)];
    let out = aggregate(&infos, vec![json!("x"), json!(1)]);
    assert_eq!(out, json!(["x", 1]));
  }

  #[test]
  fn test_lookup_prefers_handle_then_documents_then_output() {
    let mut state =
      crate::state::ExecutionState::new(json!(null), "s".to_string(), None, None);
    state.store_output("a", json!({"custom": 1, "documents": 2, "output": 3}));

    let mut i = info("a", 0);
    i.handle = "custom".to_string();
    assert_eq!(lookup(&state, &i), json!(1));

    i.handle = "absent".to_string();
    assert_eq!(lookup(&state, &i), json!(2));

    state.store_output("b", json!({"output": 9}));
    let mut i = info("b", 0);
    i.handle = "absent".to_string();
    assert_eq!(lookup(&state, &i), json!(9));

    state.store_output("c", json!("whole"));
    assert_eq!(lookup(&state, &info("c", 0)), json!("whole"));
  }

  #[test]
  fn test_tools_handle_unwraps() {
    assert_eq!(unwrap_tools(json!({"tools": [1]})), json!([1]));
    assert_eq!(unwrap_tools(json!({"tool": "t"})), json!("t"));
    assert_eq!(unwrap_tools(json!({"other": 1})), json!({"other": 1}));
  }

  #[test]
  fn test_primary_output_flattening() {
    assert_eq!(primary_output(&json!({"output": "x", "meta": 1})), json!("x"));
    assert_eq!(primary_output(&json!({"text": "t"})), json!("t"));
    assert_eq!(primary_output(&json!([1, 2])), json!([1, 2]));
  }
}
