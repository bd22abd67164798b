//! `{{alias}}` template resolution for string config values.

use std::collections::HashMap;

use flowmill_compiler::CompiledGraph;
use tracing::debug;

use crate::inputs::primary_output;
use crate::state::ExecutionState;

/// Build the alias table for one node invocation.
///
/// `input` always maps to the run's current input (the entry node's
/// primary output). Each already-executed node then binds its primary
/// output under the first non-colliding alias, tried in order: user
/// label, declared display name, declared name, raw id. A colliding
/// alias is skipped with a log line, never overwritten.
pub(crate) fn alias_map(
  graph: &CompiledGraph,
  state: &ExecutionState,
) -> HashMap<String, serde_json::Value> {
  let mut aliases: HashMap<String, serde_json::Value> = HashMap::new();
  aliases.insert("input".to_string(), state.current_input.clone());

  for id in &graph.node_order {
    let Some(raw) = state.node_outputs.get(id) else {
      continue;
    };
    let Some(node) = graph.get(id) else {
      continue;
    };
    let value = primary_output(raw);

    let candidates = [
      node.label.as_deref(),
      node.display_name.as_deref(),
      node.name.as_deref(),
      Some(node.id.as_str()),
    ];
    let mut bound = false;
    for alias in candidates.into_iter().flatten() {
      if aliases.contains_key(alias) {
        debug!(node_id = %id, alias = %alias, "template alias collision, skipping");
        continue;
      }
      aliases.insert(alias.to_string(), value);
      bound = true;
      break;
    }
    if !bound {
      debug!(node_id = %id, "every alias candidate collided; node output not templatable");
    }
  }

  aliases
}

/// Resolve `{{alias}}` placeholders in every string config value.
/// Unknown aliases are left in place. Non-string values pass through.
pub(crate) fn resolve_config(
  config: &serde_json::Map<String, serde_json::Value>,
  aliases: &HashMap<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
  config
    .iter()
    .map(|(key, value)| (key.clone(), resolve_value(value, aliases)))
    .collect()
}

fn resolve_value(
  value: &serde_json::Value,
  aliases: &HashMap<String, serde_json::Value>,
) -> serde_json::Value {
  match value {
    serde_json::Value::String(s) => serde_json::Value::String(resolve_str(s, aliases)),
    serde_json::Value::Array(items) => {
      serde_json::Value::Array(items.iter().map(|v| resolve_value(v, aliases)).collect())
    }
    serde_json::Value::Object(map) => serde_json::Value::Object(
      map
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, aliases)))
        .collect(),
    ),
    other => other.clone(),
  }
}

fn resolve_str(text: &str, aliases: &HashMap<String, serde_json::Value>) -> String {
  let mut out = String::with_capacity(text.len());
  let mut rest = text;
  while let Some(open) = rest.find("{{") {
    let Some(close) = rest[open + 2..].find("}}") else {
      break;
    };
    out.push_str(&rest[..open]);
    let name = rest[open + 2..open + 2 + close].trim();
    match aliases.get(name) {
      Some(value) => out.push_str(&render(value)),
      // Unknown alias: keep the placeholder verbatim.
      None => out.push_str(&rest[open..open + 2 + close + 2]),
    }
    rest = &rest[open + 2 + close + 2..];
  }
  out.push_str(rest);
  out
}

fn render(value: &serde_json::Value) -> String {
  match value {
    serde_json::Value::String(s) => s.clone(),
    serde_json::Value::Null => String::new(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn aliases(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.clone()))
      .collect()
  }

  #[test]
  fn test_resolve_str_replaces_known_aliases() {
    let table = aliases(&[("input", json!("hi")), ("summarizer", json!(42))]);
    assert_eq!(
      resolve_str("say {{input}} and {{ summarizer }}", &table),
      "say hi and 42"
    );
  }

  #[test]
  fn test_unknown_alias_left_verbatim() {
    let table = aliases(&[("input", json!("hi"))]);
    assert_eq!(resolve_str("{{missing}}", &table), "{{missing}}");
  }

  #[test]
  fn test_resolve_config_recurses_into_structures() {
    let table = aliases(&[("input", json!("hi"))]);
    let config = json!({
      "prompt": "{{input}}",
      "nested": {"also": "{{input}}!"},
      "list": ["{{input}}", 3]
    });
    let serde_json::Value::Object(config) = config else {
      unreachable!()
    };
    let resolved = resolve_config(&config, &table);
    assert_eq!(resolved.get("prompt"), Some(&json!("hi")));
    assert_eq!(resolved.get("nested"), Some(&json!({"also": "hi!"})));
    assert_eq!(resolved.get("list"), Some(&json!(["hi", 3])));
  }
}
