//! Run-scoped mutable state and the final outcome record.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::RuntimeError;

/// Mutable state owned by exactly one run.
///
/// Created fresh per execution and mutated only by the runtime; the
/// compiled graph itself stays read-only. Parallel fan-out clones the
/// whole state per branch and merges the copies back afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionState {
  /// Value seeding the run; bound to template alias `input`.
  pub current_input: serde_json::Value,
  pub session_id: String,
  pub user_id: Option<String>,
  pub workflow_id: Option<String>,
  /// Scratch space, e.g. loop iteration counters.
  pub variables: HashMap<String, serde_json::Value>,
  /// Node ids in completion order, each at most once.
  pub executed_nodes: Vec<String>,
  /// Raw output per node, written at most once.
  pub node_outputs: HashMap<String, serde_json::Value>,
  pub errors: Vec<String>,
  pub node_errors: HashMap<String, serde_json::Value>,
  /// Flattened primary output of whichever node ran last.
  pub last_output: serde_json::Value,
}

impl ExecutionState {
  pub fn new(
    current_input: serde_json::Value,
    session_id: String,
    user_id: Option<String>,
    workflow_id: Option<String>,
  ) -> Self {
    Self {
      last_output: current_input.clone(),
      current_input,
      session_id,
      user_id,
      workflow_id,
      variables: HashMap::new(),
      executed_nodes: Vec::new(),
      node_outputs: HashMap::new(),
      errors: Vec::new(),
      node_errors: HashMap::new(),
    }
  }

  /// Append a node id to the executed list, idempotently.
  pub fn mark_executed(&mut self, node_id: &str) {
    if !self.executed_nodes.iter().any(|id| id == node_id) {
      self.executed_nodes.push(node_id.to_string());
    }
  }

  /// Store a node's raw output. First write wins; a node's per-run
  /// output is never overwritten.
  pub fn store_output(&mut self, node_id: &str, raw: serde_json::Value) {
    self.node_outputs.entry(node_id.to_string()).or_insert(raw);
  }

  /// Fold a finished parallel branch back in. Later branches override
  /// earlier ones on output-key collision.
  pub fn absorb_branch(&mut self, branch: ExecutionState) {
    for id in branch.executed_nodes {
      self.mark_executed(&id);
    }
    self.node_outputs.extend(branch.node_outputs);
    self.variables.extend(branch.variables);
    self.errors.extend(branch.errors);
    self.node_errors.extend(branch.node_errors);
    self.last_output = branch.last_output;
  }
}

/// What `execute` hands back in run-to-completion mode.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
  pub success: bool,
  pub result: serde_json::Value,
  pub executed_nodes: Vec<String>,
  pub outputs: HashMap<String, serde_json::Value>,
  pub session_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error_type: Option<String>,
}

impl RunOutcome {
  pub(crate) fn succeeded(state: ExecutionState) -> Self {
    Self {
      success: true,
      result: state.last_output,
      executed_nodes: state.executed_nodes,
      outputs: state.node_outputs,
      session_id: state.session_id,
      error: None,
      error_type: None,
    }
  }

  pub(crate) fn failed(state: ExecutionState, error: &RuntimeError) -> Self {
    Self {
      success: false,
      result: serde_json::Value::Null,
      executed_nodes: state.executed_nodes,
      outputs: state.node_outputs,
      session_id: state.session_id,
      error: Some(error.to_string()),
      error_type: Some(error.kind().to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_executed_append_is_idempotent() {
    let mut state = ExecutionState::new(json!("x"), "s".to_string(), None, None);
    state.mark_executed("a");
    state.mark_executed("b");
    state.mark_executed("a");
    assert_eq!(state.executed_nodes, vec!["a", "b"]);
  }

  #[test]
  fn test_output_first_write_wins() {
    let mut state = ExecutionState::new(json!(null), "s".to_string(), None, None);
    state.store_output("a", json!(1));
    state.store_output("a", json!(2));
    assert_eq!(state.node_outputs.get("a"), Some(&json!(1)));
  }

  #[test]
  fn test_branch_merge_later_wins() {
    let mut state = ExecutionState::new(json!(null), "s".to_string(), None, None);
    state.store_output("a", json!(1));

    let mut branch = state.clone();
    branch.node_outputs.insert("b".to_string(), json!(2));
    branch.mark_executed("b");
    branch.last_output = json!(2);

    state.absorb_branch(branch);
    assert_eq!(state.node_outputs.get("b"), Some(&json!(2)));
    assert_eq!(state.executed_nodes, vec!["b"]);
    assert_eq!(state.last_output, json!(2));
  }
}
