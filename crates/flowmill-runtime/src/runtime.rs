//! Graph traversal and execution modes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use flowmill_compiler::{CompiledGraph, ConditionalWiring, ControlFlowWiring};
use futures::future::{join_all, BoxFuture};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapter;
use crate::collaborators::{CheckpointStore, CredentialResolver, NoCheckpoints, NoCredentials};
use crate::error::RuntimeError;
use crate::events::{preview, ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::state::{ExecutionState, RunOutcome};

/// Parameters for one run.
#[derive(Debug, Default, Clone)]
pub struct RunRequest {
  /// Named run inputs; `input` seeds the pipeline.
  pub inputs: serde_json::Map<String, serde_json::Value>,
  pub session_id: Option<String>,
  pub user_id: Option<String>,
  pub workflow_id: Option<String>,
}

impl RunRequest {
  pub fn with_input(value: serde_json::Value) -> Self {
    let mut inputs = serde_json::Map::new();
    inputs.insert("input".to_string(), value);
    Self {
      inputs,
      ..Self::default()
    }
  }
}

/// Drives compiled graphs to completion.
///
/// Execution is a single cooperative pipeline: one node at a time,
/// except parallel fan-out, whose branches each own a cloned state.
/// The compiled graph is shared read-only; compile twice for two
/// independent runnable instances. Cancellation is honored at node
/// boundaries only.
pub struct ExecutionRuntime {
  notifier: Arc<dyn ExecutionNotifier>,
  credentials: Arc<dyn CredentialResolver>,
  checkpoints: Arc<dyn CheckpointStore>,
}

impl Default for ExecutionRuntime {
  fn default() -> Self {
    Self::new()
  }
}

impl ExecutionRuntime {
  /// Run-to-completion runtime with no collaborators attached.
  pub fn new() -> Self {
    Self {
      notifier: Arc::new(NoopNotifier),
      credentials: Arc::new(NoCredentials),
      checkpoints: Arc::new(NoCheckpoints),
    }
  }

  /// Streaming runtime: returns the paired event receiver. Events are
  /// ordered, one-pass and non-restartable.
  pub fn streaming() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (notifier, receiver) = ChannelNotifier::new();
    (Self::new().with_notifier(Arc::new(notifier)), receiver)
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn with_credentials(mut self, credentials: Arc<dyn CredentialResolver>) -> Self {
    self.credentials = credentials;
    self
  }

  pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
    self.checkpoints = checkpoints;
    self
  }

  /// Execute a compiled graph. Never panics the host: failures come
  /// back as a failed outcome (and a terminal error event when a
  /// notifier is attached).
  pub async fn execute(
    &self,
    graph: &CompiledGraph,
    request: RunRequest,
    cancel: CancellationToken,
  ) -> RunOutcome {
    let execution_id = uuid::Uuid::new_v4().to_string();
    let session_id = request
      .session_id
      .filter(|s| !s.trim().is_empty())
      .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let current_input = request
      .inputs
      .get("input")
      .cloned()
      .unwrap_or_else(|| serde_json::Value::Object(request.inputs.clone()));

    let mut state = ExecutionState::new(
      current_input,
      session_id,
      request.user_id,
      request.workflow_id,
    );

    info!(
      execution_id = %execution_id,
      session_id = %state.session_id,
      "workflow_started"
    );
    self.notifier.notify(ExecutionEvent::RunStarted {
      execution_id: execution_id.clone(),
      session_id: state.session_id.clone(),
    });

    let mut visited = HashSet::new();
    let result = self
      .traverse(
        graph,
        &mut state,
        &mut visited,
        graph.start_nodes.clone(),
        &cancel,
      )
      .await;

    match result {
      Ok(()) => {
        info!(
          execution_id = %execution_id,
          executed = state.executed_nodes.len(),
          "workflow_completed"
        );
        let outcome = RunOutcome::succeeded(state);
        self.notifier.notify(ExecutionEvent::RunCompleted {
          execution_id,
          outcome: outcome.clone(),
        });
        outcome
      }
      Err(e) => {
        error!(
          execution_id = %execution_id,
          error = %e,
          "workflow_failed"
        );
        self.notifier.notify(ExecutionEvent::RunFailed {
          execution_id,
          error: e.to_string(),
          error_type: e.kind().to_string(),
        });
        RunOutcome::failed(state, &e)
      }
    }
  }

  /// Traverse from a set of start nodes until the queue drains.
  /// Boxed so parallel branches can recurse.
  fn traverse<'a>(
    &'a self,
    graph: &'a CompiledGraph,
    state: &'a mut ExecutionState,
    visited: &'a mut HashSet<String>,
    start: Vec<String>,
    cancel: &'a CancellationToken,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    Box::pin(async move {
      let mut queue: VecDeque<String> = start.into();
      let mut defers: HashMap<String, usize> = HashMap::new();
      let defer_limit = graph.node_order.len().max(1);

      while let Some(id) = queue.pop_front() {
        if cancel.is_cancelled() {
          warn!("execution cancelled at node boundary");
          return Err(RuntimeError::Cancelled);
        }
        if visited.contains(&id) {
          continue;
        }

        match graph.control_flow.get(&id) {
          Some(ControlFlowWiring::Conditional(wiring)) => {
            visited.insert(id.clone());
            state.mark_executed(&id);
            // Routing is identity on the data path; downstream lookups
            // read the routed value through the node's output slot.
            state
              .node_outputs
              .insert(id.clone(), state.last_output.clone());
            let raw = Self::upstream_raw(graph, &id, state)
              .cloned()
              .unwrap_or_else(|| state.last_output.clone());
            let target = Self::route_conditional(wiring, &raw, &state.last_output)?;
            debug!(node_id = %id, target = %target, "conditional routed");
            queue.push_back(target);
          }

          Some(ControlFlowWiring::Loop(wiring)) => {
            let key = format!("{}.iterations", id);
            let count = state
              .variables
              .get(&key)
              .and_then(|v| v.as_u64())
              .unwrap_or(0);
            // Counter checked before the condition; exceeding the max
            // terminates without raising.
            let exit = count >= wiring.max_iterations
              || wiring
                .condition
                .as_ref()
                .is_some_and(|c| c.evaluate(&state.last_output));
            if exit {
              debug!(node_id = %id, iterations = count, "loop exited");
              visited.insert(id.clone());
              state.mark_executed(&id);
              for terminal in &graph.terminals {
                if !visited.contains(terminal) {
                  queue.push_back(terminal.clone());
                }
              }
            } else {
              state.variables.insert(key, serde_json::json!(count + 1));
              state
                .node_outputs
                .insert(id.clone(), state.last_output.clone());
              Self::reset_loop_body(graph, &wiring.body, &id, visited);
              queue.push_back(wiring.body.clone());
            }
          }

          Some(ControlFlowWiring::Parallel(wiring)) => {
            visited.insert(id.clone());
            state.mark_executed(&id);
            state
              .node_outputs
              .insert(id.clone(), state.last_output.clone());
            debug!(node_id = %id, branches = wiring.branches.len(), "parallel fan-out");

            let runs: Vec<_> = wiring
              .branches
              .iter()
              .map(|branch| {
                let mut branch_state = state.clone();
                let mut branch_visited = visited.clone();
                let branch = branch.clone();
                async move {
                  self
                    .traverse(graph, &mut branch_state, &mut branch_visited, vec![branch], cancel)
                    .await
                    .map(|()| (branch_state, branch_visited))
                }
              })
              .collect();

            for result in join_all(runs).await {
              let (branch_state, branch_visited) = result?;
              state.absorb_branch(branch_state);
              visited.extend(branch_visited);
            }
          }

          None => {
            // Reconvergence barrier: wait for pending upstream nodes,
            // bounded so an untaken branch cannot stall the queue.
            if Self::has_pending_upstream(graph, &id, visited) {
              let seen = defers.entry(id.clone()).or_insert(0);
              if *seen < defer_limit {
                *seen += 1;
                queue.push_back(id);
                continue;
              }
            }

            visited.insert(id.clone());
            let primary = self.run_one(graph, &id, state).await?;
            debug!(node_id = %id, "node finished");

            if !graph.is_terminal(&id) {
              for successor in graph.successors_of(&id) {
                if !visited.contains(&successor.target) {
                  queue.push_back(successor.target.clone());
                }
              }
            } else {
              // Terminal output is the run result.
              state.last_output = primary;
            }
          }
        }
      }

      Ok(())
    })
  }

  /// Execute one behavior-backed node with events, token forwarding
  /// and checkpointing around the adapter call.
  async fn run_one(
    &self,
    graph: &CompiledGraph,
    node_id: &str,
    state: &mut ExecutionState,
  ) -> Result<serde_json::Value, RuntimeError> {
    let node = graph.get(node_id).ok_or_else(|| RuntimeError::InvalidGraph {
      message: format!("wiring references unknown node '{}'", node_id),
    })?;

    self.notifier.notify(ExecutionEvent::NodeStarted {
      node_id: node.id.clone(),
      node_type: node.type_name.clone(),
    });

    // Token increments are forwarded as they arrive, not batched.
    let (tokens, forwarder) = if self.notifier.wants_tokens() {
      let (tx, mut rx) = mpsc::unbounded_channel::<String>();
      let notifier = self.notifier.clone();
      let id = node.id.clone();
      let handle = tokio::spawn(async move {
        while let Some(token) = rx.recv().await {
          notifier.notify(ExecutionEvent::Token {
            node_id: id.clone(),
            token,
          });
        }
      });
      (Some(tx), Some(handle))
    } else {
      (None, None)
    };

    let result = adapter::execute_node(graph, node, state, &*self.credentials, tokens).await;

    if let Some(handle) = forwarder {
      let _ = handle.await;
    }

    let primary = result?;
    self.notifier.notify(ExecutionEvent::NodeCompleted {
      node_id: node.id.clone(),
      preview: preview(&primary),
    });

    match serde_json::to_value(&*state) {
      Ok(snapshot) => {
        if let Err(e) = self.checkpoints.save(&state.session_id, &snapshot).await {
          warn!(session_id = %state.session_id, error = %e, "checkpoint save failed");
        }
      }
      Err(e) => warn!(error = %e, "state snapshot serialization failed"),
    }

    Ok(primary)
  }

  /// Pick the branch handle for a conditional and resolve its target.
  /// An unconnected branch is fatal and names the branch.
  fn route_conditional(
    wiring: &ConditionalWiring,
    raw: &serde_json::Value,
    flattened: &serde_json::Value,
  ) -> Result<String, RuntimeError> {
    if let Some(target) = &wiring.passthrough {
      return Ok(target.clone());
    }

    let handle = Self::branch_handle(wiring, raw, flattened);
    wiring
      .branches
      .get(&handle)
      .cloned()
      .ok_or(RuntimeError::MissingBranch {
        node_id: wiring.node_id.clone(),
        branch: handle,
      })
  }

  /// Branch selection order: explicit symbolic `route` in the upstream's
  /// raw output, then its boolean `condition_result`, then the compiled
  /// condition, then plain truthiness of the flattened value. The
  /// markers are read from the raw record because output flattening
  /// drops sibling keys next to an `output` key.
  fn branch_handle(
    wiring: &ConditionalWiring,
    raw: &serde_json::Value,
    flattened: &serde_json::Value,
  ) -> String {
    if let serde_json::Value::Object(map) = raw {
      if let Some(route) = map.get("route").and_then(|v| v.as_str()) {
        return route.to_string();
      }
      if let Some(flag) = map.get("condition_result").and_then(|v| v.as_bool()) {
        return bool_handle(flag);
      }
    }
    if let Some(condition) = &wiring.condition {
      return bool_handle(condition.evaluate(flattened));
    }
    bool_handle(truthy(flattened))
  }

  /// The raw stored output of the node feeding `node_id`, if any.
  fn upstream_raw<'b>(
    graph: &CompiledGraph,
    node_id: &str,
    state: &'b ExecutionState,
  ) -> Option<&'b serde_json::Value> {
    let node = graph.get(node_id)?;
    let binding = node
      .input_bindings
      .get("input")
      .or_else(|| node.input_bindings.values().next())?;
    let source = match binding {
      flowmill_compiler::OneOrMany::One(info) => &info.node,
      flowmill_compiler::OneOrMany::Many(infos) => &infos.first()?.node,
    };
    state.node_outputs.get(source)
  }

  fn has_pending_upstream(graph: &CompiledGraph, node_id: &str, visited: &HashSet<String>) -> bool {
    let Some(node) = graph.get(node_id) else {
      return false;
    };
    node.input_bindings.values().any(|binding| {
      let infos: Vec<&flowmill_compiler::ConnectionInfo> = match binding {
        flowmill_compiler::OneOrMany::One(info) => vec![info],
        flowmill_compiler::OneOrMany::Many(infos) => infos.iter().collect(),
      };
      infos.iter().any(|info| {
        info.node != node_id
          && graph.get(&info.node).is_some()
          // Routing nodes dispatch before their targets run; waiting
          // on them would stall loop bodies.
          && !graph.control_flow.contains_key(&info.node)
          && !visited.contains(&info.node)
      })
    })
  }

  /// Un-visit the loop body subgraph so the next iteration re-runs it.
  /// Stops at the loop node itself and at terminals.
  fn reset_loop_body(
    graph: &CompiledGraph,
    body: &str,
    loop_id: &str,
    visited: &mut HashSet<String>,
  ) {
    let mut stack = vec![body.to_string()];
    let mut seen = HashSet::new();
    while let Some(id) = stack.pop() {
      if !seen.insert(id.clone()) || id == loop_id || graph.is_terminal(&id) {
        continue;
      }
      visited.remove(&id);
      for successor in graph.successors_of(&id) {
        stack.push(successor.target.clone());
      }
    }
  }
}

fn bool_handle(flag: bool) -> String {
  if flag { "true_output" } else { "false_output" }.to_string()
}

fn truthy(value: &serde_json::Value) -> bool {
  match value {
    serde_json::Value::Null => false,
    serde_json::Value::Bool(b) => *b,
    serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
    serde_json::Value::String(s) => !s.is_empty(),
    serde_json::Value::Array(a) => !a.is_empty(),
    serde_json::Value::Object(o) => !o.is_empty(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_truthiness() {
    assert!(!truthy(&json!(null)));
    assert!(!truthy(&json!(0)));
    assert!(!truthy(&json!("")));
    assert!(truthy(&json!("x")));
    assert!(truthy(&json!([1])));
    assert!(!truthy(&json!({})));
  }

  #[test]
  fn test_branch_handle_precedence() {
    let wiring = ConditionalWiring {
      node_id: "c".to_string(),
      branches: HashMap::new(),
      passthrough: None,
      condition: None,
    };
    assert_eq!(
      ExecutionRuntime::branch_handle(&wiring, &json!({"route": "retry"}), &json!({"route": "retry"})),
      "retry"
    );
    assert_eq!(
      ExecutionRuntime::branch_handle(&wiring, &json!({"condition_result": false}), &json!({"condition_result": false})),
      "false_output"
    );
    assert_eq!(
      ExecutionRuntime::branch_handle(&wiring, &json!("nonempty"), &json!("nonempty")),
      "true_output"
    );
  }

  #[test]
  fn test_markers_read_from_raw_record_not_flattened() {
    let wiring = ConditionalWiring {
      node_id: "c".to_string(),
      branches: HashMap::new(),
      passthrough: None,
      condition: None,
    };
    // Flattening strips sibling keys next to "output"; the marker must
    // still win over truthiness of the flattened value.
    let raw = json!({"output": "x", "condition_result": false});
    assert_eq!(
      ExecutionRuntime::branch_handle(&wiring, &raw, &json!("x")),
      "false_output"
    );
    let raw = json!({"output": "x", "route": "retry"});
    assert_eq!(
      ExecutionRuntime::branch_handle(&wiring, &raw, &json!("x")),
      "retry"
    );
  }
}
