//! The per-node execution adapter.
//!
//! One invocation: merge config, establish session context, resolve
//! templates and inputs, dispatch by kind, then record either the
//! structured failure or the success bookkeeping.

use flowmill_catalog::{NodeCall, NodeKind};
use flowmill_compiler::{CompiledGraph, CompiledNode};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::collaborators::CredentialResolver;
use crate::error::RuntimeError;
use crate::inputs::{primary_output, resolve_inputs};
use crate::state::ExecutionState;
use crate::template;

/// Run one compiled node against the state. Returns the flattened
/// primary output; the raw result is stored in the state.
///
/// Any failure is wrapped into [`RuntimeError::NodeExecution`] with
/// the node's identity, resolved config and bound handles, recorded
/// into the state's error bookkeeping, and returned to halt the run.
pub(crate) async fn execute_node(
  graph: &CompiledGraph,
  node: &CompiledNode,
  state: &mut ExecutionState,
  credentials: &dyn CredentialResolver,
  tokens: Option<mpsc::UnboundedSender<String>>,
) -> Result<serde_json::Value, RuntimeError> {
  // Session context for stateful kinds; derived once per run.
  if state.session_id.trim().is_empty() {
    state.session_id = uuid::Uuid::new_v4().to_string();
    debug!(session_id = %state.session_id, "derived session id");
  }

  let aliases = template::alias_map(graph, state);
  let config = template::resolve_config(&node.config, &aliases);
  let mut inputs = resolve_inputs(node, state);

  // Processors see peer outputs separately from their own input.
  let mut connected = serde_json::Map::new();
  if node.kind == NodeKind::Processor {
    let peer_handles: Vec<String> = inputs
      .keys()
      .filter(|h| h.as_str() != "input")
      .cloned()
      .collect();
    for handle in peer_handles {
      if let Some(value) = inputs.remove(&handle) {
        connected.insert(handle, value);
      }
    }
  }

  let credential_data = if node.needs_credentials {
    match &state.user_id {
      Some(user_id) => match credentials.resolve(user_id).await {
        Ok(map) => Some(map),
        Err(e) => {
          warn!(node_id = %node.id, error = %e, "credential resolution failed; running without");
          None
        }
      },
      None => None,
    }
  } else {
    None
  };

  let call = NodeCall {
    node_id: node.id.clone(),
    node_type: node.type_name.clone(),
    config: config.clone(),
    inputs,
    connected,
    previous_output: state.last_output.clone(),
    session_id: state.session_id.clone(),
    credentials: credential_data,
    tokens,
  };

  let invoked = if node.behavior.is_blocking() {
    // Sync node inside an async caller: a worker thread, never a
    // nested event loop.
    let behavior = node.behavior.clone();
    match tokio::task::spawn_blocking(move || behavior.invoke_blocking(call)).await {
      Ok(result) => result.map_err(|e| e.to_string()),
      Err(join) => Err(format!("worker thread failed: {}", join)),
    }
  } else {
    node.behavior.invoke(call).await.map_err(|e| e.to_string())
  };

  match invoked {
    Ok(raw) => {
      state.store_output(&node.id, raw.clone());
      let primary = primary_output(&raw);
      state.last_output = primary.clone();
      if node.kind != NodeKind::Terminator {
        state.mark_executed(&node.id);
      }
      Ok(primary)
    }
    Err(message) => {
      let error = RuntimeError::NodeExecution {
        node_id: node.id.clone(),
        node_type: node.type_name.clone(),
        message: message.clone(),
        config,
        bindings: node.input_bindings.keys().cloned().collect(),
      };
      state.errors.push(error.to_string());
      state.node_errors.insert(
        node.id.clone(),
        serde_json::json!({ "error": message, "type": node.type_name }),
      );
      state.last_output = serde_json::json!({ "error": message });
      Err(error)
    }
  }
}
