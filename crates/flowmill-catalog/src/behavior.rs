use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BehaviorError;

/// Everything a node sees for one invocation.
///
/// The runtime populates the fields that apply to the node's kind:
/// terminators get `previous_output`, processors get `inputs` plus
/// `connected`, everything else gets `inputs`. Token-producing nodes
/// may push increments into `tokens` while they run.
#[derive(Debug)]
pub struct NodeCall {
  pub node_id: String,
  pub node_type: String,
  /// Static config merged with live bindings, templates resolved.
  pub config: serde_json::Map<String, serde_json::Value>,
  /// Resolved user inputs, one entry per input handle.
  pub inputs: serde_json::Map<String, serde_json::Value>,
  /// Outputs of connected instances (processor kind only).
  pub connected: serde_json::Map<String, serde_json::Value>,
  /// Output of the previous node (terminator kind only).
  pub previous_output: serde_json::Value,
  pub session_id: String,
  /// Decrypted credential data, when the node declares it needs it.
  pub credentials: Option<serde_json::Map<String, serde_json::Value>>,
  /// Sink for token increments; `None` outside streaming mode.
  pub tokens: Option<mpsc::UnboundedSender<String>>,
}

impl NodeCall {
  /// The resolved value on the "input" handle, if any.
  pub fn input(&self) -> serde_json::Value {
    self
      .inputs
      .get("input")
      .cloned()
      .unwrap_or(serde_json::Value::Null)
  }
}

/// A constructed node implementation.
///
/// Implementations are either async (the default) or blocking. The
/// runtime awaits async nodes on the ambient tokio runtime and moves
/// blocking nodes onto a worker thread; a node never starts its own
/// event loop.
#[async_trait]
pub trait NodeBehavior: Send + Sync {
  /// Asynchronous entry point. The default delegates to the blocking
  /// entry point inline, which is correct for cheap sync nodes.
  async fn invoke(&self, call: NodeCall) -> Result<serde_json::Value, BehaviorError> {
    self.invoke_blocking(call)
  }

  /// Blocking entry point for sync node implementations.
  fn invoke_blocking(&self, _call: NodeCall) -> Result<serde_json::Value, BehaviorError> {
    Err(BehaviorError::UnsupportedStyle)
  }

  /// When true the runtime runs `invoke_blocking` on a worker thread
  /// instead of awaiting `invoke`.
  fn is_blocking(&self) -> bool {
    false
  }

  /// When true the runtime injects credential data into the call.
  fn needs_credentials(&self) -> bool {
    false
  }
}
