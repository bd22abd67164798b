//! Run-time error taxonomy.

use thiserror::Error;

/// Errors that halt a run.
///
/// A failed node always halts the run immediately; there is no retry
/// or backoff at this layer. The runtime converts these into a failed
/// [`RunOutcome`](crate::state::RunOutcome) (or a terminal error event
/// when streaming) rather than propagating a panic to the host.
#[derive(Debug, Error)]
pub enum RuntimeError {
  /// One node failed. Carries the full diagnostic context: the node's
  /// identity, the resolved config it ran with and its bound handles.
  #[error("node '{node_id}' ({node_type}) failed: {message}")]
  NodeExecution {
    node_id: String,
    node_type: String,
    message: String,
    config: serde_json::Map<String, serde_json::Value>,
    bindings: Vec<String>,
  },

  /// A conditional resolved to a branch with no outgoing connection.
  #[error("conditional node '{node_id}' resolved branch '{branch}' which has no connection")]
  MissingBranch { node_id: String, branch: String },

  /// The caller cancelled the run. Only raised at node boundaries.
  #[error("execution cancelled")]
  Cancelled,

  /// The compiled graph references a node the runtime cannot find.
  /// Indicates a compiler bug or a hand-built graph.
  #[error("invalid compiled graph: {message}")]
  InvalidGraph { message: String },
}

impl RuntimeError {
  /// Stable machine-readable tag, surfaced as `error_type` on a failed
  /// outcome.
  pub fn kind(&self) -> &'static str {
    match self {
      RuntimeError::NodeExecution { .. } => "node_execution",
      RuntimeError::MissingBranch { .. } => "missing_branch",
      RuntimeError::Cancelled => "cancelled",
      RuntimeError::InvalidGraph { .. } => "invalid_graph",
    }
  }
}

/// Failure in an external collaborator (credentials, checkpoints).
///
/// Never fatal on its own: credential failures degrade to running the
/// node without credentials, checkpoint failures degrade to skipping
/// the save. Both log `warn!`.
#[derive(Debug, Error)]
#[error("collaborator failure: {0}")]
pub struct CollaboratorError(pub String);
