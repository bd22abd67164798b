use serde::{Deserialize, Serialize};

/// The closed set of node capabilities.
///
/// The runtime dispatches exclusively on this tag; there is no
/// reflective "does it happen to have method X" probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  /// Plain state transform.
  Standard,
  /// Multi-step processor invoked with user inputs and connected
  /// instance outputs. May be implemented sync or async.
  Processor,
  /// Configuration provider; produces a value from its own config.
  Provider,
  /// Stateful, session-scoped memory holder.
  Memory,
  /// Conditional, loop or parallel operator. Compiled into graph
  /// wiring, never invoked as a data transform.
  ControlFlow,
  /// Designated end of the graph; receives the previous output.
  Terminator,
}

impl NodeKind {
  /// Kinds that never count as "isolated" during validation.
  pub fn is_boundary(self) -> bool {
    matches!(self, NodeKind::Terminator)
  }
}

impl std::fmt::Display for NodeKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      NodeKind::Standard => "standard",
      NodeKind::Processor => "processor",
      NodeKind::Provider => "provider",
      NodeKind::Memory => "memory",
      NodeKind::ControlFlow => "control_flow",
      NodeKind::Terminator => "terminator",
    };
    f.write_str(s)
  }
}
