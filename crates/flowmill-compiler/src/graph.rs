//! Compiled graph representation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use flowmill_catalog::{NodeBehavior, NodeKind};
use serde::Serialize;

use crate::connection::{ConnectionInfo, OneOrMany};
use crate::control_flow::{ControlFlowStats, ControlFlowWiring};
use crate::pool::PoolStats;
use crate::validation::ValidationReport;

/// Node id used for a synthesized terminal sink.
pub const SYNTHETIC_TERMINAL_ID: &str = "__terminal__";

/// A node instantiated and wired for execution. Owned by exactly one
/// [`CompiledGraph`].
pub struct CompiledNode {
  pub id: String,
  pub type_name: String,
  pub kind: NodeKind,
  /// Alias sources for template resolution, in precedence order:
  /// label, display name, name; the raw id is the final fallback.
  pub label: Option<String>,
  pub display_name: Option<String>,
  pub name: Option<String>,
  pub config: serde_json::Map<String, serde_json::Value>,
  pub input_bindings: HashMap<String, OneOrMany<ConnectionInfo>>,
  pub output_bindings: HashMap<String, Vec<ConnectionInfo>>,
  pub needs_credentials: bool,
  pub behavior: Arc<dyn NodeBehavior>,
}

impl fmt::Debug for CompiledNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CompiledNode")
      .field("id", &self.id)
      .field("type_name", &self.type_name)
      .field("kind", &self.kind)
      .field("inputs", &self.input_bindings.keys().collect::<Vec<_>>())
      .field("outputs", &self.output_bindings.keys().collect::<Vec<_>>())
      .finish()
  }
}

/// One outgoing wire from a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Successor {
  pub handle: String,
  pub target: String,
}

/// Compile metrics surfaced alongside the graph handle.
#[derive(Debug, Clone, Serialize)]
pub struct CompileMetrics {
  pub duration_ms: u64,
  pub node_count: usize,
  pub connection_count: usize,
  pub validation: ValidationReport,
  pub connection_stats: PoolStats,
  pub control_flow_stats: ControlFlowStats,
}

/// The executable graph emitted by the compiler.
///
/// Read-only during execution and shared by reference; run-scoped
/// mutation lives entirely in the runtime's `ExecutionState`. Compile
/// the same definition twice to get two independent instances.
#[derive(Debug)]
pub struct CompiledGraph {
  pub nodes: HashMap<String, CompiledNode>,
  /// Node ids in definition order; keeps alias binding deterministic.
  pub node_order: Vec<String>,
  pub control_flow: HashMap<String, ControlFlowWiring>,
  /// Entry node ids that were stripped after wiring.
  pub entry_ids: Vec<String>,
  /// Nodes directly reachable from an entry: the start wiring.
  pub start_nodes: Vec<String>,
  pub terminals: Vec<String>,
  /// Nodes that drain into a terminal: the end wiring.
  pub end_sources: Vec<String>,
  pub successors: HashMap<String, Vec<Successor>>,
  pub synthesized_terminal: bool,
  pub metrics: CompileMetrics,
}

impl CompiledGraph {
  pub fn get(&self, id: &str) -> Option<&CompiledNode> {
    self.nodes.get(id)
  }

  pub fn successors_of(&self, id: &str) -> &[Successor] {
    self.successors.get(id).map(|v| v.as_slice()).unwrap_or(&[])
  }

  pub fn is_terminal(&self, id: &str) -> bool {
    self.terminals.iter().any(|t| t == id)
  }
}
