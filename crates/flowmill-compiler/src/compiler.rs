//! The compile orchestrator.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use flowmill_catalog::{BehaviorError, NodeBehavior, NodeCall, NodeCatalog, NodeKind};
use flowmill_config::{EdgeDefinition, FlowDefinition, NodeDefinition};
use tracing::{debug, info, warn};

use crate::connection::ConnectionResolver;
use crate::control_flow::ControlFlowCompiler;
use crate::error::CompileError;
use crate::graph::{CompileMetrics, CompiledGraph, CompiledNode, Successor, SYNTHETIC_TERMINAL_ID};
use crate::validation::ValidationEngine;

/// Compiles flow definitions against a node catalog.
///
/// `build` never mutates the caller's definition and never returns a
/// partially compiled graph: every step fails fast except connection
/// mapping, which degrades with a logged warning.
pub struct GraphCompiler<'a> {
  catalog: &'a NodeCatalog,
}

impl<'a> GraphCompiler<'a> {
  pub fn new(catalog: &'a NodeCatalog) -> Self {
    Self { catalog }
  }

  pub fn build(&self, flow: &FlowDefinition) -> Result<CompiledGraph, CompileError> {
    let started = Instant::now();

    // 1. Validate; abort on any error.
    let report = ValidationEngine::new(self.catalog).validate(flow);
    for warning in &report.warnings {
      warn!(warning = %warning, "flow validation warning");
    }
    if !report.valid {
      return Err(CompileError::Validation { report });
    }

    // 2. Work on copies; identify entry and terminal nodes.
    let nodes: Vec<NodeDefinition> = flow.nodes.clone();
    let mut edges: Vec<EdgeDefinition> = flow.edges.clone();

    let entry_ids: Vec<String> = nodes
      .iter()
      .filter(|n| self.is_entry(n))
      .map(|n| n.id.clone())
      .collect();

    let mut terminals: Vec<String> = nodes
      .iter()
      .filter(|n| self.catalog.kind_of(&n.node_type) == Some(NodeKind::Terminator))
      .map(|n| n.id.clone())
      .collect();

    // Synthesize a terminal when none is declared, and auto-wire every
    // node with no other outgoing edge (excluding entries) into it.
    let synthesized_terminal = terminals.is_empty();
    if synthesized_terminal {
      let with_outgoing: HashSet<String> = edges.iter().map(|e| e.source.clone()).collect();
      for node in &nodes {
        if !self.is_entry(node) && !with_outgoing.contains(&node.id) {
          edges.push(EdgeDefinition::new(node.id.clone(), SYNTHETIC_TERMINAL_ID));
        }
      }
      terminals.push(SYNTHETIC_TERMINAL_ID.to_string());
      info!("no terminal node declared; synthesized one");
    }

    // 3. Strip entry nodes but remember what they reach.
    let entry_set: HashSet<&str> = entry_ids.iter().map(|s| s.as_str()).collect();
    let mut start_nodes: Vec<String> = Vec::new();
    for edge in &edges {
      if entry_set.contains(edge.source.as_str())
        && !entry_set.contains(edge.target.as_str())
        && !start_nodes.contains(&edge.target)
      {
        start_nodes.push(edge.target.clone());
      }
    }
    if start_nodes.is_empty() {
      return Err(
        CompileError::Wiring("no node is reachable from an entry node".to_string()).at_stage(
          "start-wiring",
          nodes.len(),
          edges.len(),
        ),
      );
    }

    let kept_defs: Vec<&NodeDefinition> = nodes.iter().filter(|n| !self.is_entry(n)).collect();
    let kept_edges: Vec<EdgeDefinition> = edges
      .iter()
      .filter(|e| {
        !entry_set.contains(e.source.as_str()) && !entry_set.contains(e.target.as_str())
      })
      .cloned()
      .collect();

    // 4. Parse connections over the filtered edge set.
    let pool = ConnectionResolver::build_pool(&kept_edges);

    // 5. Identify control-flow nodes; they are wired, not instantiated.
    let control_defs: Vec<&NodeDefinition> = kept_defs
      .iter()
      .copied()
      .filter(|n| self.catalog.kind_of(&n.node_type) == Some(NodeKind::ControlFlow))
      .collect();
    let (control_flow, control_flow_stats) = ControlFlowCompiler::compile(&control_defs, &pool)?;

    // 6. Instantiate the remaining nodes and apply connection maps.
    let mut known_nodes: HashSet<String> = kept_defs.iter().map(|n| n.id.clone()).collect();
    if synthesized_terminal {
      known_nodes.insert(SYNTHETIC_TERMINAL_ID.to_string());
    }

    let mut compiled: HashMap<String, CompiledNode> = HashMap::new();
    let mut node_order: Vec<String> = Vec::new();

    for def in &kept_defs {
      let kind = self
        .catalog
        .kind_of(&def.node_type)
        .ok_or_else(|| CompileError::Wiring(format!("node '{}' lost its spec", def.id)))?;

      let behavior: Arc<dyn NodeBehavior> = if kind == NodeKind::ControlFlow {
        Arc::new(RoutingOnly)
      } else {
        self.catalog.instantiate(def)?
      };

      let map = match ConnectionResolver::connection_map(&pool, &def.id, &known_nodes) {
        Ok(map) => map,
        Err(e) => {
          warn!(
            node_id = %def.id,
            error = %e,
            "enhanced connection mapping failed; falling back to basic mapping"
          );
          ConnectionResolver::basic_map(&kept_edges, &def.id)
        }
      };

      let spec = self.catalog.spec_of(&def.node_type);
      let needs_credentials = behavior.needs_credentials();
      compiled.insert(
        def.id.clone(),
        CompiledNode {
          id: def.id.clone(),
          type_name: def.node_type.clone(),
          kind,
          label: def.label().map(str::to_string),
          display_name: spec.and_then(|s| s.display_name.clone()),
          name: spec.and_then(|s| s.name.clone()),
          config: def.data.clone(),
          input_bindings: map.inputs,
          output_bindings: map.outputs,
          needs_credentials,
          behavior,
        },
      );
      node_order.push(def.id.clone());
      debug!(node_id = %def.id, kind = %kind, "instantiated node");
    }

    if synthesized_terminal {
      let map = ConnectionResolver::connection_map(&pool, SYNTHETIC_TERMINAL_ID, &known_nodes)
        .unwrap_or_default();
      compiled.insert(
        SYNTHETIC_TERMINAL_ID.to_string(),
        CompiledNode {
          id: SYNTHETIC_TERMINAL_ID.to_string(),
          type_name: "SyntheticTerminal".to_string(),
          kind: NodeKind::Terminator,
          label: None,
          display_name: None,
          name: None,
          config: serde_json::Map::new(),
          input_bindings: map.inputs,
          output_bindings: map.outputs,
          needs_credentials: false,
          behavior: Arc::new(SyntheticTerminal),
        },
      );
      node_order.push(SYNTHETIC_TERMINAL_ID.to_string());
    }

    // 7. Emit wiring: adjacency, start markers, end markers.
    let mut successors: HashMap<String, Vec<Successor>> = HashMap::new();
    for id in &node_order {
      let outgoing: Vec<Successor> = pool
        .outbound_all(id)
        .iter()
        .map(|c| Successor {
          handle: c.source.handle.clone(),
          target: c.target.node.clone(),
        })
        .collect();
      successors.insert(id.clone(), outgoing);
    }

    for start in &start_nodes {
      if !compiled.contains_key(start) {
        return Err(
          CompileError::Wiring(format!("start wiring targets unknown node '{}'", start))
            .at_stage("start-wiring", compiled.len(), kept_edges.len()),
        );
      }
    }

    let mut end_sources: Vec<String> = Vec::new();
    for terminal in &terminals {
      for conn in pool.inbound_all(terminal) {
        if !end_sources.contains(&conn.source.node) {
          end_sources.push(conn.source.node.clone());
        }
      }
    }
    if end_sources.is_empty() {
      // No explicit drain into a terminal: every node without further
      // outgoing edges carries the end marker.
      for id in &node_order {
        let dangling = successors.get(id).is_none_or(|s| s.is_empty());
        if dangling && !terminals.contains(id) {
          end_sources.push(id.clone());
        }
      }
    }

    // 8. Metrics.
    let metrics = CompileMetrics {
      duration_ms: started.elapsed().as_millis() as u64,
      node_count: compiled.len(),
      connection_count: pool.len(),
      validation: report,
      connection_stats: pool.stats(),
      control_flow_stats,
    };

    info!(
      node_count = metrics.node_count,
      connection_count = metrics.connection_count,
      duration_ms = metrics.duration_ms,
      "graph compiled"
    );

    Ok(CompiledGraph {
      nodes: compiled,
      node_order,
      control_flow,
      entry_ids,
      start_nodes,
      terminals,
      end_sources,
      successors,
      synthesized_terminal,
      metrics,
    })
  }

  fn is_entry(&self, node: &NodeDefinition) -> bool {
    self
      .catalog
      .spec_of(&node.node_type)
      .is_some_and(|s| s.entry)
  }
}

/// Stand-in behavior for control-flow nodes: the data path is identity,
/// routing happens in the runtime against the compiled wiring.
struct RoutingOnly;

#[async_trait]
impl NodeBehavior for RoutingOnly {
  async fn invoke(&self, call: NodeCall) -> Result<serde_json::Value, BehaviorError> {
    Ok(call.input())
  }
}

/// Behavior of a synthesized terminal: hand back whatever reached it.
struct SyntheticTerminal;

#[async_trait]
impl NodeBehavior for SyntheticTerminal {
  async fn invoke(&self, call: NodeCall) -> Result<serde_json::Value, BehaviorError> {
    if !call.previous_output.is_null() {
      Ok(call.previous_output)
    } else {
      Ok(call.input())
    }
  }
}
