//! Structural and semantic validation of raw flow definitions.
//!
//! Errors block compilation; warnings never do.

use std::collections::{HashMap, HashSet};

use flowmill_catalog::{NodeCatalog, NodeKind};
use flowmill_config::FlowDefinition;
use serde::Serialize;

/// Outcome of validating a flow definition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
  pub valid: bool,
  pub errors: Vec<String>,
  pub warnings: Vec<String>,
  pub node_count: usize,
  pub connection_count: usize,
}

impl ValidationReport {
  fn error(&mut self, message: impl Into<String>) {
    self.errors.push(message.into());
  }

  fn warn(&mut self, message: impl Into<String>) {
    self.warnings.push(message.into());
  }
}

/// Fan-in thresholds beyond which validation warns.
const MAX_FAN_IN_GENERIC: usize = 10;
const MAX_FAN_IN_MEMORY: usize = 5;
const MAX_FAN_IN_PROCESSOR: usize = 3;

/// Validates node and edge lists against the catalog.
pub struct ValidationEngine<'a> {
  catalog: &'a NodeCatalog,
}

impl<'a> ValidationEngine<'a> {
  pub fn new(catalog: &'a NodeCatalog) -> Self {
    Self { catalog }
  }

  pub fn validate(&self, flow: &FlowDefinition) -> ValidationReport {
    let mut report = ValidationReport {
      node_count: flow.nodes.len(),
      connection_count: flow.edges.len(),
      ..Default::default()
    };

    self.check_nodes(flow, &mut report);
    self.check_edges(flow, &mut report);
    self.check_entry_and_terminal(flow, &mut report);
    self.check_isolated(flow, &mut report);
    self.check_cycles(flow, &mut report);
    self.check_fan_in(flow, &mut report);

    report.valid = report.errors.is_empty();
    report
  }

  fn check_nodes(&self, flow: &FlowDefinition, report: &mut ValidationReport) {
    let mut seen: HashSet<&str> = HashSet::new();
    for node in &flow.nodes {
      if node.id.is_empty() {
        report.error("node with empty id");
        continue;
      }
      if node.node_type.is_empty() {
        report.error(format!("node '{}' has no type", node.id));
        continue;
      }
      if !seen.insert(node.id.as_str()) {
        report.error(format!("duplicate node id '{}'", node.id));
      }
      if !self.catalog.contains(&node.node_type) {
        report.error(format!(
          "node '{}' has unknown type '{}'",
          node.id, node.node_type
        ));
      }
    }
  }

  /// Edges must reference existing node ids.
  fn check_edges(&self, flow: &FlowDefinition, report: &mut ValidationReport) {
    let ids: HashSet<&str> = flow.nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in &flow.edges {
      if !ids.contains(edge.source.as_str()) {
        report.error(format!("edge references missing source node '{}'", edge.source));
      }
      if !ids.contains(edge.target.as_str()) {
        report.error(format!("edge references missing target node '{}'", edge.target));
      }
    }
  }

  fn check_entry_and_terminal(&self, flow: &FlowDefinition, report: &mut ValidationReport) {
    let entries = flow
      .nodes
      .iter()
      .filter(|n| {
        self
          .catalog
          .spec_of(&n.node_type)
          .is_some_and(|s| s.entry)
      })
      .count();
    if entries == 0 {
      report.error("flow has no entry node");
    }

    let terminals = flow
      .nodes
      .iter()
      .filter(|n| self.catalog.kind_of(&n.node_type) == Some(NodeKind::Terminator))
      .count();
    if terminals == 0 {
      report.warn("flow has no terminal node; one will be synthesized");
    }
  }

  /// Nodes with no edges at all, excluding entry and terminal kinds.
  fn check_isolated(&self, flow: &FlowDefinition, report: &mut ValidationReport) {
    let mut connected: HashSet<&str> = HashSet::new();
    for edge in &flow.edges {
      connected.insert(edge.source.as_str());
      connected.insert(edge.target.as_str());
    }
    for node in &flow.nodes {
      let spec = self.catalog.spec_of(&node.node_type);
      let exempt = spec.is_some_and(|s| s.entry || s.kind.is_boundary());
      if !exempt && !connected.contains(node.id.as_str()) {
        report.warn(format!("node '{}' is isolated (no edges)", node.id));
      }
    }
  }

  /// DFS cycle detection. Cycles are a warning only; loops are
  /// expressed as ordinary back-edges around a Loop node.
  fn check_cycles(&self, flow: &FlowDefinition, report: &mut ValidationReport) {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &flow.edges {
      adjacency
        .entry(edge.source.as_str())
        .or_default()
        .push(edge.target.as_str());
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
      InProgress,
      Done,
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut found = false;

    fn visit<'s>(
      id: &'s str,
      adjacency: &HashMap<&'s str, Vec<&'s str>>,
      marks: &mut HashMap<&'s str, Mark>,
      found: &mut bool,
    ) {
      match marks.get(id) {
        Some(Mark::Done) => return,
        Some(Mark::InProgress) => {
          *found = true;
          return;
        }
        None => {}
      }
      marks.insert(id, Mark::InProgress);
      if let Some(next) = adjacency.get(id) {
        for target in next {
          visit(target, adjacency, marks, found);
        }
      }
      marks.insert(id, Mark::Done);
    }

    for node in &flow.nodes {
      visit(node.id.as_str(), &adjacency, &mut marks, &mut found);
    }

    if found {
      report.warn("flow contains a cycle");
    }
  }

  /// Many-to-many checks over edges grouped by (target, target handle).
  fn check_fan_in(&self, flow: &FlowDefinition, report: &mut ValidationReport) {
    let mut groups: HashMap<(String, String), Vec<&flowmill_config::EdgeDefinition>> =
      HashMap::new();
    for edge in &flow.edges {
      groups
        .entry((edge.target.clone(), edge.target_handle().to_string()))
        .or_default()
        .push(edge);
    }

    for ((target, handle), edges) in groups {
      if edges.len() < 2 {
        continue;
      }

      let types: HashSet<&str> = edges
        .iter()
        .map(|e| e.data_type())
        .filter(|t| *t != "any")
        .collect();
      if types.len() > 1 {
        report.warn(format!(
          "handle '{}.{}' receives mixed data types ({:?})",
          target, handle, types
        ));
      }

      let limit = match flow
        .get_node(&target)
        .and_then(|n| self.catalog.kind_of(&n.node_type))
      {
        Some(NodeKind::Memory) => MAX_FAN_IN_MEMORY,
        Some(NodeKind::Processor) => MAX_FAN_IN_PROCESSOR,
        _ => MAX_FAN_IN_GENERIC,
      };
      if edges.len() > limit {
        report.warn(format!(
          "handle '{}.{}' has {} inbound connections (limit {})",
          target,
          handle,
          edges.len(),
          limit
        ));
      }

      let mut sources: HashSet<&str> = HashSet::new();
      for edge in &edges {
        if !sources.insert(edge.source.as_str()) {
          report.warn(format!(
            "handle '{}.{}' has duplicate source '{}'",
            target, handle, edge.source
          ));
        }
        if edge.source == target {
          report.warn(format!(
            "handle '{}.{}' has a self-referencing source",
            target, handle
          ));
        }
      }

      let handles: HashSet<&str> = edges.iter().map(|e| e.source_handle()).collect();
      if handles.len() > 1 {
        report.warn(format!(
          "handle '{}.{}' is fed from inconsistently named source handles ({:?})",
          target, handle, handles
        ));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use flowmill_catalog::builtin::builtin_catalog;
  use flowmill_config::{EdgeDefinition, NodeDefinition};

  fn simple_flow() -> FlowDefinition {
    FlowDefinition::new(
      vec![
        NodeDefinition::new("s", "Start"),
        NodeDefinition::new("a", "Echo"),
        NodeDefinition::new("e", "End"),
      ],
      vec![EdgeDefinition::new("s", "a"), EdgeDefinition::new("a", "e")],
    )
  }

  #[test]
  fn test_valid_flow_passes() {
    let catalog = builtin_catalog();
    let report = ValidationEngine::new(&catalog).validate(&simple_flow());
    assert!(report.valid, "errors: {:?}", report.errors);
    assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
    assert_eq!(report.node_count, 3);
    assert_eq!(report.connection_count, 2);
  }

  #[test]
  fn test_missing_entry_is_fatal() {
    let catalog = builtin_catalog();
    let flow = FlowDefinition::new(
      vec![NodeDefinition::new("a", "Echo"), NodeDefinition::new("e", "End")],
      vec![EdgeDefinition::new("a", "e")],
    );
    let report = ValidationEngine::new(&catalog).validate(&flow);
    assert!(!report.valid);
    assert!(report.errors.iter().any(|e| e.contains("no entry node")));
  }

  #[test]
  fn test_missing_terminal_warns_only() {
    let catalog = builtin_catalog();
    let flow = FlowDefinition::new(
      vec![NodeDefinition::new("s", "Start"), NodeDefinition::new("a", "Echo")],
      vec![EdgeDefinition::new("s", "a")],
    );
    let report = ValidationEngine::new(&catalog).validate(&flow);
    assert!(report.valid);
    assert!(report.warnings.iter().any(|w| w.contains("no terminal node")));
  }

  #[test]
  fn test_duplicate_id_and_unknown_type() {
    let catalog = builtin_catalog();
    let flow = FlowDefinition::new(
      vec![
        NodeDefinition::new("s", "Start"),
        NodeDefinition::new("a", "Echo"),
        NodeDefinition::new("a", "Mystery"),
      ],
      vec![],
    );
    let report = ValidationEngine::new(&catalog).validate(&flow);
    assert!(!report.valid);
    assert!(report.errors.iter().any(|e| e.contains("duplicate node id 'a'")));
    assert!(report.errors.iter().any(|e| e.contains("unknown type 'Mystery'")));
  }

  #[test]
  fn test_edge_to_missing_node_is_fatal() {
    let catalog = builtin_catalog();
    let mut flow = simple_flow();
    flow.edges.push(EdgeDefinition::new("a", "ghost"));
    let report = ValidationEngine::new(&catalog).validate(&flow);
    assert!(!report.valid);
    assert!(report.errors.iter().any(|e| e.contains("ghost")));
  }

  #[test]
  fn test_cycle_warns_only() {
    let catalog = builtin_catalog();
    let mut flow = simple_flow();
    flow.edges.push(EdgeDefinition::new("e", "a"));
    let report = ValidationEngine::new(&catalog).validate(&flow);
    assert!(report.valid);
    assert!(report.warnings.iter().any(|w| w.contains("cycle")));
  }

  #[test]
  fn test_processor_fan_in_threshold() {
    let catalog = builtin_catalog();
    let mut nodes = vec![
      NodeDefinition::new("s", "Start"),
      NodeDefinition::new("p", "Uppercase"),
      NodeDefinition::new("e", "End"),
    ];
    let mut edges = vec![EdgeDefinition::new("s", "p"), EdgeDefinition::new("p", "e")];
    for i in 0..4 {
      let id = format!("src{}", i);
      nodes.push(NodeDefinition::new(id.clone(), "Echo"));
      edges.push(EdgeDefinition::new("s", id.clone()));
      edges.push(EdgeDefinition::new(id, "p"));
    }
    let flow = FlowDefinition::new(nodes, edges);
    let report = ValidationEngine::new(&catalog).validate(&flow);
    assert!(report.valid);
    assert!(
      report
        .warnings
        .iter()
        .any(|w| w.contains("inbound connections (limit 3)")),
      "warnings: {:?}",
      report.warnings
    );
  }
}
