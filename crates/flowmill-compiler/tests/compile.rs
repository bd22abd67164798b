//! Integration tests for the graph compiler using the built-in catalog.

use flowmill_catalog::builtin::builtin_catalog;
use flowmill_compiler::{CompileError, GraphCompiler, SYNTHETIC_TERMINAL_ID};
use flowmill_config::{EdgeDefinition, FlowDefinition, NodeDefinition};
use serde_json::json;

fn compile(flow: &FlowDefinition) -> Result<flowmill_compiler::CompiledGraph, CompileError> {
  let catalog = builtin_catalog();
  GraphCompiler::new(&catalog).build(flow)
}

fn linear_flow() -> FlowDefinition {
  serde_json::from_value(json!({
    "nodes": [
      {"id": "s", "type": "Start"},
      {"id": "a", "type": "Echo"},
      {"id": "e", "type": "End"}
    ],
    "edges": [
      {"source": "s", "target": "a"},
      {"source": "a", "target": "e"}
    ]
  }))
  .unwrap()
}

#[test]
fn test_linear_flow_compiles_without_synthesis() {
  let graph = compile(&linear_flow()).unwrap();
  assert!(!graph.synthesized_terminal);
  assert_eq!(graph.start_nodes, vec!["a"]);
  assert_eq!(graph.terminals, vec!["e"]);
  assert_eq!(graph.end_sources, vec!["a"]);
  // Entry nodes are stripped from the instantiated set.
  assert!(graph.get("s").is_none());
  assert!(graph.get("a").is_some());
  assert!(graph.get("e").is_some());
}

#[test]
fn test_zero_entry_nodes_is_fatal() {
  let flow = FlowDefinition::new(
    vec![NodeDefinition::new("a", "Echo"), NodeDefinition::new("e", "End")],
    vec![EdgeDefinition::new("a", "e")],
  );
  let err = compile(&flow).unwrap_err();
  match err {
    CompileError::Validation { report } => {
      assert!(report.errors.iter().any(|e| e.contains("no entry node")));
    }
    other => panic!("expected validation error, got {other}"),
  }
}

#[test]
fn test_missing_terminal_is_synthesized_and_auto_wired() {
  let flow = FlowDefinition::new(
    vec![
      NodeDefinition::new("s", "Start"),
      NodeDefinition::new("a", "Echo"),
      NodeDefinition::new("b", "Echo"),
    ],
    vec![EdgeDefinition::new("s", "a"), EdgeDefinition::new("s", "b")],
  );
  let graph = compile(&flow).unwrap();
  assert!(graph.synthesized_terminal);
  assert_eq!(graph.terminals, vec![SYNTHETIC_TERMINAL_ID]);
  // Both dangling nodes drain into the synthesized terminal.
  let mut end_sources = graph.end_sources.clone();
  end_sources.sort();
  assert_eq!(end_sources, vec!["a", "b"]);
  assert!(graph.get(SYNTHETIC_TERMINAL_ID).is_some());
}

#[test]
fn test_auto_wiring_skips_nodes_with_outgoing_edges() {
  let flow = FlowDefinition::new(
    vec![
      NodeDefinition::new("s", "Start"),
      NodeDefinition::new("a", "Echo"),
      NodeDefinition::new("b", "Echo"),
    ],
    vec![EdgeDefinition::new("s", "a"), EdgeDefinition::new("a", "b")],
  );
  let graph = compile(&flow).unwrap();
  assert!(graph.synthesized_terminal);
  // Only the dangling chain tail drains into the synthesized terminal.
  assert_eq!(graph.end_sources, vec!["b"]);
  let a_targets: Vec<&str> = graph
    .successors_of("a")
    .iter()
    .map(|s| s.target.as_str())
    .collect();
  assert_eq!(a_targets, vec!["b"]);
}

#[test]
fn test_unknown_type_error_lists_known_types() {
  let flow = FlowDefinition::new(
    vec![
      NodeDefinition::new("s", "Start"),
      NodeDefinition::new("a", "Mystery"),
    ],
    vec![EdgeDefinition::new("s", "a")],
  );
  let err = compile(&flow).unwrap_err();
  let message = err.to_string();
  assert!(message.contains("Mystery"));
}

#[test]
fn test_start_wiring_per_entry_reachable_node() {
  let flow = FlowDefinition::new(
    vec![
      NodeDefinition::new("s", "Start"),
      NodeDefinition::new("a", "Echo"),
      NodeDefinition::new("b", "Echo"),
      NodeDefinition::new("e", "End"),
    ],
    vec![
      EdgeDefinition::new("s", "a"),
      EdgeDefinition::new("s", "b"),
      EdgeDefinition::new("a", "e"),
      EdgeDefinition::new("b", "e"),
    ],
  );
  let graph = compile(&flow).unwrap();
  assert_eq!(graph.start_nodes, vec!["a", "b"]);
  let mut end_sources = graph.end_sources.clone();
  end_sources.sort();
  assert_eq!(end_sources, vec!["a", "b"]);
}

#[test]
fn test_conditional_wiring_compiles() {
  let flow: FlowDefinition = serde_json::from_value(json!({
    "nodes": [
      {"id": "s", "type": "Start"},
      {"id": "c", "type": "Conditional",
       "data": {"condition": {"kind": "equals", "expected": "yes"}}},
      {"id": "t", "type": "Echo"},
      {"id": "f", "type": "Echo"},
      {"id": "e", "type": "End"}
    ],
    "edges": [
      {"source": "s", "target": "c"},
      {"source": "c", "target": "t", "source_handle": "true_output"},
      {"source": "c", "target": "f", "source_handle": "false_output"},
      {"source": "t", "target": "e"},
      {"source": "f", "target": "e"}
    ]
  }))
  .unwrap();
  let graph = compile(&flow).unwrap();
  assert_eq!(graph.metrics.control_flow_stats.conditionals, 1);
  assert!(graph.control_flow.contains_key("c"));
}

#[test]
fn test_conditional_with_one_branch_fails() {
  let flow: FlowDefinition = serde_json::from_value(json!({
    "nodes": [
      {"id": "s", "type": "Start"},
      {"id": "c", "type": "Conditional"},
      {"id": "t", "type": "Echo"},
      {"id": "e", "type": "End"}
    ],
    "edges": [
      {"source": "s", "target": "c"},
      {"source": "c", "target": "t", "source_handle": "true_output"},
      {"source": "t", "target": "e"}
    ]
  }))
  .unwrap();
  let err = compile(&flow).unwrap_err();
  assert!(matches!(err, CompileError::ControlFlow(_)));
}

#[test]
fn test_bad_custom_expression_fails_compile() {
  let flow: FlowDefinition = serde_json::from_value(json!({
    "nodes": [
      {"id": "s", "type": "Start"},
      {"id": "c", "type": "Conditional",
       "data": {"condition": {"kind": "expression", "expression": "__import__('os')"}}},
      {"id": "t", "type": "Echo"},
      {"id": "f", "type": "Echo"},
      {"id": "e", "type": "End"}
    ],
    "edges": [
      {"source": "s", "target": "c"},
      {"source": "c", "target": "t", "source_handle": "true_output"},
      {"source": "c", "target": "f", "source_handle": "false_output"},
      {"source": "t", "target": "e"},
      {"source": "f", "target": "e"}
    ]
  }))
  .unwrap();
  let err = compile(&flow).unwrap_err();
  assert!(matches!(err, CompileError::ControlFlow(_)));
}

#[test]
fn test_compile_does_not_mutate_caller_definition() {
  let flow = FlowDefinition::new(
    vec![
      NodeDefinition::new("s", "Start"),
      NodeDefinition::new("a", "Echo"),
    ],
    vec![EdgeDefinition::new("s", "a")],
  );
  let before = flow.clone();
  compile(&flow).unwrap();
  assert_eq!(flow, before);
}

#[test]
fn test_metrics_are_recorded() {
  let graph = compile(&linear_flow()).unwrap();
  assert_eq!(graph.metrics.node_count, 2);
  assert_eq!(graph.metrics.connection_count, 1);
  assert!(graph.metrics.validation.valid);
}
