//! Control-flow wiring compilation.
//!
//! Conditional, loop and parallel nodes are compiled into graph
//! constructs, not data transforms: the output here is routing
//! information the runtime consults, keyed by node id.

use std::collections::HashMap;

use flowmill_config::NodeDefinition;
use serde::Serialize;
use tracing::debug;

use crate::condition::ConditionSpec;
use crate::error::ControlFlowError;
use crate::pool::ConnectionPool;

/// Default loop iteration cap when the node config does not set one.
pub const DEFAULT_MAX_ITERATIONS: u64 = 10;

/// Routing for a conditional node.
#[derive(Debug, Clone)]
pub struct ConditionalWiring {
  pub node_id: String,
  /// Branch handle -> target node. Conventionally "true_output" and
  /// "false_output"; symbolic routes are allowed as extra handles.
  pub branches: HashMap<String, String>,
  /// Set when the node has a single plain "output" connection and acts
  /// as an unconditional passthrough.
  pub passthrough: Option<String>,
  pub condition: Option<ConditionSpec>,
}

/// Routing for a loop node: one body edge plus an implicit exit to the
/// terminal sink.
#[derive(Debug, Clone)]
pub struct LoopWiring {
  pub node_id: String,
  pub body: String,
  pub max_iterations: u64,
  pub condition: Option<ConditionSpec>,
}

/// Fan-out targets for a parallel node.
#[derive(Debug, Clone)]
pub struct ParallelWiring {
  pub node_id: String,
  pub branches: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum ControlFlowWiring {
  Conditional(ConditionalWiring),
  Loop(LoopWiring),
  Parallel(ParallelWiring),
}

/// Counts reported in compile metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControlFlowStats {
  pub conditionals: usize,
  pub loops: usize,
  pub parallels: usize,
}

/// Compiles control-flow node definitions into wiring.
pub struct ControlFlowCompiler;

impl ControlFlowCompiler {
  /// Compile all control-flow nodes. `defs` must already be filtered to
  /// control-flow kinds by the caller.
  pub fn compile(
    defs: &[&NodeDefinition],
    pool: &ConnectionPool,
  ) -> Result<(HashMap<String, ControlFlowWiring>, ControlFlowStats), ControlFlowError> {
    let mut wirings = HashMap::new();
    let mut stats = ControlFlowStats::default();

    for def in defs {
      let wiring = match def.node_type.as_str() {
        "Loop" => {
          stats.loops += 1;
          ControlFlowWiring::Loop(Self::compile_loop(def, pool)?)
        }
        "Parallel" => {
          stats.parallels += 1;
          ControlFlowWiring::Parallel(Self::compile_parallel(def, pool)?)
        }
        // Anything else of control-flow kind routes conditionally.
        _ => {
          stats.conditionals += 1;
          ControlFlowWiring::Conditional(Self::compile_conditional(def, pool)?)
        }
      };
      debug!(node_id = %def.id, "compiled control-flow wiring");
      wirings.insert(def.id.clone(), wiring);
    }

    Ok((wirings, stats))
  }

  fn compile_conditional(
    def: &NodeDefinition,
    pool: &ConnectionPool,
  ) -> Result<ConditionalWiring, ControlFlowError> {
    let condition = ConditionSpec::from_config(&def.data).map_err(|message| {
      ControlFlowError::InvalidCondition {
        node_id: def.id.clone(),
        message,
      }
    })?;

    let mut branches: HashMap<String, String> = HashMap::new();
    for conn in pool.outbound_all(&def.id) {
      // First connection wins per handle; branch handles are expected
      // to be distinct.
      branches
        .entry(conn.source.handle.clone())
        .or_insert_with(|| conn.target.node.clone());
    }

    // A single "output" connection is an unconditional passthrough.
    if branches.len() == 1 {
      if let Some(target) = branches.get("output") {
        return Ok(ConditionalWiring {
          node_id: def.id.clone(),
          passthrough: Some(target.clone()),
          branches: HashMap::new(),
          condition,
        });
      }
    }

    if branches.len() < 2 {
      return Err(ControlFlowError::InsufficientBranches {
        node_id: def.id.clone(),
        found: branches.len(),
      });
    }

    Ok(ConditionalWiring {
      node_id: def.id.clone(),
      branches,
      passthrough: None,
      condition,
    })
  }

  fn compile_loop(
    def: &NodeDefinition,
    pool: &ConnectionPool,
  ) -> Result<LoopWiring, ControlFlowError> {
    let body = pool
      .outbound(&def.id, "body")
      .first()
      .map(|c| c.target.node.clone())
      .ok_or_else(|| ControlFlowError::MissingLoopBody {
        node_id: def.id.clone(),
      })?;

    let condition = ConditionSpec::from_config(&def.data).map_err(|message| {
      ControlFlowError::InvalidCondition {
        node_id: def.id.clone(),
        message,
      }
    })?;

    let max_iterations = def
      .data
      .get("max_iterations")
      .and_then(|v| v.as_u64())
      .unwrap_or(DEFAULT_MAX_ITERATIONS);

    Ok(LoopWiring {
      node_id: def.id.clone(),
      body,
      max_iterations,
      condition,
    })
  }

  fn compile_parallel(
    def: &NodeDefinition,
    pool: &ConnectionPool,
  ) -> Result<ParallelWiring, ControlFlowError> {
    let branches: Vec<String> = pool
      .outbound_all(&def.id)
      .iter()
      .map(|c| c.target.node.clone())
      .collect();

    if branches.is_empty() {
      return Err(ControlFlowError::EmptyParallel {
        node_id: def.id.clone(),
      });
    }

    Ok(ParallelWiring {
      node_id: def.id.clone(),
      branches,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::connection::Connection;
  use serde_json::json;

  fn pool_with(edges: &[(&str, &str, &str)]) -> ConnectionPool {
    let mut pool = ConnectionPool::new();
    for (source, handle, target) in edges {
      pool
        .add(Connection::new(*source, *handle, *target, "input", "any", 0))
        .unwrap();
    }
    pool
  }

  #[test]
  fn test_conditional_needs_two_branches() {
    let def = NodeDefinition::new("c", "Conditional");
    let pool = pool_with(&[("c", "true_output", "a")]);
    let err = ControlFlowCompiler::compile(&[&def], &pool).unwrap_err();
    assert!(matches!(err, ControlFlowError::InsufficientBranches { .. }));
  }

  #[test]
  fn test_conditional_two_branches() {
    let def = NodeDefinition::new("c", "Conditional");
    let pool = pool_with(&[("c", "true_output", "a"), ("c", "false_output", "b")]);
    let (wirings, stats) = ControlFlowCompiler::compile(&[&def], &pool).unwrap();
    assert_eq!(stats.conditionals, 1);
    match wirings.get("c") {
      Some(ControlFlowWiring::Conditional(w)) => {
        assert_eq!(w.branches.get("true_output").unwrap(), "a");
        assert_eq!(w.branches.get("false_output").unwrap(), "b");
        assert!(w.passthrough.is_none());
      }
      other => panic!("unexpected wiring {:?}", other),
    }
  }

  #[test]
  fn test_conditional_single_output_is_passthrough() {
    let def = NodeDefinition::new("c", "Conditional");
    let pool = pool_with(&[("c", "output", "a")]);
    let (wirings, _) = ControlFlowCompiler::compile(&[&def], &pool).unwrap();
    match wirings.get("c") {
      Some(ControlFlowWiring::Conditional(w)) => {
        assert_eq!(w.passthrough.as_deref(), Some("a"));
      }
      other => panic!("unexpected wiring {:?}", other),
    }
  }

  #[test]
  fn test_loop_requires_body() {
    let def = NodeDefinition::new("l", "Loop");
    let pool = pool_with(&[("l", "output", "a")]);
    let err = ControlFlowCompiler::compile(&[&def], &pool).unwrap_err();
    assert!(matches!(err, ControlFlowError::MissingLoopBody { .. }));
  }

  #[test]
  fn test_loop_defaults_and_config() {
    let def = NodeDefinition::new("l", "Loop");
    let pool = pool_with(&[("l", "body", "a")]);
    let (wirings, _) = ControlFlowCompiler::compile(&[&def], &pool).unwrap();
    match wirings.get("l") {
      Some(ControlFlowWiring::Loop(w)) => {
        assert_eq!(w.body, "a");
        assert_eq!(w.max_iterations, DEFAULT_MAX_ITERATIONS);
      }
      other => panic!("unexpected wiring {:?}", other),
    }

    let def = NodeDefinition::new("l", "Loop").with_data("max_iterations", json!(3));
    let (wirings, _) = ControlFlowCompiler::compile(&[&def], &pool).unwrap();
    match wirings.get("l") {
      Some(ControlFlowWiring::Loop(w)) => assert_eq!(w.max_iterations, 3),
      other => panic!("unexpected wiring {:?}", other),
    }
  }

  #[test]
  fn test_parallel_fan_out() {
    let def = NodeDefinition::new("p", "Parallel");
    let pool = pool_with(&[("p", "output", "a"), ("p", "branch_b", "b")]);
    let (wirings, stats) = ControlFlowCompiler::compile(&[&def], &pool).unwrap();
    assert_eq!(stats.parallels, 1);
    match wirings.get("p") {
      Some(ControlFlowWiring::Parallel(w)) => {
        let mut branches = w.branches.clone();
        branches.sort();
        assert_eq!(branches, vec!["a", "b"]);
      }
      other => panic!("unexpected wiring {:?}", other),
    }
  }

  #[test]
  fn test_empty_parallel_is_fatal() {
    let def = NodeDefinition::new("p", "Parallel");
    let pool = ConnectionPool::new();
    let err = ControlFlowCompiler::compile(&[&def], &pool).unwrap_err();
    assert!(matches!(err, ControlFlowError::EmptyParallel { .. }));
  }
}
