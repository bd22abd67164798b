//! Compile-time error taxonomy.

use flowmill_catalog::CatalogError;
use thiserror::Error;

use crate::validation::ValidationReport;

/// Errors that abort compilation.
#[derive(Debug, Error)]
pub enum CompileError {
  /// Structural or semantic validation failed. Carries the full report
  /// (errors, warnings, counts).
  #[error("validation failed: {}", report.errors.join("; "))]
  Validation { report: ValidationReport },

  /// A node references a type the catalog does not know.
  #[error(transparent)]
  Catalog(#[from] CatalogError),

  /// Control-flow wiring could not be compiled.
  #[error(transparent)]
  ControlFlow(#[from] ControlFlowError),

  /// Vertex or marker wiring could not be emitted.
  #[error("graph wiring failed: {0}")]
  Wiring(String),

  /// Any other compile failure, wrapped with the stage it occurred in
  /// and the graph's node/edge counts.
  #[error("graph compilation failed at stage '{stage}' ({node_count} nodes, {edge_count} edges)")]
  Compilation {
    stage: &'static str,
    node_count: usize,
    edge_count: usize,
    #[source]
    source: Box<CompileError>,
  },
}

impl CompileError {
  /// Wrap an error with stage context and graph counts.
  pub fn at_stage(self, stage: &'static str, node_count: usize, edge_count: usize) -> Self {
    CompileError::Compilation {
      stage,
      node_count,
      edge_count,
      source: Box::new(self),
    }
  }
}

/// Control-flow wiring failures. Always fatal at compile time.
#[derive(Debug, Error)]
pub enum ControlFlowError {
  #[error(
    "conditional node '{node_id}' needs at least two outgoing branches on distinct handles (found {found})"
  )]
  InsufficientBranches { node_id: String, found: usize },

  #[error("loop node '{node_id}' has no outgoing 'body' connection")]
  MissingLoopBody { node_id: String },

  #[error("parallel node '{node_id}' has no outgoing connections to fan out to")]
  EmptyParallel { node_id: String },

  #[error("invalid condition on node '{node_id}': {message}")]
  InvalidCondition { node_id: String, message: String },
}

/// Connection bookkeeping failures.
///
/// These never abort compilation on their own; the resolver falls back
/// to basic one-to-one mapping and logs the degradation.
#[derive(Debug, Error)]
pub enum ConnectionError {
  #[error(
    "duplicate connection {source_node}.{source_handle} -> {target_node}.{target_handle}"
  )]
  Duplicate {
    source_node: String,
    source_handle: String,
    target_node: String,
    target_handle: String,
  },

  #[error("connection endpoint references unknown node '{0}'")]
  UnknownNode(String),
}
