//! Catalog and behavior error types.

use thiserror::Error;

/// Errors raised while resolving or constructing nodes from the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
  /// The requested type is not registered. Carries the known types so
  /// compile errors can name them.
  #[error("unknown node type '{type_name}' (known types: {})", known.join(", "))]
  UnknownType { type_name: String, known: Vec<String> },

  /// A factory rejected the node's configuration.
  #[error("invalid config for node '{node_id}': {message}")]
  InvalidConfig { node_id: String, message: String },
}

/// Errors raised by a node implementation during invocation.
#[derive(Debug, Error)]
pub enum BehaviorError {
  /// The node failed with a message of its own.
  #[error("{0}")]
  Failed(String),

  /// An input the node requires was missing or had the wrong shape.
  #[error("missing or invalid input '{0}'")]
  BadInput(String),

  /// A blocking entry point was requested on an async-only node, or
  /// vice versa.
  #[error("unsupported invocation style for this node")]
  UnsupportedStyle,
}
