//! Connection records and the edge-to-binding resolver.

use std::collections::{HashMap, HashSet};
use std::time::SystemTime;

use flowmill_config::EdgeDefinition;
use serde::Serialize;
use tracing::warn;

use crate::error::ConnectionError;
use crate::pool::{ConnectionId, ConnectionPool};

/// One side of a connection: a node and a named handle on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
  pub node: String,
  pub handle: String,
}

impl Endpoint {
  pub fn new(node: impl Into<String>, handle: impl Into<String>) -> Self {
    Self {
      node: node.into(),
      handle: handle.into(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
  Valid,
  Invalid,
  Pending,
  Error,
}

/// A fully parsed, directed handle-to-handle connection.
#[derive(Debug, Clone, Serialize)]
pub struct Connection {
  /// Assigned by the pool on insertion; doubles as insertion order.
  pub id: ConnectionId,
  pub source: Endpoint,
  pub target: Endpoint,
  pub data_type: String,
  pub status: ConnectionStatus,
  pub validation_errors: Vec<String>,
  #[serde(skip)]
  pub created_at: SystemTime,
  pub priority: i32,
}

impl Connection {
  pub fn new(
    source_node: impl Into<String>,
    source_handle: impl Into<String>,
    target_node: impl Into<String>,
    target_handle: impl Into<String>,
    data_type: impl Into<String>,
    priority: i32,
  ) -> Self {
    Self {
      id: 0,
      source: Endpoint::new(source_node, source_handle),
      target: Endpoint::new(target_node, target_handle),
      data_type: data_type.into(),
      status: ConnectionStatus::Valid,
      validation_errors: Vec::new(),
      created_at: SystemTime::now(),
      priority,
    }
  }

  pub fn from_edge(edge: &EdgeDefinition) -> Self {
    Self::new(
      edge.source.clone(),
      edge.source_handle(),
      edge.target.clone(),
      edge.target_handle(),
      edge.data_type(),
      edge.priority,
    )
  }
}

/// What a compiled node's bindings store about one peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
  /// The peer node (source for input bindings, target for output ones).
  pub node: String,
  /// The peer's handle.
  pub handle: String,
  pub data_type: String,
  pub priority: i32,
}

impl ConnectionInfo {
  fn input_side(conn: &Connection) -> Self {
    Self {
      node: conn.source.node.clone(),
      handle: conn.source.handle.clone(),
      data_type: conn.data_type.clone(),
      priority: conn.priority,
    }
  }

  fn output_side(conn: &Connection) -> Self {
    Self {
      node: conn.target.node.clone(),
      handle: conn.target.handle.clone(),
      data_type: conn.data_type.clone(),
      priority: conn.priority,
    }
  }
}

/// A binding that is explicitly single or plural.
///
/// `One` is produced iff exactly one inbound connection targets the
/// handle; consumers never have to re-detect the distinction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
  One(T),
  Many(Vec<T>),
}

impl<T> OneOrMany<T> {
  pub fn len(&self) -> usize {
    match self {
      OneOrMany::One(_) => 1,
      OneOrMany::Many(items) => items.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Normalize a list into the tagged shape: a one-element list
  /// becomes `One`, everything else stays `Many`.
  pub fn from_vec(mut items: Vec<T>) -> Self {
    if items.len() == 1 {
      OneOrMany::One(items.remove(0))
    } else {
      OneOrMany::Many(items)
    }
  }
}

/// Per-node connection bindings: input side is `OneOrMany`, output side
/// is always a list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionMap {
  pub inputs: HashMap<String, OneOrMany<ConnectionInfo>>,
  pub outputs: HashMap<String, Vec<ConnectionInfo>>,
}

/// Parses raw edges into pool-backed connections and per-node maps.
pub struct ConnectionResolver;

impl ConnectionResolver {
  /// Build a pool from raw edges. Duplicate tuples are skipped with a
  /// warning rather than failing the whole parse.
  pub fn build_pool(edges: &[EdgeDefinition]) -> ConnectionPool {
    let mut pool = ConnectionPool::new();
    for edge in edges {
      if let Err(e) = pool.add(Connection::from_edge(edge)) {
        warn!(error = %e, "skipping duplicate edge");
      }
    }
    pool
  }

  /// Build the enhanced, pool-backed connection map for one node.
  ///
  /// Fails when a connection endpoint does not resolve to a known node;
  /// callers fall back to [`ConnectionResolver::basic_map`].
  pub fn connection_map(
    pool: &ConnectionPool,
    node_id: &str,
    known_nodes: &HashSet<String>,
  ) -> Result<ConnectionMap, ConnectionError> {
    let mut map = ConnectionMap::default();

    for handle in pool.inbound_handles(node_id) {
      let conns = pool.inbound(node_id, &handle);
      for conn in &conns {
        if !known_nodes.contains(&conn.source.node) {
          return Err(ConnectionError::UnknownNode(conn.source.node.clone()));
        }
      }
      let infos: Vec<ConnectionInfo> = conns.iter().map(|c| ConnectionInfo::input_side(c)).collect();
      map.inputs.insert(handle, OneOrMany::from_vec(infos));
    }

    for handle in pool.outbound_handles(node_id) {
      let conns = pool.outbound(node_id, &handle);
      for conn in &conns {
        if !known_nodes.contains(&conn.target.node) {
          return Err(ConnectionError::UnknownNode(conn.target.node.clone()));
        }
      }
      let infos: Vec<ConnectionInfo> = conns.iter().map(|c| ConnectionInfo::output_side(c)).collect();
      map.outputs.insert(handle, infos);
    }

    Ok(map)
  }

  /// Degraded one-to-one mapping built straight from the edge list.
  /// The last edge wins per handle. Used when the enhanced mapping
  /// fails for any reason.
  pub fn basic_map(edges: &[EdgeDefinition], node_id: &str) -> ConnectionMap {
    let mut map = ConnectionMap::default();

    for edge in edges {
      if edge.target == node_id {
        map.inputs.insert(
          edge.target_handle().to_string(),
          OneOrMany::One(ConnectionInfo {
            node: edge.source.clone(),
            handle: edge.source_handle().to_string(),
            data_type: edge.data_type().to_string(),
            priority: edge.priority,
          }),
        );
      }
      if edge.source == node_id {
        map.outputs.insert(
          edge.source_handle().to_string(),
          vec![ConnectionInfo {
            node: edge.target.clone(),
            handle: edge.target_handle().to_string(),
            data_type: edge.data_type().to_string(),
            priority: edge.priority,
          }],
        );
      }
    }

    map
  }
}
