//! Priority-ordered many-to-many connection store.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::connection::{Connection, ConnectionStatus};
use crate::error::ConnectionError;

pub type ConnectionId = u64;

type HandleKey = (String, String);
type ConnectionKey = (String, String, String, String);

/// Aggregate pool counters, reported in compile metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
  pub total: usize,
  pub inbound_handles: usize,
  pub outbound_handles: usize,
  pub valid: usize,
  pub pending: usize,
  pub invalid: usize,
}

/// Indexed store of connections.
///
/// Connections are keyed by a monotonically increasing id (which also
/// encodes insertion order). Inbound and outbound indexes are keyed by
/// (node, handle); lookups return connections sorted by priority,
/// higher first, with insertion order breaking ties. Duplicate
/// (source, handle, target, handle) tuples are rejected.
#[derive(Debug, Default)]
pub struct ConnectionPool {
  connections: HashMap<ConnectionId, Connection>,
  keys: HashSet<ConnectionKey>,
  inbound: HashMap<HandleKey, Vec<ConnectionId>>,
  outbound: HashMap<HandleKey, Vec<ConnectionId>>,
  next_id: ConnectionId,
}

impl ConnectionPool {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a connection, returning its id. Fails on a duplicate key.
  pub fn add(&mut self, mut conn: Connection) -> Result<ConnectionId, ConnectionError> {
    let key = (
      conn.source.node.clone(),
      conn.source.handle.clone(),
      conn.target.node.clone(),
      conn.target.handle.clone(),
    );
    if self.keys.contains(&key) {
      return Err(ConnectionError::Duplicate {
        source_node: key.0,
        source_handle: key.1,
        target_node: key.2,
        target_handle: key.3,
      });
    }

    let id = self.next_id;
    self.next_id += 1;
    conn.id = id;

    self
      .inbound
      .entry((conn.target.node.clone(), conn.target.handle.clone()))
      .or_default()
      .push(id);
    self
      .outbound
      .entry((conn.source.node.clone(), conn.source.handle.clone()))
      .or_default()
      .push(id);
    self.keys.insert(key);
    self.connections.insert(id, conn);
    Ok(id)
  }

  /// Remove a connection by id. Returns whether anything was removed.
  pub fn remove(&mut self, id: ConnectionId) -> bool {
    let Some(conn) = self.connections.remove(&id) else {
      return false;
    };
    self.keys.remove(&(
      conn.source.node.clone(),
      conn.source.handle.clone(),
      conn.target.node.clone(),
      conn.target.handle.clone(),
    ));
    if let Some(ids) = self
      .inbound
      .get_mut(&(conn.target.node.clone(), conn.target.handle.clone()))
    {
      ids.retain(|i| *i != id);
    }
    if let Some(ids) = self
      .outbound
      .get_mut(&(conn.source.node.clone(), conn.source.handle.clone()))
    {
      ids.retain(|i| *i != id);
    }
    true
  }

  /// Inbound connections for (node, handle), priority-sorted.
  pub fn inbound(&self, node: &str, handle: &str) -> Vec<&Connection> {
    self.sorted(&self.inbound, node, handle)
  }

  /// Outbound connections for (node, handle), priority-sorted.
  pub fn outbound(&self, node: &str, handle: &str) -> Vec<&Connection> {
    self.sorted(&self.outbound, node, handle)
  }

  /// All outbound connections for a node across every handle,
  /// priority-sorted per the same rules.
  pub fn outbound_all(&self, node: &str) -> Vec<&Connection> {
    let mut conns: Vec<&Connection> = self
      .outbound
      .iter()
      .filter(|((n, _), _)| n == node)
      .flat_map(|(_, ids)| ids.iter().filter_map(|id| self.connections.get(id)))
      .collect();
    conns.sort_by_key(|c| (std::cmp::Reverse(c.priority), c.id));
    conns
  }

  /// All inbound connections for a node across every handle.
  pub fn inbound_all(&self, node: &str) -> Vec<&Connection> {
    let mut conns: Vec<&Connection> = self
      .inbound
      .iter()
      .filter(|((n, _), _)| n == node)
      .flat_map(|(_, ids)| ids.iter().filter_map(|id| self.connections.get(id)))
      .collect();
    conns.sort_by_key(|c| (std::cmp::Reverse(c.priority), c.id));
    conns
  }

  /// Input handle names with at least one inbound connection for a node.
  pub fn inbound_handles(&self, node: &str) -> Vec<String> {
    let mut handles: Vec<String> = self
      .inbound
      .keys()
      .filter(|(n, _)| n == node)
      .filter(|key| !self.inbound[*key].is_empty())
      .map(|(_, h)| h.clone())
      .collect();
    handles.sort();
    handles
  }

  /// Output handle names with at least one outbound connection for a node.
  pub fn outbound_handles(&self, node: &str) -> Vec<String> {
    let mut handles: Vec<String> = self
      .outbound
      .keys()
      .filter(|(n, _)| n == node)
      .filter(|key| !self.outbound[*key].is_empty())
      .map(|(_, h)| h.clone())
      .collect();
    handles.sort();
    handles
  }

  pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
    self.connections.get(&id)
  }

  pub fn len(&self) -> usize {
    self.connections.len()
  }

  pub fn is_empty(&self) -> bool {
    self.connections.is_empty()
  }

  pub fn stats(&self) -> PoolStats {
    let mut stats = PoolStats {
      total: self.connections.len(),
      inbound_handles: self.inbound.values().filter(|v| !v.is_empty()).count(),
      outbound_handles: self.outbound.values().filter(|v| !v.is_empty()).count(),
      ..Default::default()
    };
    for conn in self.connections.values() {
      match conn.status {
        ConnectionStatus::Valid => stats.valid += 1,
        ConnectionStatus::Pending => stats.pending += 1,
        ConnectionStatus::Invalid | ConnectionStatus::Error => stats.invalid += 1,
      }
    }
    stats
  }

  pub fn clear(&mut self) {
    self.connections.clear();
    self.keys.clear();
    self.inbound.clear();
    self.outbound.clear();
  }

  fn sorted(
    &self,
    index: &HashMap<HandleKey, Vec<ConnectionId>>,
    node: &str,
    handle: &str,
  ) -> Vec<&Connection> {
    let mut conns: Vec<&Connection> = index
      .get(&(node.to_string(), handle.to_string()))
      .map(|ids| ids.iter().filter_map(|id| self.connections.get(id)).collect())
      .unwrap_or_default();
    // Higher priority first; ids are insertion-ordered so they break ties.
    conns.sort_by_key(|c| (std::cmp::Reverse(c.priority), c.id));
    conns
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::connection::Connection;

  fn conn(source: &str, target: &str, priority: i32) -> Connection {
    Connection::new(source, "output", target, "input", "any", priority)
  }

  #[test]
  fn test_duplicate_key_rejected() {
    let mut pool = ConnectionPool::new();
    pool.add(conn("a", "b", 0)).unwrap();
    let err = pool.add(conn("a", "b", 5)).unwrap_err();
    assert!(matches!(err, ConnectionError::Duplicate { .. }));
    assert_eq!(pool.len(), 1);
  }

  #[test]
  fn test_remove_exactly_once() {
    let mut pool = ConnectionPool::new();
    let id = pool.add(conn("a", "b", 0)).unwrap();
    assert_eq!(pool.len(), 1);
    assert!(pool.remove(id));
    assert_eq!(pool.len(), 0);
    assert!(!pool.remove(id));
    // The key is free again after removal.
    pool.add(conn("a", "b", 0)).unwrap();
  }

  #[test]
  fn test_priority_order_with_insertion_ties() {
    let mut pool = ConnectionPool::new();
    pool.add(conn("x", "t", 0)).unwrap();
    pool.add(conn("y", "t", 5)).unwrap();
    pool.add(conn("z", "t", 0)).unwrap();

    let inbound = pool.inbound("t", "input");
    let order: Vec<&str> = inbound.iter().map(|c| c.source.node.as_str()).collect();
    assert_eq!(order, vec!["y", "x", "z"]);
  }

  #[test]
  fn test_stats_and_clear() {
    let mut pool = ConnectionPool::new();
    pool.add(conn("a", "b", 0)).unwrap();
    pool.add(conn("a", "c", 0)).unwrap();
    let stats = pool.stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.valid, 2);
    pool.clear();
    assert!(pool.is_empty());
    assert_eq!(pool.stats().total, 0);
  }
}
