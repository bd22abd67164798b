use serde::{Deserialize, Serialize};

use crate::edge::EdgeDefinition;
use crate::node::NodeDefinition;

/// A complete flow definition: the wire format produced by the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
  #[serde(default)]
  pub nodes: Vec<NodeDefinition>,
  #[serde(default)]
  pub edges: Vec<EdgeDefinition>,
}

impl FlowDefinition {
  pub fn new(nodes: Vec<NodeDefinition>, edges: Vec<EdgeDefinition>) -> Self {
    Self { nodes, edges }
  }

  /// Look up a node definition by id.
  pub fn get_node(&self, id: &str) -> Option<&NodeDefinition> {
    self.nodes.iter().find(|n| n.id == id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_wire_format() {
    let flow: FlowDefinition = serde_json::from_str(
      r#"{
        "nodes": [
          {"id": "s", "type": "Start"},
          {"id": "a", "type": "Echo", "data": {"label": "echo it"}}
        ],
        "edges": [
          {"source": "s", "target": "a"}
        ]
      }"#,
    )
    .unwrap();

    assert_eq!(flow.nodes.len(), 2);
    assert_eq!(flow.edges.len(), 1);
    assert_eq!(flow.get_node("a").unwrap().label(), Some("echo it"));
  }
}
