use serde::{Deserialize, Serialize};

/// A raw node as authored in the editor.
///
/// The `data` map carries node-specific configuration and is passed
/// through to the node factory untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
  pub id: String,
  #[serde(rename = "type")]
  pub node_type: String,
  #[serde(default)]
  pub data: serde_json::Map<String, serde_json::Value>,
}

impl NodeDefinition {
  pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      node_type: node_type.into(),
      data: serde_json::Map::new(),
    }
  }

  /// Attach a config entry, builder style.
  pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
    self.data.insert(key.into(), value);
    self
  }

  /// User-visible label, if the editor assigned one.
  pub fn label(&self) -> Option<&str> {
    self.data.get("label").and_then(|v| v.as_str())
  }
}
