use serde::{Deserialize, Serialize};

use crate::kind::NodeKind;

/// A declared input or output slot on a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleSpec {
  pub name: String,
  #[serde(default)]
  pub required: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<serde_json::Value>,
}

impl HandleSpec {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      required: false,
      default: None,
    }
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn with_default(mut self, default: serde_json::Value) -> Self {
    self.default = Some(default);
    self
  }
}

/// Static description of a node type: its kind, whether it is an entry
/// node, and its declared handles.
///
/// `name` and `display_name` feed template alias resolution; both are
/// optional and fall back to the raw node id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
  pub type_name: String,
  pub kind: NodeKind,
  /// Entry nodes only seed initial state; the compiler strips them
  /// from the instantiated graph after wiring.
  #[serde(default)]
  pub entry: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display_name: Option<String>,
  #[serde(default)]
  pub inputs: Vec<HandleSpec>,
  #[serde(default)]
  pub outputs: Vec<HandleSpec>,
}

impl NodeSpec {
  pub fn new(type_name: impl Into<String>, kind: NodeKind) -> Self {
    Self {
      type_name: type_name.into(),
      kind,
      entry: false,
      name: None,
      display_name: None,
      inputs: vec![HandleSpec::new("input")],
      outputs: vec![HandleSpec::new("output")],
    }
  }

  pub fn entry(mut self) -> Self {
    self.entry = true;
    self
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
    self.display_name = Some(display_name.into());
    self
  }

  pub fn with_inputs(mut self, inputs: Vec<HandleSpec>) -> Self {
    self.inputs = inputs;
    self
  }

  pub fn with_outputs(mut self, outputs: Vec<HandleSpec>) -> Self {
    self.outputs = outputs;
    self
  }
}
