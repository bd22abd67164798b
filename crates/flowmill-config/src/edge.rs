use serde::{Deserialize, Serialize};

use crate::{DEFAULT_DATA_TYPE, DEFAULT_SOURCE_HANDLE, DEFAULT_TARGET_HANDLE};

/// A raw directed edge between two node handles.
///
/// Handles and data type are optional on the wire; accessors apply the
/// documented defaults ("output", "input", "any").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
  pub source: String,
  pub target: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_handle: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target_handle: Option<String>,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub data_type: Option<String>,
  /// Connection priority; higher wins during input aggregation.
  #[serde(default)]
  pub priority: i32,
}

impl EdgeDefinition {
  pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      source: source.into(),
      target: target.into(),
      source_handle: None,
      target_handle: None,
      data_type: None,
      priority: 0,
    }
  }

  pub fn with_handles(
    mut self,
    source_handle: impl Into<String>,
    target_handle: impl Into<String>,
  ) -> Self {
    self.source_handle = Some(source_handle.into());
    self.target_handle = Some(target_handle.into());
    self
  }

  pub fn source_handle(&self) -> &str {
    self.source_handle.as_deref().unwrap_or(DEFAULT_SOURCE_HANDLE)
  }

  pub fn target_handle(&self) -> &str {
    self.target_handle.as_deref().unwrap_or(DEFAULT_TARGET_HANDLE)
  }

  pub fn data_type(&self) -> &str {
    self.data_type.as_deref().unwrap_or(DEFAULT_DATA_TYPE)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_edge_defaults() {
    let edge: EdgeDefinition = serde_json::from_str(r#"{"source":"a","target":"b"}"#).unwrap();
    assert_eq!(edge.source_handle(), "output");
    assert_eq!(edge.target_handle(), "input");
    assert_eq!(edge.data_type(), "any");
  }

  #[test]
  fn test_edge_explicit_handles() {
    let edge: EdgeDefinition = serde_json::from_str(
      r#"{"source":"a","target":"b","source_handle":"true_output","target_handle":"in","type":"string"}"#,
    )
    .unwrap();
    assert_eq!(edge.source_handle(), "true_output");
    assert_eq!(edge.target_handle(), "in");
    assert_eq!(edge.data_type(), "string");
  }
}
