//! Built-in node set.
//!
//! A small catalog covering every node kind, used by the CLI and the
//! integration tests. Real deployments register their own factories;
//! nothing in the compiler or runtime depends on these types.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flowmill_config::NodeDefinition;

use crate::behavior::{NodeBehavior, NodeCall};
use crate::catalog::{CatalogBuilder, NodeCatalog, NodeFactory};
use crate::error::{BehaviorError, CatalogError};
use crate::kind::NodeKind;
use crate::spec::{HandleSpec, NodeSpec};

type Constructor =
  Box<dyn Fn(&NodeDefinition) -> Result<Arc<dyn NodeBehavior>, CatalogError> + Send + Sync>;

/// Factory backed by a spec and a construction closure.
struct SimpleFactory {
  spec: NodeSpec,
  make: Constructor,
}

impl NodeFactory for SimpleFactory {
  fn spec(&self) -> &NodeSpec {
    &self.spec
  }

  fn create(&self, def: &NodeDefinition) -> Result<Arc<dyn NodeBehavior>, CatalogError> {
    (self.make)(def)
  }
}

fn factory(spec: NodeSpec, make: Constructor) -> Arc<dyn NodeFactory> {
  Arc::new(SimpleFactory { spec, make })
}

/// Build the built-in catalog.
pub fn builtin_catalog() -> NodeCatalog {
  let shared_memory: Arc<Mutex<HashMap<String, Vec<serde_json::Value>>>> =
    Arc::new(Mutex::new(HashMap::new()));

  CatalogBuilder::default()
    .register(factory(
      NodeSpec::new("Start", NodeKind::Standard)
        .entry()
        .with_name("start"),
      Box::new(|_| Ok(Arc::new(Passthrough))),
    ))
    .register(factory(
      NodeSpec::new("End", NodeKind::Terminator).with_name("end"),
      Box::new(|_| Ok(Arc::new(End))),
    ))
    .register(factory(
      NodeSpec::new("Echo", NodeKind::Standard).with_name("echo"),
      Box::new(|_| Ok(Arc::new(Echo))),
    ))
    .register(factory(
      NodeSpec::new("Template", NodeKind::Provider)
        .with_name("template")
        .with_display_name("Template Provider"),
      Box::new(|_| Ok(Arc::new(Template))),
    ))
    .register(factory(
      NodeSpec::new("BufferMemory", NodeKind::Memory)
        .with_name("buffer_memory")
        .with_inputs(vec![HandleSpec::new("input").required()]),
      {
        let shared = shared_memory.clone();
        Box::new(move |_| Ok(Arc::new(BufferMemory { buffers: shared.clone() })))
      },
    ))
    .register(factory(
      NodeSpec::new("Uppercase", NodeKind::Processor).with_name("uppercase"),
      Box::new(|_| Ok(Arc::new(Uppercase))),
    ))
    .register(factory(
      NodeSpec::new("Concat", NodeKind::Processor).with_name("concat"),
      Box::new(|_| Ok(Arc::new(Concat))),
    ))
    .register(factory(
      NodeSpec::new("Conditional", NodeKind::ControlFlow).with_outputs(vec![
        HandleSpec::new("true_output"),
        HandleSpec::new("false_output"),
      ]),
      Box::new(|_| Ok(Arc::new(Passthrough))),
    ))
    .register(factory(
      NodeSpec::new("Loop", NodeKind::ControlFlow)
        .with_outputs(vec![HandleSpec::new("body")]),
      Box::new(|_| Ok(Arc::new(Passthrough))),
    ))
    .register(factory(
      NodeSpec::new("Parallel", NodeKind::ControlFlow),
      Box::new(|_| Ok(Arc::new(Passthrough))),
    ))
    .build()
}

/// Returns its input unchanged. Also stands in for control-flow nodes,
/// whose data path is identity; their routing lives in the compiled
/// wiring.
struct Passthrough;

#[async_trait]
impl NodeBehavior for Passthrough {
  async fn invoke(&self, call: NodeCall) -> Result<serde_json::Value, BehaviorError> {
    Ok(call.input())
  }
}

/// Terminator: hands back whatever reached it.
struct End;

#[async_trait]
impl NodeBehavior for End {
  async fn invoke(&self, call: NodeCall) -> Result<serde_json::Value, BehaviorError> {
    if !call.previous_output.is_null() {
      Ok(call.previous_output)
    } else {
      Ok(call.input())
    }
  }
}

/// Echoes its input. Token-producing: in streaming mode each
/// whitespace-separated word of a string input becomes one increment.
struct Echo;

#[async_trait]
impl NodeBehavior for Echo {
  async fn invoke(&self, call: NodeCall) -> Result<serde_json::Value, BehaviorError> {
    let value = call.input();
    if let (Some(sink), Some(text)) = (&call.tokens, value.as_str()) {
      for word in text.split_whitespace() {
        let _ = sink.send(word.to_string());
      }
    }
    Ok(value)
  }
}

/// Provider node: emits its (already template-resolved) `template`
/// config entry.
struct Template;

#[async_trait]
impl NodeBehavior for Template {
  async fn invoke(&self, call: NodeCall) -> Result<serde_json::Value, BehaviorError> {
    call
      .config
      .get("template")
      .cloned()
      .ok_or_else(|| BehaviorError::BadInput("template".to_string()))
  }
}

/// Session-scoped append-only buffer.
struct BufferMemory {
  buffers: Arc<Mutex<HashMap<String, Vec<serde_json::Value>>>>,
}

#[async_trait]
impl NodeBehavior for BufferMemory {
  async fn invoke(&self, call: NodeCall) -> Result<serde_json::Value, BehaviorError> {
    let mut buffers = self
      .buffers
      .lock()
      .map_err(|_| BehaviorError::Failed("memory buffer poisoned".to_string()))?;
    let buffer = buffers.entry(call.session_id.clone()).or_default();
    let input = call.input();
    if !input.is_null() {
      buffer.push(input);
    }
    Ok(serde_json::Value::Array(buffer.clone()))
  }
}

/// Sync-flavored processor: runs on a worker thread.
struct Uppercase;

#[async_trait]
impl NodeBehavior for Uppercase {
  fn invoke_blocking(&self, call: NodeCall) -> Result<serde_json::Value, BehaviorError> {
    match call.input() {
      serde_json::Value::String(s) => Ok(serde_json::Value::String(s.to_uppercase())),
      other => Ok(other),
    }
  }

  fn is_blocking(&self) -> bool {
    true
  }
}

/// Async processor: joins its input with the outputs of connected
/// instances into one string.
struct Concat;

#[async_trait]
impl NodeBehavior for Concat {
  async fn invoke(&self, call: NodeCall) -> Result<serde_json::Value, BehaviorError> {
    let mut parts: Vec<String> = Vec::new();
    let input = call.input();
    match input {
      serde_json::Value::Array(items) => {
        parts.extend(items.iter().map(render_fragment));
      }
      serde_json::Value::Null => {}
      other => parts.push(render_fragment(&other)),
    }
    for value in call.connected.values() {
      parts.push(render_fragment(value));
    }
    Ok(serde_json::Value::String(parts.join(" ")))
  }
}

fn render_fragment(value: &serde_json::Value) -> String {
  match value {
    serde_json::Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn call_with_input(value: serde_json::Value) -> NodeCall {
    let mut inputs = serde_json::Map::new();
    inputs.insert("input".to_string(), value);
    NodeCall {
      node_id: "n".to_string(),
      node_type: "t".to_string(),
      config: serde_json::Map::new(),
      inputs,
      connected: serde_json::Map::new(),
      previous_output: serde_json::Value::Null,
      session_id: "s".to_string(),
      credentials: None,
      tokens: None,
    }
  }

  #[tokio::test]
  async fn test_echo_returns_input() {
    let out = Echo.invoke(call_with_input(serde_json::json!("hi"))).await.unwrap();
    assert_eq!(out, serde_json::json!("hi"));
  }

  #[tokio::test]
  async fn test_uppercase_is_blocking() {
    assert!(Uppercase.is_blocking());
    let out = Uppercase
      .invoke_blocking(call_with_input(serde_json::json!("hi")))
      .unwrap();
    assert_eq!(out, serde_json::json!("HI"));
  }

  #[tokio::test]
  async fn test_buffer_memory_is_session_scoped() {
    let memory = BufferMemory {
      buffers: Arc::new(Mutex::new(HashMap::new())),
    };
    let mut call = call_with_input(serde_json::json!("a"));
    call.session_id = "one".to_string();
    memory.invoke(call).await.unwrap();

    let mut call = call_with_input(serde_json::json!("b"));
    call.session_id = "one".to_string();
    let out = memory.invoke(call).await.unwrap();
    assert_eq!(out, serde_json::json!(["a", "b"]));

    let mut call = call_with_input(serde_json::json!("c"));
    call.session_id = "two".to_string();
    let out = memory.invoke(call).await.unwrap();
    assert_eq!(out, serde_json::json!(["c"]));
  }
}
