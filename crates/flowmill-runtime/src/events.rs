//! Streaming lifecycle events.
//!
//! One run emits an ordered, one-pass, non-restartable sequence:
//! `RunStarted`, then per node `NodeStarted`/`NodeCompleted` (with
//! `Token` increments in between for token-producing nodes), closed by
//! exactly one of `RunCompleted` or `RunFailed`. Cancellation is
//! caller-driven: stop consuming and cancel the token.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::state::RunOutcome;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  RunStarted {
    execution_id: String,
    session_id: String,
  },
  NodeStarted {
    node_id: String,
    node_type: String,
  },
  NodeCompleted {
    node_id: String,
    /// Truncated rendering of the node's primary output.
    preview: String,
  },
  Token {
    node_id: String,
    token: String,
  },
  RunCompleted {
    execution_id: String,
    outcome: RunOutcome,
  },
  RunFailed {
    execution_id: String,
    error: String,
    error_type: String,
  },
}

/// Sink for lifecycle events. Implementations must be cheap and
/// non-blocking; the runtime calls them inline between node steps.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);

  /// When true the runtime wires a token sink into every node call.
  fn wants_tokens(&self) -> bool {
    false
  }
}

/// Discards every event. Run-to-completion mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Forwards events into an unbounded channel. A dropped receiver is
/// treated as the consumer walking away, not an error.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self { sender }, receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    let _ = self.sender.send(event);
  }

  fn wants_tokens(&self) -> bool {
    true
  }
}

/// Render a short preview of a value for `NodeCompleted` events.
pub(crate) fn preview(value: &serde_json::Value) -> String {
  let rendered = match value {
    serde_json::Value::String(s) => s.clone(),
    other => other.to_string(),
  };
  if rendered.len() > 120 {
    let cut = rendered
      .char_indices()
      .take_while(|(i, _)| *i < 120)
      .last()
      .map(|(i, c)| i + c.len_utf8())
      .unwrap_or(0);
    format!("{}…", &rendered[..cut])
  } else {
    rendered
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_preview_truncates_long_values() {
    let long = "x".repeat(500);
    let p = preview(&json!(long));
    assert!(p.len() < 500);
    assert!(p.ends_with('…'));
  }

  #[test]
  fn test_channel_notifier_delivers_in_order() {
    let (notifier, mut rx) = ChannelNotifier::new();
    notifier.notify(ExecutionEvent::NodeStarted {
      node_id: "a".to_string(),
      node_type: "Echo".to_string(),
    });
    notifier.notify(ExecutionEvent::NodeCompleted {
      node_id: "a".to_string(),
      preview: "hi".to_string(),
    });
    assert!(matches!(
      rx.try_recv().unwrap(),
      ExecutionEvent::NodeStarted { .. }
    ));
    assert!(matches!(
      rx.try_recv().unwrap(),
      ExecutionEvent::NodeCompleted { .. }
    ));
  }
}
