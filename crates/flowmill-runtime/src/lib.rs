//! Flowmill Runtime
//!
//! Drives a [`CompiledGraph`](flowmill_compiler::CompiledGraph) to
//! completion: per-node invocation with config/template/input
//! resolution, many-connection input aggregation, conditional/loop/
//! parallel routing against the compiled wiring, and two execution
//! modes (run-to-completion and streaming lifecycle events).
//!
//! A node failure halts the run immediately with full diagnostic
//! context; the host process never sees a panic.

mod adapter;
mod collaborators;
mod error;
mod events;
mod inputs;
mod runtime;
mod state;
mod template;

pub use collaborators::{CheckpointStore, CredentialResolver, NoCheckpoints, NoCredentials};
pub use error::{CollaboratorError, RuntimeError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use inputs::primary_output;
pub use runtime::{ExecutionRuntime, RunRequest};
pub use state::{ExecutionState, RunOutcome};
