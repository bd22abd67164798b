//! Flowmill Compiler
//!
//! Turns a raw [`FlowDefinition`](flowmill_config::FlowDefinition) into
//! an executable [`CompiledGraph`]: structural validation, connection
//! resolution over a priority-ordered pool, control-flow wiring and
//! node instantiation against a [`NodeCatalog`](flowmill_catalog::NodeCatalog).
//!
//! Compile errors are always surfaced whole; a partially compiled graph
//! is never returned. Connection-mapping failures are the one exception
//! to fail-fast: they degrade to a basic one-to-one mapping with a
//! logged warning.

mod compiler;
mod condition;
mod connection;
mod control_flow;
mod error;
mod expr;
mod graph;
mod pool;
mod validation;

pub use compiler::GraphCompiler;
pub use condition::{ConditionKind, ConditionSpec};
pub use connection::{
  Connection, ConnectionInfo, ConnectionMap, ConnectionResolver, ConnectionStatus, Endpoint,
  OneOrMany,
};
pub use control_flow::{
  ConditionalWiring, ControlFlowCompiler, ControlFlowStats, ControlFlowWiring, LoopWiring,
  ParallelWiring, DEFAULT_MAX_ITERATIONS,
};
pub use error::{CompileError, ConnectionError, ControlFlowError};
pub use expr::{Expr, ExprError};
pub use graph::{CompileMetrics, CompiledGraph, CompiledNode, Successor, SYNTHETIC_TERMINAL_ID};
pub use pool::{ConnectionId, ConnectionPool, PoolStats};
pub use validation::{ValidationEngine, ValidationReport};
