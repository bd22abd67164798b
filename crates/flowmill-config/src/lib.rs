//! Flowmill Config
//!
//! This crate provides the raw, serializable flow definition types.
//! A flow definition is what an external editor produces: a list of
//! nodes and a list of edges between named handles. Nothing here is
//! validated or resolved; that is the compiler's job.

mod edge;
mod flow;
mod node;

pub use edge::EdgeDefinition;
pub use flow::FlowDefinition;
pub use node::NodeDefinition;

/// Handle name used when an edge omits its source handle.
pub const DEFAULT_SOURCE_HANDLE: &str = "output";

/// Handle name used when an edge omits its target handle.
pub const DEFAULT_TARGET_HANDLE: &str = "input";

/// Data type used when an edge omits its data type.
pub const DEFAULT_DATA_TYPE: &str = "any";
