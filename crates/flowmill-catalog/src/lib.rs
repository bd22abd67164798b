//! Flowmill Catalog
//!
//! This crate provides the node catalog: the closed set of node kinds,
//! the [`NodeBehavior`] trait that node implementations fulfil, the
//! [`NodeFactory`] trait that constructs them from raw definitions, and
//! the [`NodeCatalog`] object the compiler resolves type names against.
//!
//! The catalog is built once via [`CatalogBuilder`], is read-only
//! afterwards, and is reloaded by building a new instance. There is no
//! ambient global registry.

mod behavior;
pub mod builtin;
mod catalog;
mod error;
mod kind;
mod spec;

pub use behavior::{NodeBehavior, NodeCall};
pub use catalog::{CatalogBuilder, NodeCatalog, NodeFactory};
pub use error::{BehaviorError, CatalogError};
pub use kind::NodeKind;
pub use spec::{HandleSpec, NodeSpec};
