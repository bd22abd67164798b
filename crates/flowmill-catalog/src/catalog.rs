use std::collections::HashMap;
use std::sync::Arc;

use flowmill_config::NodeDefinition;

use crate::behavior::NodeBehavior;
use crate::error::CatalogError;
use crate::kind::NodeKind;
use crate::spec::NodeSpec;

/// Constructs node behaviors from raw definitions.
pub trait NodeFactory: Send + Sync {
  /// Static description of the node type this factory produces.
  fn spec(&self) -> &NodeSpec;

  /// Build a behavior instance for one node definition.
  fn create(&self, def: &NodeDefinition) -> Result<Arc<dyn NodeBehavior>, CatalogError>;
}

/// The node type catalog.
///
/// Built once via [`CatalogBuilder`] and read-only afterwards. To pick
/// up new types, build a new catalog and swap it in at the call site;
/// compiled graphs keep the behaviors they were built with.
pub struct NodeCatalog {
  entries: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeCatalog {
  pub fn builder() -> CatalogBuilder {
    CatalogBuilder::default()
  }

  pub fn contains(&self, type_name: &str) -> bool {
    self.entries.contains_key(type_name)
  }

  pub fn get(&self, type_name: &str) -> Option<&Arc<dyn NodeFactory>> {
    self.entries.get(type_name)
  }

  pub fn spec_of(&self, type_name: &str) -> Option<&NodeSpec> {
    self.entries.get(type_name).map(|f| f.spec())
  }

  pub fn kind_of(&self, type_name: &str) -> Option<NodeKind> {
    self.spec_of(type_name).map(|s| s.kind)
  }

  /// All registered type names, sorted for stable error messages.
  pub fn known_types(&self) -> Vec<String> {
    let mut types: Vec<String> = self.entries.keys().cloned().collect();
    types.sort();
    types
  }

  /// Instantiate a node, failing with the list of known types when the
  /// type is not registered.
  pub fn instantiate(&self, def: &NodeDefinition) -> Result<Arc<dyn NodeBehavior>, CatalogError> {
    let factory = self
      .entries
      .get(&def.node_type)
      .ok_or_else(|| CatalogError::UnknownType {
        type_name: def.node_type.clone(),
        known: self.known_types(),
      })?;
    factory.create(def)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// Builder for [`NodeCatalog`]. Later registrations for the same type
/// name replace earlier ones.
#[derive(Default)]
pub struct CatalogBuilder {
  entries: HashMap<String, Arc<dyn NodeFactory>>,
}

impl CatalogBuilder {
  pub fn register(mut self, factory: Arc<dyn NodeFactory>) -> Self {
    let type_name = factory.spec().type_name.clone();
    self.entries.insert(type_name, factory);
    self
  }

  pub fn build(self) -> NodeCatalog {
    NodeCatalog {
      entries: self.entries,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::builtin;

  #[test]
  fn test_builtin_catalog_known_types_sorted() {
    let catalog = builtin::builtin_catalog();
    let known = catalog.known_types();
    let mut sorted = known.clone();
    sorted.sort();
    assert_eq!(known, sorted);
    assert!(catalog.contains("Start"));
    assert!(catalog.contains("End"));
  }

  #[test]
  fn test_unknown_type_lists_known() {
    let catalog = builtin::builtin_catalog();
    let def = NodeDefinition::new("x", "NoSuchType");
    let Err(err) = catalog.instantiate(&def) else {
      panic!("instantiating an unregistered type should fail");
    };
    let message = err.to_string();
    assert!(message.contains("NoSuchType"));
    assert!(message.contains("Echo"));
  }
}
