//! External collaborator seams: credentials and checkpoints.
//!
//! The runtime injects credential data and saves state snapshots but
//! owns neither concern. Both collaborators degrade to no-ops when
//! unavailable; neither can fail a run.

use async_trait::async_trait;

use crate::error::CollaboratorError;

/// Resolves a user id to a decrypted credential map. Decryption and
/// storage happen elsewhere; the runtime only injects the result into
/// nodes that declare they need it.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
  async fn resolve(
    &self,
    user_id: &str,
  ) -> Result<serde_json::Map<String, serde_json::Value>, CollaboratorError>;
}

/// Resolves every lookup to an empty credential map.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCredentials;

#[async_trait]
impl CredentialResolver for NoCredentials {
  async fn resolve(
    &self,
    _user_id: &str,
  ) -> Result<serde_json::Map<String, serde_json::Value>, CollaboratorError> {
    Ok(serde_json::Map::new())
  }
}

/// Pluggable save/load sink for serialized execution state, keyed by
/// thread (session) id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
  async fn save(
    &self,
    thread_id: &str,
    state: &serde_json::Value,
  ) -> Result<(), CollaboratorError>;

  /// Latest snapshot for a thread, if one exists.
  async fn load(&self, thread_id: &str) -> Result<Option<serde_json::Value>, CollaboratorError>;
}

/// Stores nothing and remembers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCheckpoints;

#[async_trait]
impl CheckpointStore for NoCheckpoints {
  async fn save(
    &self,
    _thread_id: &str,
    _state: &serde_json::Value,
  ) -> Result<(), CollaboratorError> {
    Ok(())
  }

  async fn load(&self, _thread_id: &str) -> Result<Option<serde_json::Value>, CollaboratorError> {
    Ok(None)
  }
}
