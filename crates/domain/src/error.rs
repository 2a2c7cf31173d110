//! Domain error types.

use record_store::StoreError;
use thiserror::Error;

/// Errors that can occur while loading or persisting entities.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the record store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Entity not found.
    #[error("Entity not found: {collection} with key {key}")]
    EntityNotFound {
        collection: &'static str,
        key: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true if this error is a version conflict on write.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, DomainError::Store(StoreError::VersionConflict { .. }))
    }
}
