use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A version conflict occurred when writing a record.
    /// The expected version did not match the stored version.
    #[error(
        "Version conflict for {collection}/{key}: expected version {expected}, found {actual}"
    )]
    VersionConflict {
        collection: String,
        key: String,
        expected: Version,
        actual: Version,
    },

    /// The record was not found in the store.
    #[error("Record not found: {collection}/{key}")]
    RecordNotFound { collection: String, key: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
