use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;

use crate::{Result, StoredRecord, Version};

/// Options for writing a record to the store.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Expected current version of the record for optimistic concurrency
    /// control. If None, no version check is performed (use with caution).
    pub expected_version: Option<Version>,
}

impl PutOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the record to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the record to not exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// A stream of records.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<StoredRecord>> + Send>>;

/// Core trait for record store implementations.
///
/// A record store holds the current state of each entity as a versioned JSON
/// record in a keyed collection. All implementations must be thread-safe
/// (Send + Sync).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Retrieves a record by collection and key.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<StoredRecord>>;

    /// Writes a record, replacing any previous payload.
    ///
    /// If `options.expected_version` is set, the write fails with
    /// `VersionConflict` when the stored version doesn't match. The record's
    /// version becomes `current.next()`; the new version is returned.
    async fn put(
        &self,
        collection: &str,
        key: &str,
        payload: serde_json::Value,
        options: PutOptions,
    ) -> Result<Version>;

    /// Deletes a record.
    ///
    /// Deleting a record that does not exist is a no-op. If
    /// `options.expected_version` is set and the record exists at a different
    /// version, the delete fails with `VersionConflict`.
    async fn delete(&self, collection: &str, key: &str, options: PutOptions) -> Result<()>;

    /// Retrieves all records in a collection.
    ///
    /// Records are returned in key order.
    async fn list(&self, collection: &str) -> Result<Vec<StoredRecord>>;

    /// Streams all records in a collection.
    ///
    /// Used by scans that should not hold the whole collection in memory
    /// (the reservation expiry sweep).
    async fn stream_collection(&self, collection: &str) -> Result<RecordStream>;

    /// Gets the current version of a record.
    ///
    /// Returns None if the record doesn't exist.
    async fn get_version(&self, collection: &str, key: &str) -> Result<Option<Version>>;
}

/// Extension trait providing convenience methods for record stores.
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    /// Checks whether a record exists.
    async fn exists(&self, collection: &str, key: &str) -> Result<bool> {
        Ok(self.get_version(collection, key).await?.is_some())
    }

    /// Serializes a value and writes it as the record payload.
    async fn put_value<T: Serialize + Sync>(
        &self,
        collection: &str,
        key: &str,
        value: &T,
        options: PutOptions,
    ) -> Result<Version> {
        let payload = serde_json::to_value(value)?;
        self.put(collection, key, payload, options).await
    }
}

// Blanket implementation for all RecordStore implementations
impl<T: RecordStore + ?Sized> RecordStoreExt for T {}
