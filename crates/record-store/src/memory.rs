use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    Result, StoreError, StoredRecord, Version,
    store::{PutOptions, RecordStore, RecordStream},
};

/// In-memory record store implementation for testing.
///
/// This implementation stores all records in memory and provides the same
/// interface and version-conflict semantics as the PostgreSQL
/// implementation.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<BTreeMap<(String, String), StoredRecord>>>,
}

impl InMemoryRecordStore {
    /// Creates a new empty in-memory record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored across all collections.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns the number of records in one collection.
    pub async fn collection_count(&self, collection: &str) -> usize {
        self.records
            .read()
            .await
            .keys()
            .filter(|(c, _)| c == collection)
            .count()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<StoredRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(collection.to_string(), key.to_string()))
            .cloned())
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        payload: serde_json::Value,
        options: PutOptions,
    ) -> Result<Version> {
        let mut records = self.records.write().await;
        let map_key = (collection.to_string(), key.to_string());

        let current = records
            .get(&map_key)
            .map(|r| r.version)
            .unwrap_or(Version::initial());

        if let Some(expected) = options.expected_version
            && current != expected
        {
            return Err(StoreError::VersionConflict {
                collection: collection.to_string(),
                key: key.to_string(),
                expected,
                actual: current,
            });
        }

        let new_version = current.next();
        records.insert(
            map_key,
            StoredRecord {
                collection: collection.to_string(),
                key: key.to_string(),
                version: new_version,
                updated_at: Utc::now(),
                payload,
            },
        );

        Ok(new_version)
    }

    async fn delete(&self, collection: &str, key: &str, options: PutOptions) -> Result<()> {
        let mut records = self.records.write().await;
        let map_key = (collection.to_string(), key.to_string());

        let Some(existing) = records.get(&map_key) else {
            return Ok(());
        };

        if let Some(expected) = options.expected_version
            && existing.version != expected
        {
            return Err(StoreError::VersionConflict {
                collection: collection.to_string(),
                key: key.to_string(),
                expected,
                actual: existing.version,
            });
        }

        records.remove(&map_key);
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn stream_collection(&self, collection: &str) -> Result<RecordStream> {
        use futures_util::stream;

        let records = self.list(collection).await?;
        let stream = stream::iter(records.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn get_version(&self, collection: &str, key: &str) -> Result<Option<Version>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(collection.to_string(), key.to_string()))
            .map(|r| r.version))
    }
}
