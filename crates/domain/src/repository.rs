//! Generic repository over any record store.

use std::marker::PhantomData;

use record_store::{PutOptions, RecordStore, RecordStoreExt};

use crate::entity::Entity;
use crate::error::DomainError;

/// Typed access to one entity collection.
///
/// The repository is responsible for:
/// 1. Loading an entity and stamping it with the stored version
/// 2. Persisting an entity with an expected-version check
/// 3. Surfacing version conflicts unchanged so callers can retry
///
/// Tests substitute an `InMemoryRecordStore`; production wires a
/// `PostgresRecordStore`. The entity code never sees the difference.
pub struct Repository<S, T>
where
    S: RecordStore,
    T: Entity,
{
    store: S,
    _phantom: PhantomData<T>,
}

impl<S, T> Clone for Repository<S, T>
where
    S: RecordStore + Clone,
    T: Entity,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<S, T> Repository<S, T>
where
    S: RecordStore,
    T: Entity,
{
    /// Creates a new repository backed by the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying record store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an entity by key, returning None if it doesn't exist.
    pub async fn find(&self, key: &str) -> Result<Option<T>, DomainError> {
        let Some(record) = self.store.get(T::collection(), key).await? else {
            return Ok(None);
        };

        let version = record.version;
        let mut entity: T = serde_json::from_value(record.payload)?;
        entity.set_version(version);
        Ok(Some(entity))
    }

    /// Loads an entity by key, failing with `EntityNotFound` if absent.
    pub async fn get(&self, key: &str) -> Result<T, DomainError> {
        self.find(key).await?.ok_or_else(|| DomainError::EntityNotFound {
            collection: T::collection(),
            key: key.to_string(),
        })
    }

    /// Persists a new entity, failing with a version conflict if a record
    /// already exists under its key.
    pub async fn insert(&self, entity: &mut T) -> Result<(), DomainError> {
        let key = entity.key();
        let new_version = self
            .store
            .put_value(T::collection(), &key, entity, PutOptions::expect_new())
            .await?;
        entity.set_version(new_version);
        Ok(())
    }

    /// Persists an entity expecting the version it was loaded at.
    ///
    /// On conflict the stored record is untouched and the caller decides
    /// whether to reload and retry.
    pub async fn save(&self, entity: &mut T) -> Result<(), DomainError> {
        let key = entity.key();
        let expected = entity.version();
        let result = self
            .store
            .put_value(
                T::collection(),
                &key,
                entity,
                PutOptions::expect_version(expected),
            )
            .await;

        match result {
            Ok(new_version) => {
                entity.set_version(new_version);
                Ok(())
            }
            Err(e) => {
                if matches!(e, record_store::StoreError::VersionConflict { .. }) {
                    metrics::counter!("record_version_conflicts_total").increment(1);
                    tracing::debug!(
                        collection = T::collection(),
                        key = %key,
                        expected = %expected,
                        "version conflict on save"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Removes an entity by key. Removing an absent entity is a no-op.
    pub async fn remove(&self, key: &str) -> Result<(), DomainError> {
        self.store
            .delete(T::collection(), key, PutOptions::new())
            .await?;
        Ok(())
    }

    /// Loads every entity in the collection.
    pub async fn list(&self) -> Result<Vec<T>, DomainError> {
        let records = self.store.list(T::collection()).await?;
        let mut entities = Vec::with_capacity(records.len());
        for record in records {
            let version = record.version;
            let mut entity: T = serde_json::from_value(record.payload)?;
            entity.set_version(version);
            entities.push(entity);
        }
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_store::{InMemoryRecordStore, Version};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct Counter {
        name: String,
        value: i64,
        #[serde(default)]
        version: Version,
    }

    impl Entity for Counter {
        fn collection() -> &'static str {
            "counters"
        }

        fn key(&self) -> String {
            self.name.clone()
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }
    }

    fn repo() -> Repository<InMemoryRecordStore, Counter> {
        Repository::new(InMemoryRecordStore::new())
    }

    #[tokio::test]
    async fn insert_and_find() {
        let repo = repo();
        let mut counter = Counter {
            name: "hits".to_string(),
            value: 1,
            version: Version::initial(),
        };

        repo.insert(&mut counter).await.unwrap();
        assert_eq!(counter.version(), Version::first());

        let loaded = repo.find("hits").await.unwrap().unwrap();
        assert_eq!(loaded.value, 1);
        assert_eq!(loaded.version(), Version::first());
    }

    #[tokio::test]
    async fn find_missing_returns_none() {
        let repo = repo();
        assert!(repo.find("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_missing_fails_with_not_found() {
        let repo = repo();
        let result = repo.get("missing").await;
        assert!(matches!(result, Err(DomainError::EntityNotFound { .. })));
    }

    #[tokio::test]
    async fn insert_twice_fails() {
        let repo = repo();
        let mut counter = Counter {
            name: "hits".to_string(),
            value: 1,
            version: Version::initial(),
        };
        repo.insert(&mut counter).await.unwrap();

        let mut duplicate = Counter {
            name: "hits".to_string(),
            value: 2,
            version: Version::initial(),
        };
        let result = repo.insert(&mut duplicate).await;
        assert!(result.unwrap_err().is_version_conflict());
    }

    #[tokio::test]
    async fn save_bumps_version() {
        let repo = repo();
        let mut counter = Counter {
            name: "hits".to_string(),
            value: 1,
            version: Version::initial(),
        };
        repo.insert(&mut counter).await.unwrap();

        counter.value = 2;
        repo.save(&mut counter).await.unwrap();
        assert_eq!(counter.version(), Version::new(2));

        let loaded = repo.get("hits").await.unwrap();
        assert_eq!(loaded.value, 2);
    }

    #[tokio::test]
    async fn stale_save_conflicts_and_leaves_record_untouched() {
        let repo = repo();
        let mut counter = Counter {
            name: "hits".to_string(),
            value: 1,
            version: Version::initial(),
        };
        repo.insert(&mut counter).await.unwrap();

        // Two loads of the same record
        let mut first = repo.get("hits").await.unwrap();
        let mut second = repo.get("hits").await.unwrap();

        first.value = 10;
        repo.save(&mut first).await.unwrap();

        second.value = 20;
        let result = repo.save(&mut second).await;
        assert!(result.unwrap_err().is_version_conflict());

        let loaded = repo.get("hits").await.unwrap();
        assert_eq!(loaded.value, 10);
    }

    #[tokio::test]
    async fn list_returns_all_entities() {
        let repo = repo();
        for (name, value) in [("a", 1), ("b", 2), ("c", 3)] {
            let mut counter = Counter {
                name: name.to_string(),
                value,
                version: Version::initial(),
            };
            repo.insert(&mut counter).await.unwrap();
        }

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|c| c.version() == Version::first()));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let repo = repo();
        let mut counter = Counter {
            name: "hits".to_string(),
            value: 1,
            version: Version::initial(),
        };
        repo.insert(&mut counter).await.unwrap();

        repo.remove("hits").await.unwrap();
        assert!(repo.find("hits").await.unwrap().is_none());
        repo.remove("hits").await.unwrap();
    }
}
