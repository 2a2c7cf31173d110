use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    Result, StoreError, StoredRecord, Version,
    store::{PutOptions, RecordStore, RecordStream},
};

/// PostgreSQL-backed record store implementation.
///
/// Records live in a single `records` table keyed by (collection, key) with
/// a version column; the version check and the upsert run in one
/// transaction so concurrent writers serialize per record.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Creates a new PostgreSQL record store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<StoredRecord> {
        Ok(StoredRecord {
            collection: row.try_get("collection")?,
            key: row.try_get("key")?,
            version: Version::new(row.try_get("version")?),
            updated_at: row.try_get("updated_at")?,
            payload: row.try_get("payload")?,
        })
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<StoredRecord>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT collection, key, version, updated_at, payload
            FROM records
            WHERE collection = $1 AND key = $2
            "#,
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        payload: serde_json::Value,
        options: PutOptions,
    ) -> Result<Version> {
        let mut tx = self.pool.begin().await?;

        // Lock the current row (if any) so the version check and the write
        // are one atomic step per (collection, key).
        let current: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM records WHERE collection = $1 AND key = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        let actual = Version::new(current.unwrap_or(0));

        if let Some(expected) = options.expected_version
            && actual != expected
        {
            return Err(StoreError::VersionConflict {
                collection: collection.to_string(),
                key: key.to_string(),
                expected,
                actual,
            });
        }

        let new_version = actual.next();

        sqlx::query(
            r#"
            INSERT INTO records (collection, key, version, updated_at, payload)
            VALUES ($1, $2, $3, NOW(), $4)
            ON CONFLICT (collection, key) DO UPDATE SET
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at,
                payload = EXCLUDED.payload
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(new_version.as_i64())
        .bind(&payload)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(new_version)
    }

    async fn delete(&self, collection: &str, key: &str, options: PutOptions) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let current: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM records WHERE collection = $1 AND key = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            return Ok(());
        };

        if let Some(expected) = options.expected_version
            && Version::new(current) != expected
        {
            return Err(StoreError::VersionConflict {
                collection: collection.to_string(),
                key: key.to_string(),
                expected,
                actual: Version::new(current),
            });
        }

        sqlx::query("DELETE FROM records WHERE collection = $1 AND key = $2")
            .bind(collection)
            .bind(key)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT collection, key, version, updated_at, payload
            FROM records
            WHERE collection = $1
            ORDER BY key ASC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn stream_collection(&self, collection: &str) -> Result<RecordStream> {
        use futures_util::StreamExt;

        let stream = sqlx::query(
            r#"
            SELECT collection, key, version, updated_at, payload
            FROM records
            WHERE collection = $1
            ORDER BY key ASC
            "#,
        )
        .bind(collection.to_string())
        .fetch(&self.pool)
        .map(|result| match result {
            Ok(row) => Self::row_to_record(row),
            Err(e) => Err(StoreError::Database(e)),
        });

        Ok(Box::pin(stream))
    }

    async fn get_version(&self, collection: &str, key: &str) -> Result<Option<Version>> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM records WHERE collection = $1 AND key = $2",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(version.map(Version::new))
    }
}
