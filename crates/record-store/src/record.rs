use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version number for a stored record, used for optimistic concurrency
/// control.
///
/// Versions start at 1 for the first write and increment by 1 for each
/// subsequent write to the same record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for a record that does not exist yet.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1) assigned by the first write.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A record as held by the store: a JSON payload plus the metadata needed
/// for addressing and optimistic concurrency.
///
/// The payload is the serialized current state of one entity; the store
/// never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// The collection this record belongs to (e.g. "checkouts").
    pub collection: String,

    /// The record key within the collection.
    pub key: String,

    /// The version assigned by the most recent write.
    pub version: Version,

    /// When the record was last written.
    pub updated_at: DateTime<Utc>,

    /// The record payload as JSON.
    pub payload: serde_json::Value,
}

impl StoredRecord {
    /// Creates a record at the given version.
    pub fn new(
        collection: impl Into<String>,
        key: impl Into<String>,
        version: Version,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
            version,
            updated_at: Utc::now(),
            payload,
        }
    }

    /// Deserializes the payload into a concrete type.
    pub fn into_payload<T: for<'de> Deserialize<'de>>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload)
    }

    /// Gets a reference to the payload as JSON.
    pub fn payload_ref(&self) -> &serde_json::Value {
        &self.payload
    }
}
