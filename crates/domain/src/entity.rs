//! Core entity trait for stored aggregates.

use record_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for entities persisted as versioned records.
///
/// An entity is the root of one consistency boundary: an inventory record,
/// a checkout, an escrow. The entity names its collection and its own key;
/// the repository carries the stored version alongside so that every write
/// is an optimistic compare-and-update on that key.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Sized {
    /// Returns the collection name this entity is stored under.
    fn collection() -> &'static str;

    /// Returns the record key for this entity instance.
    ///
    /// Keys must be stable for the lifetime of the entity: the checkout ID,
    /// the rendered (product, warehouse) pair, the RMA number.
    fn key(&self) -> String;

    /// Returns the stored version this instance was loaded at.
    ///
    /// `Version::initial()` for an entity that has not been persisted yet.
    fn version(&self) -> Version;

    /// Sets the stored version.
    ///
    /// Called by the repository after loading or persisting.
    fn set_version(&mut self, version: Version);
}
