//! Keyed, versioned record storage for the fulfillment core.
//!
//! Every entity lives as a JSON record in a named collection, addressed by a
//! string key. Writes carry an expected version so that concurrent mutators
//! of the same record (two checkouts racing for the same inventory row, the
//! sweep racing a completion) fail fast with [`StoreError::VersionConflict`]
//! instead of losing updates.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::RecordId;
pub use error::{Result, StoreError};
pub use memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub use record::{StoredRecord, Version};
pub use store::{PutOptions, RecordStore, RecordStoreExt, RecordStream};
