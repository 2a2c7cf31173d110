//! Reservation: a temporary multi-line hold on inventory with an expiry.

use chrono::{DateTime, Duration, Utc};
use common::RecordId;
use record_store::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::Entity;
use crate::types::{ProductId, StockKey, WarehouseId};

/// The state of a reservation in its lifecycle.
///
/// State transitions:
/// ```text
/// Held ──┬──► Released   (checkout failed/abandoned, rollback)
///        ├──► Consumed   (checkout completed)
///        └──► Expired    (TTL sweep)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Units are held against the inventory's reserved count.
    #[default]
    Held,

    /// Units were returned to availability.
    Released,

    /// Units were converted into a permanent on-hand decrement.
    Consumed,

    /// The TTL elapsed before the checkout completed; units returned.
    Expired,
}

impl ReservationStatus {
    /// Returns true if the reservation still holds units.
    pub fn is_held(&self) -> bool {
        matches!(self, ReservationStatus::Held)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !self.is_held()
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Held => "held",
            ReservationStatus::Released => "released",
            ReservationStatus::Consumed => "consumed",
            ReservationStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur on reservation transitions.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// The reservation is not in a state that allows the transition.
    #[error("Invalid reservation transition: cannot {action} from {current} state")]
    InvalidTransition {
        current: ReservationStatus,
        action: &'static str,
    },
}

/// One reserved line: quantity of a product at a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLine {
    /// The reserved product.
    pub product_id: ProductId,

    /// The warehouse the units are held at.
    pub warehouse_id: WarehouseId,

    /// Units held.
    pub quantity: u32,
}

impl ReservationLine {
    /// Creates a reservation line.
    pub fn new(
        product_id: impl Into<ProductId>,
        warehouse_id: impl Into<WarehouseId>,
        quantity: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            warehouse_id: warehouse_id.into(),
            quantity,
        }
    }

    /// Returns the (product, warehouse) key for this line.
    pub fn stock_key(&self) -> StockKey {
        StockKey {
            product_id: self.product_id.clone(),
            warehouse_id: self.warehouse_id.clone(),
        }
    }
}

/// A hold on inventory tied to one in-progress checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation identifier.
    id: RecordId,

    /// The checkout this reservation belongs to.
    checkout_id: RecordId,

    /// The held lines.
    lines: Vec<ReservationLine>,

    /// Current lifecycle status.
    status: ReservationStatus,

    /// When the hold was taken.
    reserved_at: DateTime<Utc>,

    /// When the hold lapses unless the checkout completes first.
    expires_at: DateTime<Utc>,

    /// Stored version for optimistic concurrency.
    #[serde(default)]
    version: Version,
}

impl Entity for Reservation {
    fn collection() -> &'static str {
        "reservations"
    }

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

// Query methods
impl Reservation {
    /// Returns the reservation ID.
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Returns the owning checkout ID.
    pub fn checkout_id(&self) -> RecordId {
        self.checkout_id
    }

    /// Returns the held lines.
    pub fn lines(&self) -> &[ReservationLine] {
        &self.lines
    }

    /// Returns the current status.
    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    /// Returns when the hold was taken.
    pub fn reserved_at(&self) -> DateTime<Utc> {
        self.reserved_at
    }

    /// Returns when the hold lapses.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the hold has lapsed relative to `now` and is still
    /// held.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status.is_held() && now >= self.expires_at
    }
}

// Transitions
impl Reservation {
    /// Creates a held reservation for a checkout.
    pub fn new(
        id: RecordId,
        checkout_id: RecordId,
        lines: Vec<ReservationLine>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id,
            checkout_id,
            lines,
            status: ReservationStatus::Held,
            reserved_at: now,
            expires_at: now + ttl,
            version: Version::initial(),
        }
    }

    /// Pushes the expiry out by `ttl` from `now`.
    ///
    /// Fails if the reservation is no longer held.
    pub fn extend(&mut self, now: DateTime<Utc>, ttl: Duration) -> Result<(), ReservationError> {
        if !self.status.is_held() {
            return Err(ReservationError::InvalidTransition {
                current: self.status,
                action: "extend",
            });
        }
        self.expires_at = now + ttl;
        Ok(())
    }

    /// Marks the reservation released.
    ///
    /// Returns false (without error) if it was not held, so callers can be
    /// idempotent.
    pub fn release(&mut self) -> bool {
        if self.status.is_held() {
            self.status = ReservationStatus::Released;
            true
        } else {
            false
        }
    }

    /// Marks the reservation consumed (checkout completed).
    ///
    /// Unlike release, consuming a non-held reservation is an error: it
    /// would mean a completion raced a release and lost.
    pub fn consume(&mut self) -> Result<(), ReservationError> {
        if !self.status.is_held() {
            return Err(ReservationError::InvalidTransition {
                current: self.status,
                action: "consume",
            });
        }
        self.status = ReservationStatus::Consumed;
        Ok(())
    }

    /// Marks the reservation expired (TTL sweep). Idempotent like release.
    pub fn mark_expired(&mut self) -> bool {
        if self.status.is_held() {
            self.status = ReservationStatus::Expired;
            true
        } else {
            false
        }
    }
}
