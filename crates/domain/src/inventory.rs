//! Inventory record: stock levels per (product, warehouse) pair.

use record_store::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::Entity;
use crate::types::{ProductId, StockKey, WarehouseId};

/// Stock status derived from availability.
///
/// `Discontinued` is a manual override: derivation never sets it and never
/// clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    /// Available quantity is above the reorder point.
    #[default]
    InStock,

    /// Available quantity is positive but at or below the reorder point.
    LowStock,

    /// Nothing available.
    OutOfStock,

    /// Product withdrawn from sale at this warehouse (manual override).
    Discontinued,
}

impl StockStatus {
    /// Derives the status from availability, preserving a manual
    /// `Discontinued` override.
    ///
    /// `available <= 0` → out of stock; `0 < available <= reorder_point` →
    /// low stock; otherwise in stock.
    pub fn derive(available: i64, reorder_point: i64, current: StockStatus) -> StockStatus {
        if current == StockStatus::Discontinued {
            return StockStatus::Discontinued;
        }
        if available <= 0 {
            StockStatus::OutOfStock
        } else if available <= reorder_point {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::Discontinued => "discontinued",
        }
    }
}

impl std::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur when mutating an inventory record.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Not enough available stock to satisfy a reservation.
    #[error(
        "Insufficient stock for {stock_key}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        stock_key: String,
        requested: u32,
        available: i64,
    },

    /// A release or commit exceeded the reserved quantity. This is a
    /// programmer error; the mutation is rejected in full.
    #[error(
        "Invariant violation for {stock_key}: {action} of {requested} exceeds reserved quantity {reserved}"
    )]
    ExceedsReserved {
        stock_key: String,
        action: &'static str,
        requested: u32,
        reserved: i64,
    },

    /// An on-hand adjustment would drive the count negative.
    #[error(
        "Invariant violation for {stock_key}: adjustment {delta} would drive on-hand {on_hand} negative"
    )]
    NegativeOnHand {
        stock_key: String,
        delta: i64,
        on_hand: i64,
    },
}

/// Stock levels for one (product, warehouse) pair.
///
/// Invariant, re-established after every mutation:
/// `quantity_available == max(0, quantity_on_hand - quantity_reserved)` and
/// `status` is the pure derivation over availability. Counts are only ever
/// mutated through the methods here, never assigned directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRecord {
    /// The product this stock level is for.
    pub product_id: ProductId,

    /// The warehouse holding the stock.
    pub warehouse_id: WarehouseId,

    /// Physical units in the warehouse.
    quantity_on_hand: i64,

    /// Units held by in-flight checkouts.
    quantity_reserved: i64,

    /// Derived: units that can still be promised.
    quantity_available: i64,

    /// Threshold below which the status becomes low stock.
    reorder_point: i64,

    /// Derived status (with manual discontinued override).
    status: StockStatus,

    /// Stored version for optimistic concurrency.
    #[serde(default)]
    version: Version,
}

impl Entity for InventoryRecord {
    fn collection() -> &'static str {
        "inventory"
    }

    fn key(&self) -> String {
        self.stock_key().to_string()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

// Query methods
impl InventoryRecord {
    /// Returns the (product, warehouse) key.
    pub fn stock_key(&self) -> StockKey {
        StockKey {
            product_id: self.product_id.clone(),
            warehouse_id: self.warehouse_id.clone(),
        }
    }

    /// Returns the physical on-hand count.
    pub fn quantity_on_hand(&self) -> i64 {
        self.quantity_on_hand
    }

    /// Returns the reserved count.
    pub fn quantity_reserved(&self) -> i64 {
        self.quantity_reserved
    }

    /// Returns the available count.
    pub fn quantity_available(&self) -> i64 {
        self.quantity_available
    }

    /// Returns the reorder point.
    pub fn reorder_point(&self) -> i64 {
        self.reorder_point
    }

    /// Returns the current status.
    pub fn status(&self) -> StockStatus {
        self.status
    }
}

// Mutations
impl InventoryRecord {
    /// Creates a new inventory record with the given initial on-hand count.
    pub fn new(
        product_id: impl Into<ProductId>,
        warehouse_id: impl Into<WarehouseId>,
        quantity_on_hand: i64,
        reorder_point: i64,
    ) -> Self {
        let mut record = Self {
            product_id: product_id.into(),
            warehouse_id: warehouse_id.into(),
            quantity_on_hand,
            quantity_reserved: 0,
            quantity_available: 0,
            reorder_point,
            status: StockStatus::InStock,
            version: Version::initial(),
        };
        record.recompute();
        record
    }

    /// Holds `quantity` units for an in-flight checkout.
    ///
    /// Fails with `InsufficientStock` if fewer units are available; the
    /// record is unchanged on failure.
    pub fn reserve(&mut self, quantity: u32) -> Result<(), InventoryError> {
        if i64::from(quantity) > self.quantity_available {
            return Err(InventoryError::InsufficientStock {
                stock_key: self.stock_key().to_string(),
                requested: quantity,
                available: self.quantity_available,
            });
        }
        self.quantity_reserved += i64::from(quantity);
        self.recompute();
        Ok(())
    }

    /// Returns `quantity` previously reserved units to availability.
    ///
    /// Releasing more than is reserved is an invariant violation and leaves
    /// the record unchanged.
    pub fn release(&mut self, quantity: u32) -> Result<(), InventoryError> {
        if i64::from(quantity) > self.quantity_reserved {
            return Err(InventoryError::ExceedsReserved {
                stock_key: self.stock_key().to_string(),
                action: "release",
                requested: quantity,
                reserved: self.quantity_reserved,
            });
        }
        self.quantity_reserved -= i64::from(quantity);
        self.recompute();
        Ok(())
    }

    /// Converts `quantity` reserved units into a permanent on-hand
    /// decrement (checkout completion).
    pub fn commit(&mut self, quantity: u32) -> Result<(), InventoryError> {
        if i64::from(quantity) > self.quantity_reserved {
            return Err(InventoryError::ExceedsReserved {
                stock_key: self.stock_key().to_string(),
                action: "commit",
                requested: quantity,
                reserved: self.quantity_reserved,
            });
        }
        self.quantity_reserved -= i64::from(quantity);
        self.quantity_on_hand -= i64::from(quantity);
        self.recompute();
        Ok(())
    }

    /// Adjusts the on-hand count (restock, returns, corrections).
    pub fn adjust_on_hand(&mut self, delta: i64) -> Result<(), InventoryError> {
        let adjusted = self.quantity_on_hand + delta;
        if adjusted < 0 {
            return Err(InventoryError::NegativeOnHand {
                stock_key: self.stock_key().to_string(),
                delta,
                on_hand: self.quantity_on_hand,
            });
        }
        self.quantity_on_hand = adjusted;
        self.recompute();
        Ok(())
    }

    /// Changes the reorder point and re-derives the status.
    pub fn set_reorder_point(&mut self, reorder_point: i64) {
        self.reorder_point = reorder_point;
        self.recompute();
    }

    /// Withdraws the product from sale at this warehouse.
    ///
    /// Sticky until `reinstate` is called; derivation preserves it.
    pub fn discontinue(&mut self) {
        self.status = StockStatus::Discontinued;
    }

    /// Lifts a discontinued override and re-derives the status.
    pub fn reinstate(&mut self) {
        self.status = StockStatus::InStock;
        self.recompute();
    }

    /// Re-establishes the derived fields. Called after every mutation.
    fn recompute(&mut self) {
        self.quantity_available = (self.quantity_on_hand - self.quantity_reserved).max(0);
        self.status = StockStatus::derive(self.quantity_available, self.reorder_point, self.status);
    }

    /// Checks the availability invariant. Used by tests and the ledger's
    /// consistency assertions.
    pub fn invariant_holds(&self) -> bool {
        self.quantity_available == (self.quantity_on_hand - self.quantity_reserved).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(on_hand: i64, reorder_point: i64) -> InventoryRecord {
        InventoryRecord::new("SKU-001", "W1", on_hand, reorder_point)
    }

    #[test]
    fn new_record_derives_available_and_status() {
        let record = record(10, 3);
        assert_eq!(record.quantity_available(), 10);
        assert_eq!(record.status(), StockStatus::InStock);
        assert!(record.invariant_holds());
    }

    #[test]
    fn reserve_decrements_available() {
        let mut record = record(10, 3);
        record.reserve(5).unwrap();

        assert_eq!(record.quantity_on_hand(), 10);
        assert_eq!(record.quantity_reserved(), 5);
        assert_eq!(record.quantity_available(), 5);
        assert_eq!(record.status(), StockStatus::InStock);
        assert!(record.invariant_holds());
    }

    #[test]
    fn reserve_beyond_available_fails_and_leaves_record_unchanged() {
        let mut record = record(10, 3);
        let result = record.reserve(11);

        assert!(matches!(
            result,
            Err(InventoryError::InsufficientStock {
                requested: 11,
                available: 10,
                ..
            })
        ));
        assert_eq!(record.quantity_available(), 10);
        assert_eq!(record.quantity_reserved(), 0);
    }

    #[test]
    fn reserve_to_exactly_zero_is_out_of_stock() {
        let mut record = record(10, 3);
        record.reserve(10).unwrap();

        assert_eq!(record.quantity_available(), 0);
        assert_eq!(record.status(), StockStatus::OutOfStock);
    }

    #[test]
    fn reserve_into_reorder_band_is_low_stock() {
        let mut record = record(10, 3);
        record.reserve(8).unwrap();

        assert_eq!(record.quantity_available(), 2);
        assert_eq!(record.status(), StockStatus::LowStock);
    }

    #[test]
    fn release_returns_units_to_available() {
        let mut record = record(10, 3);
        record.reserve(5).unwrap();
        record.release(5).unwrap();

        assert_eq!(record.quantity_reserved(), 0);
        assert_eq!(record.quantity_available(), 10);
        assert!(record.invariant_holds());
    }

    #[test]
    fn release_beyond_reserved_is_invariant_violation() {
        let mut record = record(10, 3);
        record.reserve(2).unwrap();

        let result = record.release(3);
        assert!(matches!(
            result,
            Err(InventoryError::ExceedsReserved {
                action: "release",
                ..
            })
        ));
        assert_eq!(record.quantity_reserved(), 2);
    }

    #[test]
    fn commit_decrements_both_reserved_and_on_hand() {
        let mut record = record(10, 3);
        record.reserve(4).unwrap();
        record.commit(4).unwrap();

        assert_eq!(record.quantity_on_hand(), 6);
        assert_eq!(record.quantity_reserved(), 0);
        assert_eq!(record.quantity_available(), 6);
        assert!(record.invariant_holds());
    }

    #[test]
    fn commit_beyond_reserved_is_invariant_violation() {
        let mut record = record(10, 3);
        record.reserve(2).unwrap();

        let result = record.commit(3);
        assert!(matches!(
            result,
            Err(InventoryError::ExceedsReserved { action: "commit", .. })
        ));
        assert_eq!(record.quantity_on_hand(), 10);
    }

    #[test]
    fn adjust_on_hand_restocks() {
        let mut record = record(2, 3);
        assert_eq!(record.status(), StockStatus::LowStock);

        record.adjust_on_hand(10).unwrap();
        assert_eq!(record.quantity_on_hand(), 12);
        assert_eq!(record.status(), StockStatus::InStock);
    }

    #[test]
    fn adjust_on_hand_cannot_go_negative() {
        let mut record = record(2, 3);
        let result = record.adjust_on_hand(-3);
        assert!(matches!(result, Err(InventoryError::NegativeOnHand { .. })));
        assert_eq!(record.quantity_on_hand(), 2);
    }

    #[test]
    fn available_floors_at_zero_when_reserved_exceeds_on_hand() {
        let mut record = record(5, 0);
        record.reserve(5).unwrap();
        // Shrink stock below the reserved level (e.g. damaged units written off)
        record.adjust_on_hand(-2).unwrap();

        assert_eq!(record.quantity_on_hand(), 3);
        assert_eq!(record.quantity_reserved(), 5);
        assert_eq!(record.quantity_available(), 0);
        assert!(record.invariant_holds());
    }

    #[test]
    fn discontinued_is_sticky_across_mutations() {
        let mut record = record(10, 3);
        record.discontinue();
        assert_eq!(record.status(), StockStatus::Discontinued);

        record.adjust_on_hand(5).unwrap();
        assert_eq!(record.status(), StockStatus::Discontinued);

        record.reinstate();
        assert_eq!(record.status(), StockStatus::InStock);
    }

    #[test]
    fn derivation_rules() {
        assert_eq!(
            StockStatus::derive(0, 3, StockStatus::InStock),
            StockStatus::OutOfStock
        );
        assert_eq!(
            StockStatus::derive(3, 3, StockStatus::InStock),
            StockStatus::LowStock
        );
        assert_eq!(
            StockStatus::derive(4, 3, StockStatus::OutOfStock),
            StockStatus::InStock
        );
        assert_eq!(
            StockStatus::derive(100, 3, StockStatus::Discontinued),
            StockStatus::Discontinued
        );
    }

    #[test]
    fn entity_key_is_stock_key() {
        let record = record(10, 3);
        assert_eq!(record.key(), "SKU-001@W1");
        assert_eq!(InventoryRecord::collection(), "inventory");
    }

    #[test]
    fn serialization_uses_snake_case_status() {
        let record = record(0, 3);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "out_of_stock");

        let restored: InventoryRecord = serde_json::from_value(json).unwrap();
        assert_eq!(restored.status(), StockStatus::OutOfStock);
    }
}
