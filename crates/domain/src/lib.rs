//! Domain layer for the fulfillment core.
//!
//! This crate provides the data model the workflow components operate on:
//! - Entity trait and a generic Repository over any RecordStore
//! - InventoryRecord with pure stock-status derivation
//! - Reservation with TTL lifecycle
//! - Checkout aggregate with its payment state machine
//! - Escrow with bounded releases, conditions, and disputes
//! - Rma with attributable transitions and resolution records
//!
//! Aggregates are plain state with explicit transition methods; persistence
//! is a separate, injected concern so every invariant is testable without a
//! database.

pub mod checkout;
pub mod entity;
pub mod error;
pub mod escrow;
pub mod inventory;
pub mod repository;
pub mod reservation;
pub mod rma;
pub mod types;

pub use checkout::{
    CartItem, CartTotals, Checkout, CheckoutError, CheckoutState, ShippingInfo,
};
pub use entity::Entity;
pub use error::DomainError;
pub use escrow::{
    ConditionKind, Dispute, Escrow, EscrowError, EscrowStatus, ReleaseCondition, ReleaseEntry,
};
pub use inventory::{InventoryError, InventoryRecord, StockStatus};
pub use repository::Repository;
pub use reservation::{Reservation, ReservationError, ReservationLine, ReservationStatus};
pub use rma::{
    InspectionReport, ItemCondition, Resolution, ResolutionKind, ReturnLine, Rma, RmaError,
    RmaState, StateTransition,
};
pub use types::{Actor, CustomerId, Money, ProductId, StockKey, WarehouseId};
