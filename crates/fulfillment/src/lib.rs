//! Order fulfillment workflows.
//!
//! This crate drives the five consistency components over the domain
//! aggregates:
//! - InventoryLedger: atomic per-(product, warehouse) stock mutations
//! - ReservationManager: all-or-nothing holds with compensating rollback
//! - CheckoutService: idempotent initiation and the payment state machine
//! - EscrowLedger: bounded releases, conditions, disputes
//! - RmaWorkflow: returns through approval, inspection, and resolution
//!
//! plus the TTL sweep and the external collaborator traits (payment
//! processor, policy engine) with in-memory implementations for tests.
//! Contended inventory writes retry on version conflicts up to a bounded
//! budget; external calls are wrapped in timeouts so no checkout is ever
//! left pending forever.

pub mod checkout;
pub mod config;
pub mod error;
pub mod escrow;
pub mod ledger;
pub mod reservations;
pub mod rma;
pub mod services;
pub mod sweeper;

pub use checkout::{CheckoutService, InitiateCheckout};
pub use config::FulfillmentConfig;
pub use error::{FulfillmentError, InsufficientLine};
pub use escrow::EscrowLedger;
pub use ledger::InventoryLedger;
pub use reservations::ReservationManager;
pub use rma::{RmaResolution, RmaWorkflow};
pub use services::payment::{
    InMemoryPaymentProcessor, PaymentIntent, PaymentOutcome, PaymentProcessor, PaymentWebhook,
};
pub use services::policy::{
    CheckoutScreening, InMemoryPolicyEngine, PolicyEngine, ReturnScreening,
};
pub use sweeper::{ExpirySweeper, SweepReport};
