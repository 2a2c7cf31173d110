//! Route handlers and shared application state.

pub mod checkouts;
pub mod escrows;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod rmas;

use fulfillment::{
    CheckoutService, EscrowLedger, InMemoryPaymentProcessor, InMemoryPolicyEngine,
    InventoryLedger, ReservationManager, RmaWorkflow,
};
use record_store::RecordStore;

/// Shared application state accessible from all handlers.
pub struct AppState<S: RecordStore + Clone> {
    pub checkouts: CheckoutService<S, InMemoryPaymentProcessor, InMemoryPolicyEngine>,
    pub reservations: ReservationManager<S>,
    pub ledger: InventoryLedger<S>,
    pub escrow: EscrowLedger<S>,
    pub rmas: RmaWorkflow<S, InMemoryPolicyEngine>,
    pub payments: InMemoryPaymentProcessor,
}
