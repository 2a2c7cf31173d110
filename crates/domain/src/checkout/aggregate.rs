//! Checkout aggregate implementation.

use chrono::{DateTime, Utc};
use common::{IdempotencyKey, RecordId};
use record_store::Version;
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::types::CustomerId;

use super::{CartItem, CartTotals, CheckoutError, CheckoutState, ShippingInfo};

/// Checkout aggregate root.
///
/// Keyed by its own ID; the caller-supplied idempotency key is held here and
/// indexed separately so the same key can never create two checkouts. The
/// cart snapshot is immutable after initiation; only the state, the payment
/// reference, and the failure reason change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkout {
    /// Unique checkout identifier.
    id: RecordId,

    /// The caller-supplied idempotency key this checkout was created under.
    idempotency_key: IdempotencyKey,

    /// The customer checking out.
    customer_id: CustomerId,

    /// Current state of the checkout.
    state: CheckoutState,

    /// Frozen cart snapshot.
    items: Vec<CartItem>,

    /// Computed totals for the snapshot.
    totals: CartTotals,

    /// Shipping details, if collected.
    shipping: Option<ShippingInfo>,

    /// The inventory reservation backing this checkout.
    reservation_id: Option<RecordId>,

    /// Payment intent reference from the external processor.
    payment_intent_id: Option<String>,

    /// Why the checkout failed, if it did.
    failure_reason: Option<String>,

    /// When the checkout was initiated.
    created_at: DateTime<Utc>,

    /// When the last state change happened.
    state_changed_at: DateTime<Utc>,

    /// Stored version for optimistic concurrency.
    #[serde(default)]
    version: Version,
}

impl Entity for Checkout {
    fn collection() -> &'static str {
        "checkouts"
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
impl Checkout {
    /// Returns the checkout ID.
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Returns the idempotency key.
    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    /// Returns the customer ID.
    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    /// Returns the current state.
    pub fn state(&self) -> CheckoutState {
        self.state
    }

    /// Returns the cart snapshot.
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Returns the computed totals.
    pub fn totals(&self) -> CartTotals {
        self.totals
    }

    /// Returns the shipping details, if collected.
    pub fn shipping(&self) -> Option<&ShippingInfo> {
        self.shipping.as_ref()
    }

    /// Returns the backing reservation ID, if one was taken.
    pub fn reservation_id(&self) -> Option<RecordId> {
        self.reservation_id
    }

    /// Returns the payment intent reference, if one was created.
    pub fn payment_intent_id(&self) -> Option<&str> {
        self.payment_intent_id.as_deref()
    }

    /// Returns the failure reason, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns when the checkout was initiated.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the last state change happened.
    pub fn state_changed_at(&self) -> DateTime<Utc> {
        self.state_changed_at
    }

    /// Returns true if the checkout is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

// Transitions
impl Checkout {
    /// Creates a checkout in `Initiated` with a validated cart snapshot.
    pub fn initiate(
        id: RecordId,
        idempotency_key: IdempotencyKey,
        customer_id: CustomerId,
        items: Vec<CartItem>,
        totals: CartTotals,
        shipping: Option<ShippingInfo>,
    ) -> Result<Self, CheckoutError> {
        if items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        for item in &items {
            if item.quantity == 0 {
                return Err(CheckoutError::InvalidQuantity {
                    product_id: item.product_id.to_string(),
                });
            }
        }
        let expected = totals.subtotal + totals.tax + totals.shipping - totals.discount;
        if totals.total != expected {
            return Err(CheckoutError::TotalsMismatch {
                expected,
                actual: totals.total,
            });
        }

        let now = Utc::now();
        Ok(Self {
            id,
            idempotency_key,
            customer_id,
            state: CheckoutState::Initiated,
            items,
            totals,
            shipping,
            reservation_id: None,
            payment_intent_id: None,
            failure_reason: None,
            created_at: now,
            state_changed_at: now,
            version: Version::initial(),
        })
    }

    /// Attaches the inventory reservation taken at initiation.
    pub fn attach_reservation(&mut self, reservation_id: RecordId) {
        self.reservation_id = Some(reservation_id);
    }

    /// Records the payment intent and moves to `PaymentPending`.
    pub fn begin_payment(&mut self, intent_id: impl Into<String>) -> Result<(), CheckoutError> {
        if !self.state.can_begin_payment() {
            return Err(self.invalid("begin payment"));
        }
        self.payment_intent_id = Some(intent_id.into());
        self.transition(CheckoutState::PaymentPending);
        Ok(())
    }

    /// Moves to `Processing` when the processor webhook arrives.
    pub fn start_processing(&mut self) -> Result<(), CheckoutError> {
        if !self.state.can_start_processing() {
            return Err(self.invalid("start processing"));
        }
        self.transition(CheckoutState::Processing);
        Ok(())
    }

    /// Moves to `Completed` on settlement confirmation.
    pub fn complete(&mut self) -> Result<(), CheckoutError> {
        if !self.state.can_complete() {
            return Err(self.invalid("complete"));
        }
        self.transition(CheckoutState::Completed);
        Ok(())
    }

    /// Moves to `Failed` (decline, timeout).
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), CheckoutError> {
        if !self.state.can_fail() {
            return Err(self.invalid("fail"));
        }
        self.failure_reason = Some(reason.into());
        self.transition(CheckoutState::Failed);
        Ok(())
    }

    /// Moves to `Abandoned` (TTL sweep, payment never completed).
    pub fn abandon(&mut self, reason: impl Into<String>) -> Result<(), CheckoutError> {
        if !self.state.can_abandon() {
            return Err(self.invalid("abandon"));
        }
        self.failure_reason = Some(reason.into());
        self.transition(CheckoutState::Abandoned);
        Ok(())
    }

    /// Moves to `Refunded` (driven by the refund workflow).
    pub fn refund(&mut self) -> Result<(), CheckoutError> {
        if !self.state.can_refund() {
            return Err(self.invalid("refund"));
        }
        self.transition(CheckoutState::Refunded);
        Ok(())
    }

    fn transition(&mut self, next: CheckoutState) {
        self.state = next;
        self.state_changed_at = Utc::now();
    }

    fn invalid(&self, action: &'static str) -> CheckoutError {
        CheckoutError::InvalidTransition {
            current: self.state,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Money;

    fn items() -> Vec<CartItem> {
        vec![
            CartItem::new("SKU-001", "W1", "Widget", 2, Money::from_cents(1000)),
            CartItem::new("SKU-002", "W1", "Gadget", 1, Money::from_cents(2500)),
        ]
    }

    fn checkout() -> Checkout {
        let items = items();
        let totals = CartTotals::compute(
            &items,
            Money::from_cents(450),
            Money::from_cents(500),
            Money::zero(),
        );
        Checkout::initiate(
            RecordId::new(),
            IdempotencyKey::new("K1"),
            CustomerId::new(),
            items,
            totals,
            None,
        )
        .unwrap()
    }

    #[test]
    fn initiate_creates_checkout_with_snapshot() {
        let checkout = checkout();
        assert_eq!(checkout.state(), CheckoutState::Initiated);
        assert_eq!(checkout.items().len(), 2);
        assert_eq!(checkout.totals().total.cents(), 4500 + 450 + 500);
        assert_eq!(checkout.idempotency_key().as_str(), "K1");
        assert!(checkout.reservation_id().is_none());
    }

    #[test]
    fn initiate_rejects_empty_cart() {
        let result = Checkout::initiate(
            RecordId::new(),
            IdempotencyKey::new("K1"),
            CustomerId::new(),
            vec![],
            CartTotals::default(),
            None,
        );
        assert!(matches!(result, Err(CheckoutError::EmptyCart)));
    }

    #[test]
    fn initiate_rejects_zero_quantity() {
        let items = vec![CartItem::new(
            "SKU-001",
            "W1",
            "Widget",
            0,
            Money::from_cents(1000),
        )];
        let totals = CartTotals::compute(&items, Money::zero(), Money::zero(), Money::zero());
        let result = Checkout::initiate(
            RecordId::new(),
            IdempotencyKey::new("K1"),
            CustomerId::new(),
            items,
            totals,
            None,
        );
        assert!(matches!(result, Err(CheckoutError::InvalidQuantity { .. })));
    }

    #[test]
    fn initiate_rejects_inconsistent_totals() {
        let items = items();
        let mut totals = CartTotals::compute(&items, Money::zero(), Money::zero(), Money::zero());
        totals.total = Money::from_cents(1);

        let result = Checkout::initiate(
            RecordId::new(),
            IdempotencyKey::new("K1"),
            CustomerId::new(),
            items,
            totals,
            None,
        );
        assert!(matches!(result, Err(CheckoutError::TotalsMismatch { .. })));
    }

    #[test]
    fn full_payment_lifecycle() {
        let mut checkout = checkout();
        checkout.attach_reservation(RecordId::new());

        checkout.begin_payment("PI-001").unwrap();
        assert_eq!(checkout.state(), CheckoutState::PaymentPending);
        assert_eq!(checkout.payment_intent_id(), Some("PI-001"));

        checkout.start_processing().unwrap();
        assert_eq!(checkout.state(), CheckoutState::Processing);

        checkout.complete().unwrap();
        assert_eq!(checkout.state(), CheckoutState::Completed);
        assert!(checkout.is_terminal());
    }

    #[test]
    fn fail_from_payment_pending_records_reason() {
        let mut checkout = checkout();
        checkout.begin_payment("PI-001").unwrap();
        checkout.fail("card declined").unwrap();

        assert_eq!(checkout.state(), CheckoutState::Failed);
        assert_eq!(checkout.failure_reason(), Some("card declined"));
    }

    #[test]
    fn abandon_from_initiated() {
        let mut checkout = checkout();
        checkout.abandon("reservation expired").unwrap();
        assert_eq!(checkout.state(), CheckoutState::Abandoned);
    }

    #[test]
    fn refund_only_after_completion() {
        let mut checkout = checkout();
        assert!(matches!(
            checkout.refund(),
            Err(CheckoutError::InvalidTransition { action: "refund", .. })
        ));

        checkout.begin_payment("PI-001").unwrap();
        checkout.start_processing().unwrap();
        checkout.complete().unwrap();

        checkout.refund().unwrap();
        assert_eq!(checkout.state(), CheckoutState::Refunded);
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut checkout = checkout();
        checkout.begin_payment("PI-001").unwrap();
        checkout.fail("declined").unwrap();

        assert!(checkout.start_processing().is_err());
        assert!(checkout.complete().is_err());
        assert!(checkout.fail("again").is_err());
        assert!(checkout.abandon("sweep").is_err());
        assert_eq!(checkout.state(), CheckoutState::Failed);
    }

    #[test]
    fn serialization_roundtrip() {
        let mut checkout = checkout();
        checkout.begin_payment("PI-001").unwrap();

        let json = serde_json::to_string(&checkout).unwrap();
        let restored: Checkout = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id(), checkout.id());
        assert_eq!(restored.state(), CheckoutState::PaymentPending);
        assert_eq!(restored.totals(), checkout.totals());
        assert_eq!(restored.payment_intent_id(), Some("PI-001"));
    }
}
