//! Checkout service: idempotent initiation and the payment state machine.

use common::{IdempotencyKey, RecordId};
use domain::{
    CartItem, CartTotals, Checkout, CustomerId, Entity, Money, Repository, ReservationLine,
    ShippingInfo,
};
use record_store::{RecordStore, Version};
use serde::{Deserialize, Serialize};

use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, Result};
use crate::escrow::EscrowLedger;
use crate::ledger::InventoryLedger;
use crate::reservations::ReservationManager;
use crate::services::payment::{PaymentOutcome, PaymentProcessor, PaymentWebhook};
use crate::services::policy::PolicyEngine;

/// Command to initiate a checkout.
#[derive(Debug, Clone)]
pub struct InitiateCheckout {
    /// Caller-supplied idempotency key; at most one checkout per key.
    pub idempotency_key: IdempotencyKey,

    /// The customer checking out.
    pub customer_id: CustomerId,

    /// The cart lines to freeze into the snapshot.
    pub items: Vec<CartItem>,

    /// Tax charged on the cart.
    pub tax: Money,

    /// Shipping charged on the cart.
    pub shipping_cost: Money,

    /// Discount applied to the cart.
    pub discount: Money,

    /// Shipping details, if collected.
    pub shipping: Option<ShippingInfo>,
}

/// Index record mapping an idempotency key to its checkout.
///
/// Claimed with a create-only write: whoever wins the claim owns the key,
/// every later attempt reads the winner's checkout back.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckoutKeyIndex {
    key: String,
    checkout_id: RecordId,
    #[serde(default)]
    version: Version,
}

impl Entity for CheckoutKeyIndex {
    fn collection() -> &'static str {
        "checkout_keys"
    }

    fn key(&self) -> String {
        self.key.clone()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

/// Index record mapping a payment intent to its checkout, for webhook
/// dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PaymentIntentIndex {
    intent_id: String,
    checkout_id: RecordId,
    #[serde(default)]
    version: Version,
}

impl Entity for PaymentIntentIndex {
    fn collection() -> &'static str {
        "payment_intents"
    }

    fn key(&self) -> String {
        self.intent_id.clone()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

/// Drives checkouts from initiation through payment to settlement.
///
/// Initiation is idempotent under the caller's key; webhook handling is
/// idempotent under redelivery; every failure path releases the inventory
/// hold so nothing stays reserved for a checkout that cannot complete.
pub struct CheckoutService<S, P, G>
where
    S: RecordStore + Clone,
    P: PaymentProcessor,
    G: PolicyEngine,
{
    checkouts: Repository<S, Checkout>,
    keys: Repository<S, CheckoutKeyIndex>,
    intents: Repository<S, PaymentIntentIndex>,
    reservations: ReservationManager<S>,
    escrow: EscrowLedger<S>,
    payments: P,
    policy: G,
    config: FulfillmentConfig,
}

impl<S, P, G> CheckoutService<S, P, G>
where
    S: RecordStore + Clone,
    P: PaymentProcessor,
    G: PolicyEngine,
{
    /// Creates a new checkout service.
    pub fn new(
        store: S,
        reservations: ReservationManager<S>,
        escrow: EscrowLedger<S>,
        payments: P,
        policy: G,
        config: FulfillmentConfig,
    ) -> Self {
        Self {
            checkouts: Repository::new(store.clone()),
            keys: Repository::new(store.clone()),
            intents: Repository::new(store),
            reservations,
            escrow,
            payments,
            policy,
            config,
        }
    }

    /// Returns the inventory ledger behind the reservation manager.
    pub fn ledger(&self) -> &InventoryLedger<S> {
        self.reservations.ledger()
    }

    /// Loads a checkout by ID.
    pub async fn get(&self, checkout_id: RecordId) -> Result<Checkout> {
        self.checkouts
            .find(&checkout_id.to_string())
            .await?
            .ok_or_else(|| FulfillmentError::NotFound {
                entity: "checkout",
                key: checkout_id.to_string(),
            })
    }

    /// Initiates a checkout.
    ///
    /// Retrying with the same idempotency key returns the existing checkout
    /// unchanged: no second checkout, no second reservation, no second
    /// payment intent. If the reservation cannot be taken, every record
    /// written by this call is removed again, leaving state as if the call
    /// never happened.
    #[tracing::instrument(skip(self, cmd), fields(idempotency_key = %cmd.idempotency_key))]
    pub async fn initiate(&self, cmd: InitiateCheckout) -> Result<Checkout> {
        // Fast path: the key was already claimed.
        if let Some(index) = self.keys.find(cmd.idempotency_key.as_str()).await? {
            metrics::counter!("checkout_idempotent_replays_total").increment(1);
            return self.get(index.checkout_id).await;
        }

        let totals = CartTotals::compute(&cmd.items, cmd.tax, cmd.shipping_cost, cmd.discount);

        let screening = self
            .policy
            .screen_checkout(cmd.customer_id, totals.total)
            .await?;
        if !screening.allow {
            metrics::counter!("checkout_policy_denied_total").increment(1);
            return Err(FulfillmentError::PolicyDenied {
                reason: screening
                    .reason
                    .unwrap_or_else(|| "checkout declined".to_string()),
            });
        }

        let mut checkout = Checkout::initiate(
            RecordId::new(),
            cmd.idempotency_key.clone(),
            cmd.customer_id,
            cmd.items.clone(),
            totals,
            cmd.shipping,
        )?;
        self.checkouts.insert(&mut checkout).await?;

        // Claim the key. Losing the claim means a concurrent call with the
        // same key got there first; discard our record and return theirs.
        let mut index = CheckoutKeyIndex {
            key: cmd.idempotency_key.as_str().to_string(),
            checkout_id: checkout.id(),
            version: Version::initial(),
        };
        if let Err(e) = self.keys.insert(&mut index).await {
            self.checkouts.remove(&checkout.key()).await?;
            if e.is_version_conflict() {
                metrics::counter!("checkout_idempotent_replays_total").increment(1);
                let winner = self.keys.get(cmd.idempotency_key.as_str()).await?;
                return self.get(winner.checkout_id).await;
            }
            return Err(e.into());
        }

        // All-or-nothing hold. On failure, undo the records this call wrote.
        let lines: Vec<ReservationLine> = cmd
            .items
            .iter()
            .map(|item| {
                ReservationLine::new(
                    item.product_id.clone(),
                    item.warehouse_id.clone(),
                    item.quantity,
                )
            })
            .collect();

        let reservation = match self.reservations.create(checkout.id(), lines).await {
            Ok(reservation) => reservation,
            Err(e) => {
                self.keys.remove(cmd.idempotency_key.as_str()).await?;
                self.checkouts.remove(&checkout.key()).await?;
                return Err(e);
            }
        };
        checkout.attach_reservation(reservation.id());

        // Payment intent, under a deadline. A processor that does not
        // answer fails the checkout rather than leaving it stuck.
        let intent = match tokio::time::timeout(
            self.config.payment_timeout,
            self.payments
                .create_payment_intent(checkout.id(), totals.total),
        )
        .await
        {
            Ok(Ok(intent)) => intent,
            Ok(Err(e)) => {
                return self
                    .fail_initiation(checkout, reservation.id(), e.to_string(), e)
                    .await;
            }
            Err(_) => {
                let e = FulfillmentError::ExternalTimeout { service: "payment" };
                return self
                    .fail_initiation(checkout, reservation.id(), e.to_string(), e)
                    .await;
            }
        };

        checkout.begin_payment(intent.intent_id.clone())?;
        self.checkouts.save(&mut checkout).await?;

        let mut intent_index = PaymentIntentIndex {
            intent_id: intent.intent_id,
            checkout_id: checkout.id(),
            version: Version::initial(),
        };
        self.intents.insert(&mut intent_index).await?;

        metrics::counter!("checkouts_initiated_total").increment(1);
        tracing::info!(checkout_id = %checkout.id(), "checkout initiated");
        Ok(checkout)
    }

    /// Handles a payment-processor webhook delivery.
    ///
    /// Redelivery of an already-applied outcome is a no-op; an outcome that
    /// contradicts a terminal state is an `InvalidTransition` surfaced to
    /// the caller and logged.
    #[tracing::instrument(skip(self), fields(intent_id = %webhook.intent_id))]
    pub async fn handle_payment_webhook(&self, webhook: PaymentWebhook) -> Result<Checkout> {
        let index = self
            .intents
            .find(&webhook.intent_id)
            .await?
            .ok_or_else(|| FulfillmentError::NotFound {
                entity: "payment intent",
                key: webhook.intent_id.clone(),
            })?;

        let mut checkout = self.get(index.checkout_id).await?;

        match webhook.outcome {
            PaymentOutcome::Succeeded => {
                if checkout.state() == domain::CheckoutState::Completed {
                    metrics::counter!("webhook_redeliveries_total").increment(1);
                    tracing::debug!(checkout_id = %checkout.id(), "duplicate success webhook ignored");
                    return Ok(checkout);
                }

                if checkout.state() == domain::CheckoutState::PaymentPending {
                    checkout.start_processing()?;
                }
                checkout.complete().inspect_err(|e| {
                    tracing::warn!(
                        checkout_id = %checkout.id(),
                        state = %checkout.state(),
                        error = %e,
                        "success webhook against terminal state rejected"
                    );
                })?;
                self.checkouts.save(&mut checkout).await?;

                // The hold becomes a sale, funds go into escrow. The state
                // flip above is the claim: webhook redeliveries return at
                // the completed check and can never reach this twice.
                if let Some(reservation_id) = checkout.reservation_id() {
                    self.reservations.consume(reservation_id).await?;
                }
                self.escrow
                    .hold_idempotent(checkout.id(), checkout.totals().total)
                    .await?;

                metrics::counter!("checkouts_completed_total").increment(1);
                tracing::info!(checkout_id = %checkout.id(), "checkout completed");
            }
            PaymentOutcome::Failed => {
                if checkout.state() == domain::CheckoutState::Failed {
                    metrics::counter!("webhook_redeliveries_total").increment(1);
                    tracing::debug!(checkout_id = %checkout.id(), "duplicate failure webhook ignored");
                    return Ok(checkout);
                }

                checkout.fail("payment declined").inspect_err(|e| {
                    tracing::warn!(
                        checkout_id = %checkout.id(),
                        state = %checkout.state(),
                        error = %e,
                        "failure webhook against terminal state rejected"
                    );
                })?;
                self.checkouts.save(&mut checkout).await?;

                if let Some(reservation_id) = checkout.reservation_id() {
                    self.reservations.release(reservation_id).await?;
                }

                metrics::counter!("checkouts_failed_total").increment(1);
                tracing::info!(checkout_id = %checkout.id(), "checkout failed");
            }
        }

        Ok(checkout)
    }

    /// Refunds a completed checkout: compensating inventory increment plus
    /// escrow refund.
    #[tracing::instrument(skip(self))]
    pub async fn refund(&self, checkout_id: RecordId) -> Result<Checkout> {
        let mut checkout = self.get(checkout_id).await?;
        checkout.refund()?;
        self.checkouts.save(&mut checkout).await?;

        // Units come back as sellable stock. Failures here do not undo the
        // refund; they are operational exceptions for reconciliation.
        for item in checkout.items() {
            if let Err(e) = self
                .ledger()
                .adjust_on_hand(&item.stock_key(), i64::from(item.quantity))
                .await
            {
                metrics::counter!("refund_restock_failures_total").increment(1);
                tracing::error!(
                    checkout_id = %checkout.id(),
                    stock_key = %item.stock_key(),
                    error = %e,
                    "restock failed after refund, manual reconciliation required"
                );
            }
        }

        if let Err(e) = self.escrow.refund_remaining(checkout.id()).await {
            metrics::counter!("refund_escrow_failures_total").increment(1);
            tracing::error!(
                checkout_id = %checkout.id(),
                error = %e,
                "escrow refund failed after checkout refund, manual reconciliation required"
            );
        }

        metrics::counter!("checkouts_refunded_total").increment(1);
        Ok(checkout)
    }

    /// Fails a checkout during initiation: release the hold, persist the
    /// failure, surface the original error.
    async fn fail_initiation(
        &self,
        mut checkout: Checkout,
        reservation_id: RecordId,
        reason: String,
        error: FulfillmentError,
    ) -> Result<Checkout> {
        if let Err(e) = self.reservations.release(reservation_id).await {
            tracing::error!(
                checkout_id = %checkout.id(),
                error = %e,
                "release failed while failing initiation, manual reconciliation required"
            );
        }
        checkout.fail(reason)?;
        self.checkouts.save(&mut checkout).await?;
        metrics::counter!("checkouts_failed_total").increment(1);
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::payment::InMemoryPaymentProcessor;
    use crate::services::policy::InMemoryPolicyEngine;
    use domain::{CheckoutState, StockKey};
    use record_store::InMemoryRecordStore;

    type TestService =
        CheckoutService<InMemoryRecordStore, InMemoryPaymentProcessor, InMemoryPolicyEngine>;

    struct Harness {
        service: TestService,
        ledger: InventoryLedger<InMemoryRecordStore>,
        payments: InMemoryPaymentProcessor,
        policy: InMemoryPolicyEngine,
    }

    async fn setup() -> Harness {
        let store = InMemoryRecordStore::new();
        let config = FulfillmentConfig::for_tests();
        let ledger = InventoryLedger::new(store.clone(), config.clone());
        let reservations = ReservationManager::new(store.clone(), ledger.clone(), config.clone());
        let escrow = EscrowLedger::new(store.clone());
        let payments = InMemoryPaymentProcessor::new();
        let policy = InMemoryPolicyEngine::new();
        let service = CheckoutService::new(
            store,
            reservations,
            escrow,
            payments.clone(),
            policy.clone(),
            config,
        );

        ledger
            .create(StockKey::new("SKU-1", "W1"), 10, 2)
            .await
            .unwrap();

        Harness {
            service,
            ledger,
            payments,
            policy,
        }
    }

    fn cmd(key: &str, quantity: u32) -> InitiateCheckout {
        InitiateCheckout {
            idempotency_key: IdempotencyKey::new(key),
            customer_id: CustomerId::new(),
            items: vec![CartItem::new(
                "SKU-1",
                "W1",
                "Widget",
                quantity,
                Money::from_cents(1000),
            )],
            tax: Money::from_cents(80),
            shipping_cost: Money::from_cents(500),
            discount: Money::zero(),
            shipping: None,
        }
    }

    #[tokio::test]
    async fn initiate_reserves_and_creates_intent() {
        let h = setup().await;

        let checkout = h.service.initiate(cmd("K1", 2)).await.unwrap();

        assert_eq!(checkout.state(), CheckoutState::PaymentPending);
        assert!(checkout.reservation_id().is_some());
        assert!(checkout.payment_intent_id().is_some());
        assert_eq!(checkout.totals().total.cents(), 2000 + 80 + 500);
        assert_eq!(h.payments.intent_count(), 1);

        let record = h.ledger.get(&StockKey::new("SKU-1", "W1")).await.unwrap();
        assert_eq!(record.quantity_reserved(), 2);
    }

    #[tokio::test]
    async fn same_key_returns_same_checkout_without_second_reservation() {
        let h = setup().await;

        let first = h.service.initiate(cmd("K1", 2)).await.unwrap();
        let second = h.service.initiate(cmd("K1", 2)).await.unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(h.payments.intent_count(), 1);

        let record = h.ledger.get(&StockKey::new("SKU-1", "W1")).await.unwrap();
        assert_eq!(record.quantity_reserved(), 2);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_no_trace() {
        let h = setup().await;

        let result = h.service.initiate(cmd("K1", 11)).await;
        assert!(matches!(
            result,
            Err(FulfillmentError::InsufficientStock { .. })
        ));

        // State as if the call never happened: the key is free again and a
        // smaller retry under the same key succeeds.
        let record = h.ledger.get(&StockKey::new("SKU-1", "W1")).await.unwrap();
        assert_eq!(record.quantity_reserved(), 0);

        let retry = h.service.initiate(cmd("K1", 2)).await.unwrap();
        assert_eq!(retry.state(), CheckoutState::PaymentPending);
    }

    #[tokio::test]
    async fn policy_denial_creates_nothing() {
        let h = setup().await;
        h.policy.set_deny_checkout(Some("velocity limit"));

        let result = h.service.initiate(cmd("K1", 2)).await;
        assert!(matches!(result, Err(FulfillmentError::PolicyDenied { .. })));

        let record = h.ledger.get(&StockKey::new("SKU-1", "W1")).await.unwrap();
        assert_eq!(record.quantity_reserved(), 0);
        assert_eq!(h.payments.intent_count(), 0);
    }

    #[tokio::test]
    async fn processor_refusal_fails_checkout_and_releases_hold() {
        let h = setup().await;
        h.payments.set_fail_on_create(true);

        let result = h.service.initiate(cmd("K1", 2)).await;
        assert!(matches!(
            result,
            Err(FulfillmentError::PaymentProcessor(_))
        ));

        let record = h.ledger.get(&StockKey::new("SKU-1", "W1")).await.unwrap();
        assert_eq!(record.quantity_reserved(), 0);

        // The checkout exists in failed state under the same key
        let replay = h.service.initiate(cmd("K1", 2)).await.unwrap();
        assert_eq!(replay.state(), CheckoutState::Failed);
    }

    #[tokio::test]
    async fn processor_timeout_maps_to_external_timeout() {
        let h = setup().await;
        h.payments
            .set_delay(Some(std::time::Duration::from_secs(5)));

        let result = h.service.initiate(cmd("K1", 2)).await;
        assert!(matches!(
            result,
            Err(FulfillmentError::ExternalTimeout { service: "payment" })
        ));

        let record = h.ledger.get(&StockKey::new("SKU-1", "W1")).await.unwrap();
        assert_eq!(record.quantity_reserved(), 0);
    }

    #[tokio::test]
    async fn success_webhook_completes_and_commits_stock() {
        let h = setup().await;
        let checkout = h.service.initiate(cmd("K1", 2)).await.unwrap();
        let intent_id = checkout.payment_intent_id().unwrap().to_string();

        let updated = h
            .service
            .handle_payment_webhook(PaymentWebhook {
                intent_id,
                outcome: PaymentOutcome::Succeeded,
                processor_refund_id: None,
            })
            .await
            .unwrap();

        assert_eq!(updated.state(), CheckoutState::Completed);

        let record = h.ledger.get(&StockKey::new("SKU-1", "W1")).await.unwrap();
        assert_eq!(record.quantity_on_hand(), 8);
        assert_eq!(record.quantity_reserved(), 0);
    }

    #[tokio::test]
    async fn redelivered_success_webhook_is_noop() {
        let h = setup().await;
        let checkout = h.service.initiate(cmd("K1", 2)).await.unwrap();
        let intent_id = checkout.payment_intent_id().unwrap().to_string();
        let webhook = PaymentWebhook {
            intent_id,
            outcome: PaymentOutcome::Succeeded,
            processor_refund_id: None,
        };

        h.service
            .handle_payment_webhook(webhook.clone())
            .await
            .unwrap();
        let replay = h.service.handle_payment_webhook(webhook).await.unwrap();

        assert_eq!(replay.state(), CheckoutState::Completed);

        // No duplicate inventory decrement
        let record = h.ledger.get(&StockKey::new("SKU-1", "W1")).await.unwrap();
        assert_eq!(record.quantity_on_hand(), 8);
        assert_eq!(record.quantity_reserved(), 0);
    }

    #[tokio::test]
    async fn failure_webhook_releases_hold() {
        let h = setup().await;
        let checkout = h.service.initiate(cmd("K1", 2)).await.unwrap();
        let intent_id = checkout.payment_intent_id().unwrap().to_string();

        let updated = h
            .service
            .handle_payment_webhook(PaymentWebhook {
                intent_id,
                outcome: PaymentOutcome::Failed,
                processor_refund_id: None,
            })
            .await
            .unwrap();

        assert_eq!(updated.state(), CheckoutState::Failed);

        let record = h.ledger.get(&StockKey::new("SKU-1", "W1")).await.unwrap();
        assert_eq!(record.quantity_reserved(), 0);
        assert_eq!(record.quantity_on_hand(), 10);
    }

    #[tokio::test]
    async fn conflicting_webhook_after_completion_is_invalid_transition() {
        let h = setup().await;
        let checkout = h.service.initiate(cmd("K1", 2)).await.unwrap();
        let intent_id = checkout.payment_intent_id().unwrap().to_string();

        h.service
            .handle_payment_webhook(PaymentWebhook {
                intent_id: intent_id.clone(),
                outcome: PaymentOutcome::Succeeded,
                processor_refund_id: None,
            })
            .await
            .unwrap();

        let result = h
            .service
            .handle_payment_webhook(PaymentWebhook {
                intent_id,
                outcome: PaymentOutcome::Failed,
                processor_refund_id: None,
            })
            .await;

        assert!(matches!(result, Err(FulfillmentError::Checkout(_))));
    }

    #[tokio::test]
    async fn unknown_intent_is_not_found() {
        let h = setup().await;
        let result = h
            .service
            .handle_payment_webhook(PaymentWebhook {
                intent_id: "PI-9999".to_string(),
                outcome: PaymentOutcome::Succeeded,
                processor_refund_id: None,
            })
            .await;
        assert!(matches!(result, Err(FulfillmentError::NotFound { .. })));
    }

    #[tokio::test]
    async fn refund_restocks_inventory() {
        let h = setup().await;
        let checkout = h.service.initiate(cmd("K1", 2)).await.unwrap();
        let intent_id = checkout.payment_intent_id().unwrap().to_string();
        h.service
            .handle_payment_webhook(PaymentWebhook {
                intent_id,
                outcome: PaymentOutcome::Succeeded,
                processor_refund_id: None,
            })
            .await
            .unwrap();

        let refunded = h.service.refund(checkout.id()).await.unwrap();
        assert_eq!(refunded.state(), CheckoutState::Refunded);

        let record = h.ledger.get(&StockKey::new("SKU-1", "W1")).await.unwrap();
        assert_eq!(record.quantity_on_hand(), 10);
    }

    #[tokio::test]
    async fn refund_before_completion_is_invalid() {
        let h = setup().await;
        let checkout = h.service.initiate(cmd("K1", 2)).await.unwrap();

        let result = h.service.refund(checkout.id()).await;
        assert!(matches!(result, Err(FulfillmentError::Checkout(_))));
    }
}
