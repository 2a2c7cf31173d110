//! RMA workflow: returns through approval, inspection, and resolution.

use common::RecordId;
use domain::{
    Actor, Checkout, ItemCondition, Money, Repository, ReservationLine, ResolutionKind,
    ReturnLine, Rma,
};
use record_store::RecordStore;

use crate::error::{FulfillmentError, Result};
use crate::escrow::EscrowLedger;
use crate::ledger::InventoryLedger;
use crate::reservations::ReservationManager;
use crate::services::policy::PolicyEngine;

/// How an inspected return should be settled.
#[derive(Debug, Clone)]
pub enum RmaResolution {
    /// Refund the given amount through the escrow ledger.
    Refund { amount: Money },

    /// Reserve replacement stock for re-shipment.
    Replacement,

    /// Issue store credit; the RMA closes.
    Credit,
}

impl RmaResolution {
    fn kind(&self) -> ResolutionKind {
        match self {
            RmaResolution::Refund { .. } => ResolutionKind::Refund,
            RmaResolution::Replacement => ResolutionKind::Replacement,
            RmaResolution::Credit => ResolutionKind::Credit,
        }
    }
}

/// Drives return requests to a settled terminal state.
///
/// The RMA's own transition is always persisted before its side effects
/// run: a restock, refund, or re-reservation that fails afterwards is
/// logged as an operational exception for manual reconciliation and never
/// rolls the resolution back.
pub struct RmaWorkflow<S, G>
where
    S: RecordStore + Clone,
    G: PolicyEngine,
{
    rmas: Repository<S, Rma>,
    checkouts: Repository<S, Checkout>,
    ledger: InventoryLedger<S>,
    reservations: ReservationManager<S>,
    escrow: EscrowLedger<S>,
    policy: G,
}

impl<S, G> RmaWorkflow<S, G>
where
    S: RecordStore + Clone,
    G: PolicyEngine,
{
    /// Creates a new RMA workflow.
    pub fn new(
        store: S,
        ledger: InventoryLedger<S>,
        reservations: ReservationManager<S>,
        escrow: EscrowLedger<S>,
        policy: G,
    ) -> Self {
        Self {
            rmas: Repository::new(store.clone()),
            checkouts: Repository::new(store),
            ledger,
            reservations,
            escrow,
            policy,
        }
    }

    /// Loads an RMA by number.
    pub async fn get(&self, rma_number: &str) -> Result<Rma> {
        self.rmas
            .find(rma_number)
            .await?
            .ok_or_else(|| FulfillmentError::NotFound {
                entity: "RMA",
                key: rma_number.to_string(),
            })
    }

    /// Opens a return request against an existing order.
    #[tracing::instrument(skip(self, items, reason))]
    pub async fn request(
        &self,
        order_id: RecordId,
        items: Vec<ReturnLine>,
        reason: impl Into<String>,
    ) -> Result<Rma> {
        // The order must exist; eligibility beyond that is policy's call
        // at approval time.
        if self.checkouts.find(&order_id.to_string()).await?.is_none() {
            return Err(FulfillmentError::NotFound {
                entity: "checkout",
                key: order_id.to_string(),
            });
        }

        let mut rma = Rma::request(order_id, items, reason)?;
        self.rmas.insert(&mut rma).await?;
        metrics::counter!("rmas_requested_total").increment(1);
        tracing::info!(rma_number = %rma.rma_number(), %order_id, "return requested");
        Ok(rma)
    }

    /// Approves a return, gated by the external policy verdict.
    ///
    /// When policy auto-approves, the approval is attributed to the system
    /// rather than the requesting actor.
    #[tracing::instrument(skip(self))]
    pub async fn approve(&self, rma_number: &str, actor: Actor) -> Result<Rma> {
        let mut rma = self.get(rma_number).await?;

        let verdict = self.policy.screen_return(&rma).await?;
        if !verdict.allow {
            metrics::counter!("rmas_policy_denied_total").increment(1);
            return Err(FulfillmentError::PolicyDenied {
                reason: verdict
                    .reason
                    .unwrap_or_else(|| "return declined".to_string()),
            });
        }

        let (actor, auto) = if verdict.auto_approve {
            (Actor::system(), true)
        } else {
            (actor, false)
        };
        rma.approve(actor, auto)?;
        self.rmas.save(&mut rma).await?;
        metrics::counter!("rmas_approved_total").increment(1);
        Ok(rma)
    }

    /// Rejects a return (terminal).
    #[tracing::instrument(skip(self, reason))]
    pub async fn reject(
        &self,
        rma_number: &str,
        actor: Actor,
        reason: impl Into<String>,
    ) -> Result<Rma> {
        let mut rma = self.get(rma_number).await?;
        rma.reject(actor, reason)?;
        self.rmas.save(&mut rma).await?;
        metrics::counter!("rmas_rejected_total").increment(1);
        Ok(rma)
    }

    /// Records the customer's return shipment.
    #[tracing::instrument(skip(self))]
    pub async fn mark_shipped(
        &self,
        rma_number: &str,
        tracking_number: &str,
        actor: Actor,
    ) -> Result<Rma> {
        let mut rma = self.get(rma_number).await?;
        rma.mark_shipped(tracking_number, actor)?;
        self.rmas.save(&mut rma).await?;
        Ok(rma)
    }

    /// Records arrival of the returned items at the warehouse.
    #[tracing::instrument(skip(self))]
    pub async fn mark_received(&self, rma_number: &str, actor: Actor) -> Result<Rma> {
        let mut rma = self.get(rma_number).await?;
        rma.mark_received(actor)?;
        self.rmas.save(&mut rma).await?;
        Ok(rma)
    }

    /// Inspects the received items and settles the return.
    ///
    /// A failed inspection closes the RMA without a resolution record. A
    /// passed inspection resolves per `resolution`:
    /// - Refund: money moves through the escrow ledger, restockable items
    ///   go back on hand, and the order moves to refunded once its escrow
    ///   is fully repaid
    /// - Replacement: replacement stock is reserved for re-shipment
    /// - Credit: the RMA closes with a credit resolution record
    #[tracing::instrument(skip(self, notes, conditions))]
    pub async fn receive_and_inspect(
        &self,
        rma_number: &str,
        passed: bool,
        notes: &str,
        conditions: &[ItemCondition],
        resolution: RmaResolution,
        actor: Actor,
    ) -> Result<Rma> {
        let mut rma = self.get(rma_number).await?;
        rma.inspect(passed, notes, conditions, actor.clone())?;

        if !passed {
            rma.close(actor)?;
            self.rmas.save(&mut rma).await?;
            metrics::counter!("rmas_closed_total").increment(1);
            tracing::info!(rma_number = %rma.rma_number(), "return failed inspection, closed");
            return Ok(rma);
        }

        let refund_amount = match &resolution {
            RmaResolution::Refund { amount } => Some(*amount),
            _ => None,
        };
        rma.resolve(resolution.kind(), refund_amount, actor)?;

        // Resolution is final once persisted; everything after this point
        // is a side effect that must not undo it.
        self.rmas.save(&mut rma).await?;
        metrics::counter!("rmas_resolved_total").increment(1);

        match resolution {
            RmaResolution::Refund { amount } => {
                self.apply_refund_effects(&rma, amount).await;
            }
            RmaResolution::Replacement => {
                self.apply_replacement_effects(&rma).await;
            }
            RmaResolution::Credit => {}
        }

        Ok(rma)
    }

    /// Refund side effects: escrow refund, restock, order state.
    async fn apply_refund_effects(&self, rma: &Rma, amount: Money) {
        let order_id = rma.order_id();

        match self
            .escrow
            .refund(order_id, amount, Actor::new("rma_workflow"))
            .await
        {
            Ok(escrow) => {
                // Only a fully repaid escrow flips the order to refunded;
                // a partial-line return leaves it completed.
                if escrow.status() == domain::EscrowStatus::Refunded {
                    self.mark_order_refunded(order_id).await;
                }
            }
            Err(e) => {
                metrics::counter!("rma_reconciliation_exceptions_total").increment(1);
                tracing::error!(
                    rma_number = %rma.rma_number(),
                    %order_id,
                    error = %e,
                    "escrow refund failed after RMA resolution, manual reconciliation required"
                );
            }
        }

        for line in rma.restockable_lines() {
            if let Err(e) = self
                .ledger
                .adjust_on_hand(&line.stock_key(), i64::from(line.quantity))
                .await
            {
                metrics::counter!("rma_reconciliation_exceptions_total").increment(1);
                tracing::error!(
                    rma_number = %rma.rma_number(),
                    stock_key = %line.stock_key(),
                    error = %e,
                    "restock failed after RMA resolution, manual reconciliation required"
                );
            }
        }
    }

    /// Replacement side effects: reserve replacement stock.
    async fn apply_replacement_effects(&self, rma: &Rma) {
        let lines: Vec<ReservationLine> = rma
            .items()
            .iter()
            .map(|line| {
                ReservationLine::new(
                    line.product_id.clone(),
                    line.warehouse_id.clone(),
                    line.quantity,
                )
            })
            .collect();

        if let Err(e) = self.reservations.create(rma.order_id(), lines).await {
            metrics::counter!("rma_reconciliation_exceptions_total").increment(1);
            tracing::error!(
                rma_number = %rma.rma_number(),
                error = %e,
                "replacement reservation failed after RMA resolution, manual reconciliation required"
            );
        }
    }

    async fn mark_order_refunded(&self, order_id: RecordId) {
        let result = async {
            let mut checkout = self
                .checkouts
                .find(&order_id.to_string())
                .await?
                .ok_or_else(|| FulfillmentError::NotFound {
                    entity: "checkout",
                    key: order_id.to_string(),
                })?;
            checkout.refund()?;
            self.checkouts.save(&mut checkout).await?;
            Ok::<(), FulfillmentError>(())
        }
        .await;

        if let Err(e) = result {
            metrics::counter!("rma_reconciliation_exceptions_total").increment(1);
            tracing::error!(
                %order_id,
                error = %e,
                "order refund transition failed after escrow refund, manual reconciliation required"
            );
        }
    }
}
