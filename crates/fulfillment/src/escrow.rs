//! Escrow ledger: held funds, bounded releases, disputes, conditions.

use common::RecordId;
use domain::{Actor, Escrow, Money, ReleaseCondition, Repository};
use record_store::RecordStore;

use crate::error::{FulfillmentError, Result};

/// Owns escrow records, one per transaction.
///
/// The ledger only records state: release-condition evaluation (timers,
/// delivery events) is driven by the external scheduler, which calls
/// `mark_condition_met` and reads `all_conditions_met` back. Escrow
/// operations act on already-settled transactions, outside the inventory
/// contention domain, so writes are single-shot: a version conflict here
/// surfaces to the caller instead of retrying.
pub struct EscrowLedger<S>
where
    S: RecordStore + Clone,
{
    repo: Repository<S, Escrow>,
}

impl<S> Clone for EscrowLedger<S>
where
    S: RecordStore + Clone,
{
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
        }
    }
}

impl<S> EscrowLedger<S>
where
    S: RecordStore + Clone,
{
    /// Creates a new escrow ledger over the given store.
    pub fn new(store: S) -> Self {
        Self {
            repo: Repository::new(store),
        }
    }

    /// Places funds in escrow against a transaction.
    #[tracing::instrument(skip(self, conditions))]
    pub async fn hold(
        &self,
        transaction_id: RecordId,
        amount: Money,
        conditions: Vec<ReleaseCondition>,
    ) -> Result<Escrow> {
        let mut escrow = Escrow::hold(transaction_id, amount, conditions)?;
        self.repo.insert(&mut escrow).await?;
        metrics::counter!("escrows_held_total").increment(1);
        Ok(escrow)
    }

    /// Places funds in escrow unless a hold already exists for the
    /// transaction, in which case the existing escrow is returned
    /// unchanged. Used by webhook handling, which may be redelivered.
    pub async fn hold_idempotent(&self, transaction_id: RecordId, amount: Money) -> Result<Escrow> {
        if let Some(existing) = self.repo.find(&transaction_id.to_string()).await? {
            return Ok(existing);
        }
        match self.hold(transaction_id, amount, Vec::new()).await {
            Ok(escrow) => Ok(escrow),
            Err(FulfillmentError::Domain(e)) if e.is_version_conflict() => {
                // Lost a concurrent race to hold; theirs is authoritative.
                Ok(self.get(transaction_id).await?)
            }
            Err(e) => Err(e),
        }
    }

    /// Loads the escrow for a transaction.
    pub async fn get(&self, transaction_id: RecordId) -> Result<Escrow> {
        self.repo
            .find(&transaction_id.to_string())
            .await?
            .ok_or_else(|| FulfillmentError::NotFound {
                entity: "escrow",
                key: transaction_id.to_string(),
            })
    }

    /// Records a release of part or all of the held amount.
    #[tracing::instrument(skip(self))]
    pub async fn record_release(
        &self,
        transaction_id: RecordId,
        amount: Money,
        actor: Actor,
    ) -> Result<Escrow> {
        let mut escrow = self.get(transaction_id).await?;
        escrow.record_release(amount, actor).inspect_err(|e| {
            tracing::warn!(
                transaction_id = %transaction_id,
                error = %e,
                "escrow release rejected"
            );
        })?;
        self.repo.save(&mut escrow).await?;
        metrics::counter!("escrow_releases_total").increment(1);
        Ok(escrow)
    }

    /// Refunds part or all of the remaining amount back to the payer.
    #[tracing::instrument(skip(self))]
    pub async fn refund(
        &self,
        transaction_id: RecordId,
        amount: Money,
        actor: Actor,
    ) -> Result<Escrow> {
        let mut escrow = self.get(transaction_id).await?;
        escrow.refund(amount)?;
        self.repo.save(&mut escrow).await?;
        metrics::counter!("escrow_refunds_total").increment(1);
        tracing::info!(%transaction_id, %amount, %actor, "escrow refund recorded");
        Ok(escrow)
    }

    /// Refunds whatever is still held for a transaction. A no-op when
    /// nothing remains.
    pub async fn refund_remaining(&self, transaction_id: RecordId) -> Result<Escrow> {
        let escrow = self.get(transaction_id).await?;
        let remaining = escrow.remaining();
        if remaining.is_zero() {
            return Ok(escrow);
        }
        self.refund(transaction_id, remaining, Actor::system()).await
    }

    /// Opens a dispute, blocking releases until resolved.
    #[tracing::instrument(skip(self, reason))]
    pub async fn open_dispute(
        &self,
        transaction_id: RecordId,
        reason: impl Into<String>,
    ) -> Result<Escrow> {
        let mut escrow = self.get(transaction_id).await?;
        escrow.open_dispute(reason)?;
        self.repo.save(&mut escrow).await?;
        metrics::counter!("escrow_disputes_opened_total").increment(1);
        Ok(escrow)
    }

    /// Resolves the open dispute.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_dispute(&self, transaction_id: RecordId) -> Result<Escrow> {
        let mut escrow = self.get(transaction_id).await?;
        escrow.resolve_dispute()?;
        self.repo.save(&mut escrow).await?;
        metrics::counter!("escrow_disputes_resolved_total").increment(1);
        Ok(escrow)
    }

    /// Marks one release condition met (driven by the external scheduler).
    #[tracing::instrument(skip(self))]
    pub async fn mark_condition_met(
        &self,
        transaction_id: RecordId,
        index: usize,
    ) -> Result<Escrow> {
        let mut escrow = self.get(transaction_id).await?;
        escrow.mark_condition_met(index)?;
        self.repo.save(&mut escrow).await?;
        Ok(escrow)
    }

    /// Pure query: true if every configured condition is met.
    pub async fn all_conditions_met(&self, transaction_id: RecordId) -> Result<bool> {
        Ok(self.get(transaction_id).await?.all_conditions_met())
    }
}
