//! Inventory ledger: atomic stock mutations per (product, warehouse) key.

use domain::{InventoryError, InventoryRecord, Repository, StockKey};
use record_store::RecordStore;

use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, Result};

/// Owns all mutations of inventory records.
///
/// Every mutation is a load → pure transition → compare-and-update cycle on
/// one (product, warehouse) record. Version conflicts from concurrent
/// checkouts are retried with backoff up to the configured budget, then
/// surfaced as `Contention`. Derived fields (`quantity_available`,
/// `status`) are re-established by the record itself on every transition,
/// so no path can persist a record that violates the availability
/// invariant.
pub struct InventoryLedger<S>
where
    S: RecordStore + Clone,
{
    repo: Repository<S, InventoryRecord>,
    config: FulfillmentConfig,
}

impl<S> Clone for InventoryLedger<S>
where
    S: RecordStore + Clone,
{
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S> InventoryLedger<S>
where
    S: RecordStore + Clone,
{
    /// Creates a new ledger over the given store.
    pub fn new(store: S, config: FulfillmentConfig) -> Self {
        Self {
            repo: Repository::new(store),
            config,
        }
    }

    /// Registers a new (product, warehouse) record with initial stock.
    #[tracing::instrument(skip(self))]
    pub async fn create(
        &self,
        key: StockKey,
        quantity_on_hand: i64,
        reorder_point: i64,
    ) -> Result<InventoryRecord> {
        let mut record = InventoryRecord::new(
            key.product_id.clone(),
            key.warehouse_id.clone(),
            quantity_on_hand,
            reorder_point,
        );
        self.repo.insert(&mut record).await?;
        Ok(record)
    }

    /// Loads the record for a (product, warehouse) key.
    pub async fn get(&self, key: &StockKey) -> Result<InventoryRecord> {
        self.repo
            .find(&key.to_string())
            .await?
            .ok_or_else(|| FulfillmentError::NotFound {
                entity: "inventory record",
                key: key.to_string(),
            })
    }

    /// Holds `quantity` units against the available count.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(&self, key: &StockKey, quantity: u32) -> Result<InventoryRecord> {
        let record = self.mutate(key, |r| r.reserve(quantity)).await?;
        metrics::counter!("inventory_reserved_units_total").increment(u64::from(quantity));
        Ok(record)
    }

    /// Returns `quantity` previously held units to availability.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, key: &StockKey, quantity: u32) -> Result<InventoryRecord> {
        let record = self.mutate(key, |r| r.release(quantity)).await?;
        metrics::counter!("inventory_released_units_total").increment(u64::from(quantity));
        Ok(record)
    }

    /// Converts `quantity` held units into a permanent on-hand decrement.
    #[tracing::instrument(skip(self))]
    pub async fn commit(&self, key: &StockKey, quantity: u32) -> Result<InventoryRecord> {
        self.mutate(key, |r| r.commit(quantity)).await
    }

    /// Adjusts the on-hand count (restock, RMA return, correction).
    #[tracing::instrument(skip(self))]
    pub async fn adjust_on_hand(&self, key: &StockKey, delta: i64) -> Result<InventoryRecord> {
        self.mutate(key, |r| r.adjust_on_hand(delta)).await
    }

    /// Changes the reorder point.
    #[tracing::instrument(skip(self))]
    pub async fn set_reorder_point(&self, key: &StockKey, reorder_point: i64) -> Result<InventoryRecord> {
        self.mutate(key, |r| {
            r.set_reorder_point(reorder_point);
            Ok(())
        })
        .await
    }

    /// Withdraws the product from sale at this warehouse.
    #[tracing::instrument(skip(self))]
    pub async fn discontinue(&self, key: &StockKey) -> Result<InventoryRecord> {
        self.mutate(key, |r| {
            r.discontinue();
            Ok(())
        })
        .await
    }

    /// Lifts a discontinued override.
    #[tracing::instrument(skip(self))]
    pub async fn reinstate(&self, key: &StockKey) -> Result<InventoryRecord> {
        self.mutate(key, |r| {
            r.reinstate();
            Ok(())
        })
        .await
    }

    /// Loads every inventory record.
    pub async fn list(&self) -> Result<Vec<InventoryRecord>> {
        Ok(self.repo.list().await?)
    }

    /// Applies a pure transition under the per-key compare-and-update
    /// protocol.
    ///
    /// The transition runs against a freshly loaded record on every
    /// attempt, so a retry never re-applies a stale mutation. Domain
    /// rejections are mapped into the workflow taxonomy and never retried;
    /// only version conflicts are.
    async fn mutate<F>(&self, key: &StockKey, transition: F) -> Result<InventoryRecord>
    where
        F: Fn(&mut InventoryRecord) -> std::result::Result<(), InventoryError>,
    {
        let key_str = key.to_string();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let mut record = self.repo.find(&key_str).await?.ok_or_else(|| {
                FulfillmentError::NotFound {
                    entity: "inventory record",
                    key: key_str.clone(),
                }
            })?;

            transition(&mut record).map_err(|e| match e {
                InventoryError::InsufficientStock {
                    stock_key,
                    requested,
                    available,
                } => FulfillmentError::insufficient(stock_key, requested, available),
                other => {
                    tracing::error!(key = %key_str, error = %other, "inventory invariant violation");
                    FulfillmentError::InvariantViolation(other)
                }
            })?;

            match self.repo.save(&mut record).await {
                Ok(()) => return Ok(record),
                Err(e) if e.is_version_conflict() => {
                    if attempt >= self.config.contention_retries {
                        metrics::counter!("inventory_contention_exhausted_total").increment(1);
                        tracing::warn!(key = %key_str, attempts = attempt, "contention budget exhausted");
                        return Err(FulfillmentError::Contention {
                            key: key_str,
                            attempts: attempt,
                        });
                    }
                    tokio::time::sleep(self.config.contention_backoff * attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_store::InMemoryRecordStore;

    fn ledger() -> InventoryLedger<InMemoryRecordStore> {
        InventoryLedger::new(InMemoryRecordStore::new(), FulfillmentConfig::for_tests())
    }

    fn key() -> StockKey {
        StockKey::new("SKU-X", "W1")
    }

    #[tokio::test]
    async fn create_and_get() {
        let ledger = ledger();
        ledger.create(key(), 10, 3).await.unwrap();

        let record = ledger.get(&key()).await.unwrap();
        assert_eq!(record.quantity_available(), 10);
    }

    #[tokio::test]
    async fn create_duplicate_key_fails() {
        let ledger = ledger();
        ledger.create(key(), 10, 3).await.unwrap();
        let result = ledger.create(key(), 5, 3).await;
        assert!(matches!(result, Err(FulfillmentError::Domain(_))));
    }

    #[tokio::test]
    async fn get_unknown_key_is_not_found() {
        let ledger = ledger();
        let result = ledger.get(&key()).await;
        assert!(matches!(result, Err(FulfillmentError::NotFound { .. })));
    }

    #[tokio::test]
    async fn reserve_five_of_ten_keeps_in_stock() {
        let ledger = ledger();
        ledger.create(key(), 10, 3).await.unwrap();

        let record = ledger.reserve(&key(), 5).await.unwrap();
        assert_eq!(record.quantity_available(), 5);
        assert_eq!(record.status(), domain::StockStatus::InStock);
    }

    #[tokio::test]
    async fn reserve_eleven_of_ten_fails_and_changes_nothing() {
        let ledger = ledger();
        ledger.create(key(), 10, 3).await.unwrap();

        let result = ledger.reserve(&key(), 11).await;
        assert!(matches!(
            result,
            Err(FulfillmentError::InsufficientStock { .. })
        ));

        let record = ledger.get(&key()).await.unwrap();
        assert_eq!(record.quantity_available(), 10);
        assert_eq!(record.quantity_reserved(), 0);
    }

    #[tokio::test]
    async fn over_release_is_invariant_violation() {
        let ledger = ledger();
        ledger.create(key(), 10, 3).await.unwrap();
        ledger.reserve(&key(), 2).await.unwrap();

        let result = ledger.release(&key(), 3).await;
        assert!(matches!(
            result,
            Err(FulfillmentError::InvariantViolation(_))
        ));

        let record = ledger.get(&key()).await.unwrap();
        assert_eq!(record.quantity_reserved(), 2);
    }

    #[tokio::test]
    async fn commit_converts_hold_to_sale() {
        let ledger = ledger();
        ledger.create(key(), 10, 3).await.unwrap();
        ledger.reserve(&key(), 4).await.unwrap();

        let record = ledger.commit(&key(), 4).await.unwrap();
        assert_eq!(record.quantity_on_hand(), 6);
        assert_eq!(record.quantity_reserved(), 0);
    }

    #[tokio::test]
    async fn concurrent_reserves_never_oversell() {
        let ledger = ledger();
        ledger.create(key(), 10, 0).await.unwrap();

        // 20 tasks racing to reserve 1 unit each against 10 available
        let mut handles = Vec::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.reserve(&StockKey::new("SKU-X", "W1"), 1).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(FulfillmentError::InsufficientStock { .. })
                | Err(FulfillmentError::Contention { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        let record = ledger.get(&key()).await.unwrap();
        assert_eq!(record.quantity_reserved() as usize, successes);
        assert!(successes <= 10);
        assert!(record.quantity_available() >= 0);
        assert!(record.invariant_holds());
    }

    #[tokio::test]
    async fn availability_invariant_holds_after_mixed_operations() {
        let ledger = ledger();
        ledger.create(key(), 50, 5).await.unwrap();

        ledger.reserve(&key(), 20).await.unwrap();
        ledger.release(&key(), 5).await.unwrap();
        ledger.commit(&key(), 10).await.unwrap();
        ledger.adjust_on_hand(&key(), 7).await.unwrap();
        let record = ledger.adjust_on_hand(&key(), -2).await.unwrap();

        assert!(record.invariant_holds());
        assert_eq!(
            record.quantity_available(),
            (record.quantity_on_hand() - record.quantity_reserved()).max(0)
        );
    }

    #[tokio::test]
    async fn discontinue_survives_restock() {
        let ledger = ledger();
        ledger.create(key(), 10, 3).await.unwrap();

        ledger.discontinue(&key()).await.unwrap();
        let record = ledger.adjust_on_hand(&key(), 100).await.unwrap();
        assert_eq!(record.status(), domain::StockStatus::Discontinued);

        let record = ledger.reinstate(&key()).await.unwrap();
        assert_eq!(record.status(), domain::StockStatus::InStock);
    }
}
