//! Reservation manager: all-or-nothing multi-line holds with TTL.

use chrono::{DateTime, Utc};
use common::RecordId;
use domain::{Entity, Repository, Reservation, ReservationLine};
use futures_util::StreamExt;
use record_store::RecordStore;

use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, InsufficientLine, Result};
use crate::ledger::InventoryLedger;

/// Creates, extends, releases, and sweeps inventory reservations.
///
/// A multi-line reservation is not one atomic transaction across keys: each
/// line reserves independently, and on any failure the lines already
/// reserved in the same call are released again (compensating rollback), so
/// a failed call leaves zero net reservation.
pub struct ReservationManager<S>
where
    S: RecordStore + Clone,
{
    repo: Repository<S, Reservation>,
    ledger: InventoryLedger<S>,
    config: FulfillmentConfig,
}

impl<S> Clone for ReservationManager<S>
where
    S: RecordStore + Clone,
{
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            ledger: self.ledger.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S> ReservationManager<S>
where
    S: RecordStore + Clone,
{
    /// Creates a new manager sharing the ledger's store.
    pub fn new(store: S, ledger: InventoryLedger<S>, config: FulfillmentConfig) -> Self {
        Self {
            repo: Repository::new(store),
            ledger,
            config,
        }
    }

    /// Returns the inventory ledger this manager reserves against.
    pub fn ledger(&self) -> &InventoryLedger<S> {
        &self.ledger
    }

    /// Takes an all-or-nothing hold on every line for a checkout.
    ///
    /// On failure the reserved prefix is rolled back and the error names
    /// every line that fell short (the failing line, plus a read-only probe
    /// of the remaining lines).
    #[tracing::instrument(skip(self, lines), fields(line_count = lines.len()))]
    pub async fn create(
        &self,
        checkout_id: RecordId,
        lines: Vec<ReservationLine>,
    ) -> Result<Reservation> {
        metrics::counter!("reservations_attempted_total").increment(1);

        let mut reserved: Vec<&ReservationLine> = Vec::with_capacity(lines.len());
        let mut failure: Option<FulfillmentError> = None;
        let mut failed_at: usize = 0;

        for (index, line) in lines.iter().enumerate() {
            match self.ledger.reserve(&line.stock_key(), line.quantity).await {
                Ok(_) => reserved.push(line),
                Err(e) => {
                    failure = Some(e);
                    failed_at = index;
                    break;
                }
            }
        }

        let Some(failure) = failure else {
            let mut reservation = Reservation::new(
                RecordId::new(),
                checkout_id,
                lines,
                Utc::now(),
                self.config.reservation_ttl,
            );
            self.repo.insert(&mut reservation).await?;
            metrics::counter!("reservations_created_total").increment(1);
            return Ok(reservation);
        };

        // Compensating rollback: return the already-reserved prefix. A
        // release that fails here is logged for reconciliation; the rollback
        // keeps going.
        for line in reserved {
            if let Err(e) = self.ledger.release(&line.stock_key(), line.quantity).await {
                metrics::counter!("reservation_rollback_failures_total").increment(1);
                tracing::error!(
                    stock_key = %line.stock_key(),
                    quantity = line.quantity,
                    error = %e,
                    "rollback release failed, manual reconciliation required"
                );
            }
        }

        metrics::counter!("reservations_rejected_total").increment(1);

        match failure {
            FulfillmentError::InsufficientStock { lines: mut failing } => {
                // Name every short line, not just the first: probe the rest
                // read-only. Availability may shift under us; this is a
                // best-effort diagnostic, the rollback above is what matters.
                for line in &lines[failed_at + 1..] {
                    if let Ok(record) = self.ledger.get(&line.stock_key()).await
                        && i64::from(line.quantity) > record.quantity_available()
                    {
                        failing.push(InsufficientLine {
                            stock_key: line.stock_key().to_string(),
                            requested: line.quantity,
                            available: record.quantity_available(),
                        });
                    }
                }
                Err(FulfillmentError::InsufficientStock { lines: failing })
            }
            other => Err(other),
        }
    }

    /// Loads a reservation by ID.
    pub async fn get(&self, reservation_id: RecordId) -> Result<Reservation> {
        self.repo
            .find(&reservation_id.to_string())
            .await?
            .ok_or_else(|| FulfillmentError::NotFound {
                entity: "reservation",
                key: reservation_id.to_string(),
            })
    }

    /// Pushes a held reservation's expiry out by the configured TTL.
    ///
    /// A reservation that was already released, consumed, or expired is
    /// reported as `NotFound`: from the caller's perspective the hold no
    /// longer exists.
    #[tracing::instrument(skip(self))]
    pub async fn extend(&self, reservation_id: RecordId) -> Result<Reservation> {
        let mut reservation = self.get(reservation_id).await?;
        if !reservation.status().is_held() {
            return Err(FulfillmentError::NotFound {
                entity: "reservation",
                key: reservation_id.to_string(),
            });
        }
        reservation
            .extend(Utc::now(), self.config.reservation_ttl)
            .map_err(FulfillmentError::from)?;
        self.repo.save(&mut reservation).await?;
        Ok(reservation)
    }

    /// Releases a reservation, returning its units to availability.
    ///
    /// Idempotent: releasing a reservation that is no longer held is a
    /// no-op. The status flip is persisted first (claiming the release
    /// under the version check) and only the winner touches the ledger, so
    /// a release racing a completion can never double-return units.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, reservation_id: RecordId) -> Result<Reservation> {
        loop {
            let mut reservation = self.get(reservation_id).await?;
            if !reservation.release() {
                // Already released/consumed/expired: nothing to do.
                return Ok(reservation);
            }

            match self.repo.save(&mut reservation).await {
                Ok(()) => {
                    self.return_units(&reservation).await;
                    metrics::counter!("reservations_released_total").increment(1);
                    return Ok(reservation);
                }
                Err(e) if e.is_version_conflict() => {
                    // Lost the claim; reload and re-check the status.
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Consumes a held reservation: every line becomes a permanent on-hand
    /// decrement (checkout completed).
    ///
    /// Consuming a non-held reservation is an error, not a no-op: it means
    /// a completion raced a release or sweep and lost.
    #[tracing::instrument(skip(self))]
    pub async fn consume(&self, reservation_id: RecordId) -> Result<Reservation> {
        loop {
            let mut reservation = self.get(reservation_id).await?;
            reservation.consume().map_err(FulfillmentError::from)?;

            match self.repo.save(&mut reservation).await {
                Ok(()) => {
                    for line in reservation.lines() {
                        if let Err(e) =
                            self.ledger.commit(&line.stock_key(), line.quantity).await
                        {
                            metrics::counter!("reservation_commit_failures_total").increment(1);
                            tracing::error!(
                                stock_key = %line.stock_key(),
                                quantity = line.quantity,
                                error = %e,
                                "commit failed after consume, manual reconciliation required"
                            );
                        }
                    }
                    metrics::counter!("reservations_consumed_total").increment(1);
                    return Ok(reservation);
                }
                Err(e) if e.is_version_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Scans for held reservations past their expiry and releases them.
    ///
    /// Returns the reservations this sweep expired, so the caller can
    /// abandon the owning checkouts. Safe against concurrent completions:
    /// the expiry claim is a compare-and-update, and a reservation that
    /// completes between scan and claim is simply skipped.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let mut stream = self
            .repo
            .store()
            .stream_collection(Reservation::collection())
            .await
            .map_err(domain::DomainError::from)?;

        let mut swept = Vec::new();

        while let Some(record) = stream.next().await {
            let record = record.map_err(domain::DomainError::from)?;
            let version = record.version;
            let mut reservation: Reservation = serde_json::from_value(record.payload)?;
            reservation.set_version(version);

            if !reservation.is_expired(now) {
                continue;
            }

            if !reservation.mark_expired() {
                continue;
            }

            match self.repo.save(&mut reservation).await {
                Ok(()) => {
                    self.return_units(&reservation).await;
                    metrics::counter!("reservations_expired_total").increment(1);
                    swept.push(reservation);
                }
                Err(e) if e.is_version_conflict() => {
                    // A completion or release won the race; leave it alone.
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(swept)
    }

    /// Returns every line's units to availability, logging (not failing)
    /// lines that cannot be released.
    async fn return_units(&self, reservation: &Reservation) {
        for line in reservation.lines() {
            if let Err(e) = self.ledger.release(&line.stock_key(), line.quantity).await {
                metrics::counter!("reservation_release_failures_total").increment(1);
                tracing::error!(
                    reservation_id = %reservation.id(),
                    stock_key = %line.stock_key(),
                    quantity = line.quantity,
                    error = %e,
                    "release failed, manual reconciliation required"
                );
            }
        }
    }
}
