//! TTL sweep: reclaims expired reservations and abandons their checkouts.

use chrono::{DateTime, Utc};
use domain::{Checkout, Repository};
use record_store::RecordStore;

use crate::config::FulfillmentConfig;
use crate::error::Result;
use crate::reservations::ReservationManager;

/// Result of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Reservations released because their TTL elapsed.
    pub released: usize,

    /// Checkouts moved to abandoned as a consequence.
    pub abandoned: usize,
}

/// Timer-driven reaper for expired reservations.
///
/// One sweeper runs per deployment (the external scheduler's job in a
/// multi-instance setup); running it concurrently with in-flight
/// completions is safe because every expiry claim is a compare-and-update
/// on the reservation record.
pub struct ExpirySweeper<S>
where
    S: RecordStore + Clone,
{
    reservations: ReservationManager<S>,
    checkouts: Repository<S, Checkout>,
    config: FulfillmentConfig,
}

impl<S> ExpirySweeper<S>
where
    S: RecordStore + Clone,
{
    /// Creates a sweeper sharing the manager's store.
    pub fn new(store: S, reservations: ReservationManager<S>, config: FulfillmentConfig) -> Self {
        Self {
            reservations,
            checkouts: Repository::new(store),
            config,
        }
    }

    /// Runs one sweep pass against the given clock.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let swept = self.reservations.sweep(now).await?;
        let mut report = SweepReport {
            released: swept.len(),
            abandoned: 0,
        };

        for reservation in &swept {
            let checkout_id = reservation.checkout_id();
            match self.checkouts.find(&checkout_id.to_string()).await? {
                Some(mut checkout) if !checkout.is_terminal() => {
                    match checkout.abandon("reservation expired") {
                        Ok(()) => match self.checkouts.save(&mut checkout).await {
                            Ok(()) => {
                                report.abandoned += 1;
                                metrics::counter!("checkouts_abandoned_total").increment(1);
                                tracing::info!(%checkout_id, "checkout abandoned by sweep");
                            }
                            Err(e) if e.is_version_conflict() => {
                                // A webhook got there first; its outcome wins.
                                tracing::debug!(%checkout_id, "abandon lost race to live transition");
                            }
                            Err(e) => return Err(e.into()),
                        },
                        Err(e) => {
                            tracing::warn!(%checkout_id, error = %e, "abandon rejected");
                        }
                    }
                }
                _ => {}
            }
        }

        if report.released > 0 {
            tracing::info!(
                released = report.released,
                abandoned = report.abandoned,
                "sweep pass finished"
            );
        }
        Ok(report)
    }

    /// Runs the sweep on the configured interval until the task is
    /// dropped. Spawn this from the binary; tests call `run_once`.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once(Utc::now()).await {
                metrics::counter!("sweep_failures_total").increment(1);
                tracing::error!(error = %e, "sweep pass failed");
            }
        }
    }
}
