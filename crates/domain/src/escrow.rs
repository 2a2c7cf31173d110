//! Escrow: funds held against a transaction until release conditions are met.

use chrono::{DateTime, Utc};
use common::RecordId;
use record_store::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::Entity;
use crate::types::{Actor, Money};

/// The status of an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Full amount held, nothing released.
    #[default]
    Held,

    /// Part of the amount released.
    PartialRelease,

    /// Full amount released (terminal).
    Released,

    /// Amount refunded back to the payer (terminal).
    Refunded,

    /// Dispute open; releases blocked until resolved.
    Disputed,
}

impl EscrowStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowStatus::Released | EscrowStatus::Refunded)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Held => "held",
            EscrowStatus::PartialRelease => "partial_release",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
            EscrowStatus::Disputed => "disputed",
        }
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur on escrow operations.
#[derive(Debug, Error)]
pub enum EscrowError {
    /// A release or refund would exceed the held amount. The release list
    /// is unchanged.
    #[error("Over-release: requested {requested}, only {remaining} remaining in escrow")]
    OverRelease { requested: Money, remaining: Money },

    /// The escrow is not in a state that allows the operation.
    #[error("Invalid escrow state: cannot {action} from {current} state")]
    InvalidState {
        current: EscrowStatus,
        action: &'static str,
    },

    /// The held amount must be positive.
    #[error("Invalid escrow amount: {amount}")]
    InvalidAmount { amount: Money },

    /// Condition index out of range.
    #[error("No release condition at index {index}")]
    ConditionOutOfRange { index: usize },
}

/// How a release condition is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// A configured holding period elapsed.
    TimeElapsed,

    /// An external event (delivery confirmation) occurred.
    EventOccurred,

    /// A human approved the release.
    ManualApproval,

    /// Released automatically once every other condition is met.
    Auto,
}

impl ConditionKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::TimeElapsed => "time_elapsed",
            ConditionKind::EventOccurred => "event_occurred",
            ConditionKind::ManualApproval => "manual_approval",
            ConditionKind::Auto => "auto",
        }
    }
}

/// One release condition, independently markable met.
///
/// The ledger records the flag; evaluation (timers, event feeds) is driven
/// by the external scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCondition {
    /// How this condition is satisfied.
    pub kind: ConditionKind,

    /// Human-readable description ("release 7 days after delivery").
    pub description: String,

    /// Whether the condition has been met.
    pub met: bool,

    /// When it was met.
    pub met_at: Option<DateTime<Utc>>,
}

impl ReleaseCondition {
    /// Creates an unmet condition.
    pub fn new(kind: ConditionKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            met: false,
            met_at: None,
        }
    }
}

/// One recorded release against the held amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    /// How much was released.
    pub amount: Money,

    /// When the release was recorded.
    pub released_at: DateTime<Utc>,

    /// Who recorded it.
    pub actor: Actor,
}

/// An open or resolved dispute on the escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    /// Why the dispute was opened.
    pub reason: String,

    /// When it was opened.
    pub opened_at: DateTime<Utc>,

    /// When it was resolved, if it has been.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Funds held against one transaction (1:1).
///
/// Invariant: `sum(releases) + refunded_amount <= amount` at all times; an
/// operation that would break it fails and changes nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escrow {
    /// The transaction the funds are held against.
    transaction_id: RecordId,

    /// The held amount.
    amount: Money,

    /// Current status.
    status: EscrowStatus,

    /// Ordered list of recorded releases.
    releases: Vec<ReleaseEntry>,

    /// Total refunded back to the payer.
    refunded_amount: Money,

    /// Release conditions, each independently markable met.
    conditions: Vec<ReleaseCondition>,

    /// The most recent dispute, open or resolved.
    dispute: Option<Dispute>,

    /// When the funds were placed in escrow.
    held_at: DateTime<Utc>,

    /// Stored version for optimistic concurrency.
    #[serde(default)]
    version: Version,
}

impl Entity for Escrow {
    fn collection() -> &'static str {
        "escrows"
    }

    fn key(&self) -> String {
        self.transaction_id.to_string()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

// Query methods
impl Escrow {
    /// Returns the transaction ID.
    pub fn transaction_id(&self) -> RecordId {
        self.transaction_id
    }

    /// Returns the held amount.
    pub fn amount(&self) -> Money {
        self.amount
    }

    /// Returns the current status.
    pub fn status(&self) -> EscrowStatus {
        self.status
    }

    /// Returns the recorded releases, oldest first.
    pub fn releases(&self) -> &[ReleaseEntry] {
        &self.releases
    }

    /// Returns the sum of recorded releases.
    pub fn released_total(&self) -> Money {
        self.releases.iter().map(|r| r.amount).sum()
    }

    /// Returns the total refunded.
    pub fn refunded_amount(&self) -> Money {
        self.refunded_amount
    }

    /// Returns the amount still held (not released, not refunded).
    pub fn remaining(&self) -> Money {
        self.amount - self.released_total() - self.refunded_amount
    }

    /// Returns the release conditions.
    pub fn conditions(&self) -> &[ReleaseCondition] {
        &self.conditions
    }

    /// Pure query: true if every condition is met (vacuously true when no
    /// conditions are configured).
    pub fn all_conditions_met(&self) -> bool {
        self.conditions.iter().all(|c| c.met)
    }

    /// Returns the current dispute, open or resolved.
    pub fn dispute(&self) -> Option<&Dispute> {
        self.dispute.as_ref()
    }

    /// Returns true if a dispute is open.
    pub fn is_disputed(&self) -> bool {
        matches!(self.status, EscrowStatus::Disputed)
    }

    /// Returns when the funds were placed in escrow.
    pub fn held_at(&self) -> DateTime<Utc> {
        self.held_at
    }
}

// Operations
impl Escrow {
    /// Places `amount` in escrow against a transaction.
    pub fn hold(
        transaction_id: RecordId,
        amount: Money,
        conditions: Vec<ReleaseCondition>,
    ) -> Result<Self, EscrowError> {
        if !amount.is_positive() {
            return Err(EscrowError::InvalidAmount { amount });
        }
        Ok(Self {
            transaction_id,
            amount,
            status: EscrowStatus::Held,
            releases: Vec::new(),
            refunded_amount: Money::zero(),
            conditions,
            dispute: None,
            held_at: Utc::now(),
            version: Version::initial(),
        })
    }

    /// Records a release of `amount` to the payee.
    ///
    /// Fails with `OverRelease` (list unchanged) if the cumulative released
    /// and refunded amount would exceed the hold; blocked while disputed.
    pub fn record_release(&mut self, amount: Money, actor: Actor) -> Result<(), EscrowError> {
        match self.status {
            EscrowStatus::Disputed => {
                return Err(EscrowError::InvalidState {
                    current: self.status,
                    action: "record release",
                });
            }
            EscrowStatus::Released | EscrowStatus::Refunded => {
                return Err(EscrowError::InvalidState {
                    current: self.status,
                    action: "record release",
                });
            }
            EscrowStatus::Held | EscrowStatus::PartialRelease => {}
        }
        if !amount.is_positive() {
            return Err(EscrowError::InvalidAmount { amount });
        }

        let remaining = self.remaining();
        if amount > remaining {
            return Err(EscrowError::OverRelease {
                requested: amount,
                remaining,
            });
        }

        self.releases.push(ReleaseEntry {
            amount,
            released_at: Utc::now(),
            actor,
        });
        self.status = if self.remaining().is_zero() {
            EscrowStatus::Released
        } else {
            EscrowStatus::PartialRelease
        };
        Ok(())
    }

    /// Refunds `amount` back to the payer.
    ///
    /// Bounded by the same invariant as releases. A refund is allowed while
    /// a dispute is open (it is how disputes commonly resolve) and moves the
    /// escrow to `Refunded` once nothing is left to move.
    pub fn refund(&mut self, amount: Money) -> Result<(), EscrowError> {
        if self.status.is_terminal() {
            return Err(EscrowError::InvalidState {
                current: self.status,
                action: "refund",
            });
        }
        if !amount.is_positive() {
            return Err(EscrowError::InvalidAmount { amount });
        }

        let remaining = self.remaining();
        if amount > remaining {
            return Err(EscrowError::OverRelease {
                requested: amount,
                remaining,
            });
        }

        self.refunded_amount += amount;
        if self.remaining().is_zero() {
            self.status = EscrowStatus::Refunded;
        } else if !self.is_disputed() {
            self.status = if self.releases.is_empty() {
                EscrowStatus::Held
            } else {
                EscrowStatus::PartialRelease
            };
        }
        Ok(())
    }

    /// Opens a dispute, blocking further releases.
    ///
    /// Fails if the escrow has already fully released or refunded, or if a
    /// dispute is already open.
    pub fn open_dispute(&mut self, reason: impl Into<String>) -> Result<(), EscrowError> {
        if self.status.is_terminal() {
            return Err(EscrowError::InvalidState {
                current: self.status,
                action: "open dispute",
            });
        }
        if self.is_disputed() {
            return Err(EscrowError::InvalidState {
                current: self.status,
                action: "open dispute",
            });
        }
        self.dispute = Some(Dispute {
            reason: reason.into(),
            opened_at: Utc::now(),
            resolved_at: None,
        });
        self.status = EscrowStatus::Disputed;
        Ok(())
    }

    /// Resolves the open dispute and restores the pre-dispute status.
    pub fn resolve_dispute(&mut self) -> Result<(), EscrowError> {
        if !self.is_disputed() {
            return Err(EscrowError::InvalidState {
                current: self.status,
                action: "resolve dispute",
            });
        }
        if let Some(dispute) = self.dispute.as_mut() {
            dispute.resolved_at = Some(Utc::now());
        }
        self.status = if self.releases.is_empty() {
            EscrowStatus::Held
        } else {
            EscrowStatus::PartialRelease
        };
        Ok(())
    }

    /// Marks the condition at `index` met. Idempotent per condition.
    pub fn mark_condition_met(&mut self, index: usize) -> Result<(), EscrowError> {
        let condition = self
            .conditions
            .get_mut(index)
            .ok_or(EscrowError::ConditionOutOfRange { index })?;
        if !condition.met {
            condition.met = true;
            condition.met_at = Some(Utc::now());
        }
        Ok(())
    }
}
