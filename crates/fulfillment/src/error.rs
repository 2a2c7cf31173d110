//! Workflow error taxonomy.

use domain::{
    CheckoutError, DomainError, EscrowError, InventoryError, ReservationError, RmaError,
};
use thiserror::Error;

/// One line that could not be reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsufficientLine {
    /// The (product, warehouse) key that fell short.
    pub stock_key: String,
    /// Units requested.
    pub requested: u32,
    /// Units that were available.
    pub available: i64,
}

impl std::fmt::Display for InsufficientLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (requested {}, available {})",
            self.stock_key, self.requested, self.available
        )
    }
}

/// Errors surfaced by the fulfillment workflows.
///
/// Recoverability follows a fixed policy: `InsufficientStock` is for the
/// caller to retry with a smaller quantity; `Contention` and
/// `ExternalTimeout` were already retried or timed out internally;
/// transition and invariant errors are never retried automatically.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Not enough stock to satisfy one or more reservation lines.
    #[error("Insufficient stock for {}", .lines.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(", "))]
    InsufficientStock { lines: Vec<InsufficientLine> },

    /// A bounded retry budget was exhausted on a contended record.
    #[error("Contention on {key}: gave up after {attempts} attempts")]
    Contention { key: String, attempts: u32 },

    /// The named entity does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// An internal consistency rule was violated. The failing mutation was
    /// rejected in full; persisted state is not corrupted.
    #[error("Invariant violation: {0}")]
    InvariantViolation(InventoryError),

    /// An external call did not answer within its deadline.
    #[error("External {service} call timed out")]
    ExternalTimeout { service: &'static str },

    /// The payment processor rejected or failed a request.
    #[error("Payment processor error: {0}")]
    PaymentProcessor(String),

    /// The policy engine denied the operation.
    #[error("Denied by policy: {reason}")]
    PolicyDenied { reason: String },

    /// Checkout transition error.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// Reservation transition error.
    #[error(transparent)]
    Reservation(#[from] ReservationError),

    /// Escrow operation error.
    #[error(transparent)]
    Escrow(#[from] EscrowError),

    /// RMA transition error.
    #[error(transparent)]
    Rma(#[from] RmaError),

    /// Persistence error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FulfillmentError {
    /// Builds an `InsufficientStock` error from a single failing line.
    pub fn insufficient(stock_key: String, requested: u32, available: i64) -> Self {
        FulfillmentError::InsufficientStock {
            lines: vec![InsufficientLine {
                stock_key,
                requested,
                available,
            }],
        }
    }

    /// Returns true if the caller may meaningfully retry the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FulfillmentError::InsufficientStock { .. } | FulfillmentError::Contention { .. }
        )
    }
}

/// Convenience type alias for workflow results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
