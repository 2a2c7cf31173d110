//! RMA (Return Merchandise Authorization) aggregate and related types.

mod aggregate;
mod state;

pub use aggregate::{InspectionReport, Resolution, ReturnLine, Rma, StateTransition};
pub use state::RmaState;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Condition of a returned item as declared or observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    /// Unopened, resellable as-is.
    New,

    /// Opened but undamaged.
    Opened,

    /// Physically damaged.
    Damaged,

    /// Does not function as specified.
    Defective,
}

impl ItemCondition {
    /// Returns true if the item can go back into sellable stock.
    pub fn is_restockable(&self) -> bool {
        matches!(self, ItemCondition::New | ItemCondition::Opened)
    }
}

/// How an accepted return is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    /// Money back through the escrow/refund path.
    Refund,

    /// Replacement stock reserved and shipped.
    Replacement,

    /// Store credit issued; the RMA closes.
    Credit,
}

impl ResolutionKind {
    /// Returns the terminal state this resolution drives the RMA to.
    pub fn terminal_state(&self) -> RmaState {
        match self {
            ResolutionKind::Refund => RmaState::Refunded,
            ResolutionKind::Replacement => RmaState::Replaced,
            ResolutionKind::Credit => RmaState::Closed,
        }
    }
}

/// Errors that can occur during RMA operations.
#[derive(Debug, Error)]
pub enum RmaError {
    /// The RMA is not in a state that allows the transition.
    #[error("Invalid RMA transition: cannot {action} from {current} state")]
    InvalidTransition {
        current: RmaState,
        action: &'static str,
    },

    /// A resolution record already exists; at most one is ever produced.
    #[error("RMA {rma_number} already has a resolution")]
    ResolutionExists { rma_number: String },

    /// A return must name at least one line.
    #[error("Return has no items")]
    EmptyReturn,
}
