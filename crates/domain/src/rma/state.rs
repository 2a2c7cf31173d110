//! RMA state machine.

use serde::{Deserialize, Serialize};

/// The state of a return request in its lifecycle.
///
/// State transitions:
/// ```text
/// Requested ──┬──► Approved ──► Shipped ──► Received ──► Inspecting ──┬──► Refunded
///             │                                                       ├──► Replaced
///             └──► Rejected                                           └──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RmaState {
    /// Return requested by the customer.
    #[default]
    Requested,

    /// Return accepted; customer may ship the items back.
    Approved,

    /// Return declined (terminal).
    Rejected,

    /// Customer handed the items to the carrier.
    Shipped,

    /// Items arrived at the warehouse.
    Received,

    /// Items under inspection.
    Inspecting,

    /// Settled with a refund (terminal).
    Refunded,

    /// Settled with replacement stock (terminal).
    Replaced,

    /// Closed without refund or replacement (terminal).
    Closed,
}

impl RmaState {
    /// Returns true if the request can be approved in this state.
    pub fn can_approve(&self) -> bool {
        matches!(self, RmaState::Requested)
    }

    /// Returns true if the request can be rejected in this state.
    pub fn can_reject(&self) -> bool {
        matches!(self, RmaState::Requested)
    }

    /// Returns true if the return can be marked shipped in this state.
    pub fn can_mark_shipped(&self) -> bool {
        matches!(self, RmaState::Approved)
    }

    /// Returns true if the return can be marked received in this state.
    pub fn can_mark_received(&self) -> bool {
        matches!(self, RmaState::Shipped)
    }

    /// Returns true if inspection can begin in this state.
    pub fn can_inspect(&self) -> bool {
        matches!(self, RmaState::Received)
    }

    /// Returns true if a resolution can be recorded in this state.
    pub fn can_resolve(&self) -> bool {
        matches!(self, RmaState::Inspecting)
    }

    /// Returns true if this is a terminal state (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RmaState::Rejected | RmaState::Refunded | RmaState::Replaced | RmaState::Closed
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RmaState::Requested => "requested",
            RmaState::Approved => "approved",
            RmaState::Rejected => "rejected",
            RmaState::Shipped => "shipped",
            RmaState::Received => "received",
            RmaState::Inspecting => "inspecting",
            RmaState::Refunded => "refunded",
            RmaState::Replaced => "replaced",
            RmaState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for RmaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
