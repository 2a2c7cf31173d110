//! Checkout state machine.

use serde::{Deserialize, Serialize};

/// The state of a checkout in its lifecycle.
///
/// State transitions:
/// ```text
/// Initiated ──► PaymentPending ──► Processing ──► Completed ──► Refunded
///     │               │                │
///     └───────────────┴────────────────┴──► Failed | Abandoned
/// ```
///
/// Transitions are driven only by payment-processor outcomes or the TTL
/// sweep; `Completed → Refunded` is driven by the refund workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    /// Checkout created, inventory reservation taken.
    #[default]
    Initiated,

    /// Payment intent created with the external processor.
    PaymentPending,

    /// Processor reported the payment; awaiting settlement.
    Processing,

    /// Settlement confirmed; reservation consumed (terminal, except refund).
    Completed,

    /// Processor declined or timed out; reservation released (terminal).
    Failed,

    /// Reservation TTL elapsed before completion (terminal).
    Abandoned,

    /// Completed checkout later refunded (terminal).
    Refunded,
}

impl CheckoutState {
    /// Returns true if a payment intent can be created in this state.
    pub fn can_begin_payment(&self) -> bool {
        matches!(self, CheckoutState::Initiated)
    }

    /// Returns true if the processor webhook can move the checkout to
    /// processing.
    pub fn can_start_processing(&self) -> bool {
        matches!(self, CheckoutState::PaymentPending)
    }

    /// Returns true if settlement can complete the checkout.
    pub fn can_complete(&self) -> bool {
        matches!(self, CheckoutState::Processing)
    }

    /// Returns true if the checkout can fail from this state.
    pub fn can_fail(&self) -> bool {
        matches!(
            self,
            CheckoutState::Initiated | CheckoutState::PaymentPending | CheckoutState::Processing
        )
    }

    /// Returns true if the checkout can be abandoned from this state.
    pub fn can_abandon(&self) -> bool {
        self.can_fail()
    }

    /// Returns true if the checkout can be refunded from this state.
    pub fn can_refund(&self) -> bool {
        matches!(self, CheckoutState::Completed)
    }

    /// Returns true if this is a terminal state.
    ///
    /// `Completed` counts as terminal: the only transition out of it is the
    /// externally driven refund, which `can_refund` gates separately.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckoutState::Completed
                | CheckoutState::Failed
                | CheckoutState::Abandoned
                | CheckoutState::Refunded
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::Initiated => "initiated",
            CheckoutState::PaymentPending => "payment_pending",
            CheckoutState::Processing => "processing",
            CheckoutState::Completed => "completed",
            CheckoutState::Failed => "failed",
            CheckoutState::Abandoned => "abandoned",
            CheckoutState::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_initiated() {
        assert_eq!(CheckoutState::default(), CheckoutState::Initiated);
    }

    #[test]
    fn initiated_can_begin_payment() {
        assert!(CheckoutState::Initiated.can_begin_payment());
        assert!(!CheckoutState::PaymentPending.can_begin_payment());
        assert!(!CheckoutState::Processing.can_begin_payment());
        assert!(!CheckoutState::Completed.can_begin_payment());
        assert!(!CheckoutState::Failed.can_begin_payment());
    }

    #[test]
    fn payment_pending_can_start_processing() {
        assert!(!CheckoutState::Initiated.can_start_processing());
        assert!(CheckoutState::PaymentPending.can_start_processing());
        assert!(!CheckoutState::Processing.can_start_processing());
        assert!(!CheckoutState::Completed.can_start_processing());
    }

    #[test]
    fn processing_can_complete() {
        assert!(!CheckoutState::Initiated.can_complete());
        assert!(!CheckoutState::PaymentPending.can_complete());
        assert!(CheckoutState::Processing.can_complete());
        assert!(!CheckoutState::Completed.can_complete());
    }

    #[test]
    fn fail_and_abandon_from_non_terminal_states() {
        for state in [
            CheckoutState::Initiated,
            CheckoutState::PaymentPending,
            CheckoutState::Processing,
        ] {
            assert!(state.can_fail());
            assert!(state.can_abandon());
        }
        for state in [
            CheckoutState::Completed,
            CheckoutState::Failed,
            CheckoutState::Abandoned,
            CheckoutState::Refunded,
        ] {
            assert!(!state.can_fail());
            assert!(!state.can_abandon());
        }
    }

    #[test]
    fn only_completed_can_refund() {
        assert!(CheckoutState::Completed.can_refund());
        assert!(!CheckoutState::Processing.can_refund());
        assert!(!CheckoutState::Failed.can_refund());
        assert!(!CheckoutState::Refunded.can_refund());
    }

    #[test]
    fn terminal_states() {
        assert!(!CheckoutState::Initiated.is_terminal());
        assert!(!CheckoutState::PaymentPending.is_terminal());
        assert!(!CheckoutState::Processing.is_terminal());
        assert!(CheckoutState::Completed.is_terminal());
        assert!(CheckoutState::Failed.is_terminal());
        assert!(CheckoutState::Abandoned.is_terminal());
        assert!(CheckoutState::Refunded.is_terminal());
    }

    #[test]
    fn display_uses_snake_case() {
        assert_eq!(CheckoutState::PaymentPending.to_string(), "payment_pending");
        assert_eq!(CheckoutState::Abandoned.to_string(), "abandoned");
    }

    #[test]
    fn serialization_roundtrip() {
        let state = CheckoutState::PaymentPending;
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, "\"payment_pending\"");
        let deserialized: CheckoutState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
