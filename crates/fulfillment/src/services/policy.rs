//! Policy/fraud rule engine trait and in-memory implementation.
//!
//! The engine is an external collaborator; the core treats its verdict as
//! an opaque allow/deny signal plus the auto-approve hint for returns.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{CustomerId, Money, Rma};

use crate::error::FulfillmentError;

/// Verdict for a checkout attempt.
#[derive(Debug, Clone)]
pub struct CheckoutScreening {
    /// Whether the checkout may proceed.
    pub allow: bool,

    /// Why it was denied, when it was.
    pub reason: Option<String>,

    /// Opaque risk flags carried along for audit.
    pub risk_flags: Vec<String>,
}

impl CheckoutScreening {
    /// An unconditional allow.
    pub fn allow() -> Self {
        Self {
            allow: true,
            reason: None,
            risk_flags: Vec::new(),
        }
    }
}

/// Verdict for a return request.
#[derive(Debug, Clone)]
pub struct ReturnScreening {
    /// Whether the return may be approved.
    pub allow: bool,

    /// Whether policy approves it without a human in the loop.
    pub auto_approve: bool,

    /// Why it was denied, when it was.
    pub reason: Option<String>,
}

/// Trait for policy engine operations.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Screens a checkout before any state is created.
    async fn screen_checkout(
        &self,
        customer_id: CustomerId,
        total: Money,
    ) -> Result<CheckoutScreening, FulfillmentError>;

    /// Screens a return before approval.
    async fn screen_return(&self, rma: &Rma) -> Result<ReturnScreening, FulfillmentError>;
}

#[derive(Debug, Default)]
struct InMemoryPolicyState {
    deny_checkout: Option<String>,
    deny_returns: Option<String>,
    auto_approve_returns: bool,
}

/// In-memory policy engine for testing. Allows everything by default.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPolicyEngine {
    state: Arc<RwLock<InMemoryPolicyState>>,
}

impl InMemoryPolicyEngine {
    /// Creates a new allow-all policy engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures checkout denial with the given reason.
    pub fn set_deny_checkout(&self, reason: Option<&str>) {
        self.state.write().unwrap().deny_checkout = reason.map(String::from);
    }

    /// Configures return denial with the given reason.
    pub fn set_deny_returns(&self, reason: Option<&str>) {
        self.state.write().unwrap().deny_returns = reason.map(String::from);
    }

    /// Configures returns to auto-approve.
    pub fn set_auto_approve_returns(&self, auto: bool) {
        self.state.write().unwrap().auto_approve_returns = auto;
    }
}

#[async_trait]
impl PolicyEngine for InMemoryPolicyEngine {
    async fn screen_checkout(
        &self,
        _customer_id: CustomerId,
        _total: Money,
    ) -> Result<CheckoutScreening, FulfillmentError> {
        let state = self.state.read().unwrap();
        match &state.deny_checkout {
            Some(reason) => Ok(CheckoutScreening {
                allow: false,
                reason: Some(reason.clone()),
                risk_flags: vec!["manual_review".to_string()],
            }),
            None => Ok(CheckoutScreening::allow()),
        }
    }

    async fn screen_return(&self, _rma: &Rma) -> Result<ReturnScreening, FulfillmentError> {
        let state = self.state.read().unwrap();
        match &state.deny_returns {
            Some(reason) => Ok(ReturnScreening {
                allow: false,
                auto_approve: false,
                reason: Some(reason.clone()),
            }),
            None => Ok(ReturnScreening {
                allow: true,
                auto_approve: state.auto_approve_returns,
                reason: None,
            }),
        }
    }
}
