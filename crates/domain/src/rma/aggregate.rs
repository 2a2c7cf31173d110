//! RMA aggregate implementation.

use chrono::{DateTime, Utc};
use common::RecordId;
use record_store::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::Entity;
use crate::types::{Actor, Money, ProductId, StockKey, WarehouseId};

use super::{ItemCondition, ResolutionKind, RmaError, RmaState};

/// One returned line: quantity of a product with the declared reason and,
/// after inspection, its observed condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLine {
    /// The returned product.
    pub product_id: ProductId,

    /// The warehouse the units go back to.
    pub warehouse_id: WarehouseId,

    /// Units returned.
    pub quantity: u32,

    /// Why the customer is returning it.
    pub reason: String,

    /// Observed condition, set during inspection.
    pub condition: Option<ItemCondition>,
}

impl ReturnLine {
    /// Creates a return line.
    pub fn new(
        product_id: impl Into<ProductId>,
        warehouse_id: impl Into<WarehouseId>,
        quantity: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            warehouse_id: warehouse_id.into(),
            quantity,
            reason: reason.into(),
            condition: None,
        }
    }

    /// Returns the (product, warehouse) key for this return line.
    pub fn stock_key(&self) -> StockKey {
        StockKey {
            product_id: self.product_id.clone(),
            warehouse_id: self.warehouse_id.clone(),
        }
    }
}

/// The inspection outcome recorded when the items are examined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionReport {
    /// Whether the return passed inspection.
    pub passed: bool,

    /// Inspector's notes.
    pub notes: String,

    /// When the inspection happened.
    pub inspected_at: DateTime<Utc>,
}

/// The single resolution record produced for a settled return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// How the return was settled.
    pub kind: ResolutionKind,

    /// Amount refunded, for refund resolutions.
    pub refund_amount: Option<Money>,

    /// Who settled it.
    pub actor: Actor,

    /// When it was settled.
    pub resolved_at: DateTime<Utc>,
}

/// One attributable state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: RmaState,
    pub to: RmaState,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

/// Return Merchandise Authorization aggregate root.
///
/// Keyed by its unique RMA number. Every transition is recorded with the
/// acting party and timestamp; at most one resolution record is ever
/// produced, and terminal states accept no further transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rma {
    /// Unique RMA number ("RMA-1A2B3C4D").
    rma_number: String,

    /// The order being returned against (non-owning back-reference).
    order_id: RecordId,

    /// Current state.
    state: RmaState,

    /// The returned lines.
    items: Vec<ReturnLine>,

    /// Customer-stated reason for the return.
    reason: String,

    /// Whether approval came from the automatic policy verdict.
    auto_approved: bool,

    /// Carrier tracking number once the customer ships.
    tracking_number: Option<String>,

    /// Inspection outcome, once inspected.
    inspection: Option<InspectionReport>,

    /// The resolution record, once settled.
    resolution: Option<Resolution>,

    /// Attributable transition history, oldest first.
    history: Vec<StateTransition>,

    /// When the return was requested.
    requested_at: DateTime<Utc>,

    /// Stored version for optimistic concurrency.
    #[serde(default)]
    version: Version,
}

impl Entity for Rma {
    fn collection() -> &'static str {
        "rmas"
    }

    fn key(&self) -> String {
        self.rma_number.clone()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

// Query methods
impl Rma {
    /// Returns the RMA number.
    pub fn rma_number(&self) -> &str {
        &self.rma_number
    }

    /// Returns the order this return is against.
    pub fn order_id(&self) -> RecordId {
        self.order_id
    }

    /// Returns the current state.
    pub fn state(&self) -> RmaState {
        self.state
    }

    /// Returns the returned lines.
    pub fn items(&self) -> &[ReturnLine] {
        &self.items
    }

    /// Returns the customer-stated reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns true if approval came from the automatic policy verdict.
    pub fn auto_approved(&self) -> bool {
        self.auto_approved
    }

    /// Returns the tracking number, if shipped.
    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    /// Returns the inspection report, if inspected.
    pub fn inspection(&self) -> Option<&InspectionReport> {
        self.inspection.as_ref()
    }

    /// Returns the resolution record, if settled.
    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    /// Returns the attributable transition history.
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Returns when the return was requested.
    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    /// Returns true if the RMA is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

// Transitions
impl Rma {
    /// Creates a return request in `Requested`.
    pub fn request(
        order_id: RecordId,
        items: Vec<ReturnLine>,
        reason: impl Into<String>,
    ) -> Result<Self, RmaError> {
        if items.is_empty() {
            return Err(RmaError::EmptyReturn);
        }
        Ok(Self {
            rma_number: generate_rma_number(),
            order_id,
            state: RmaState::Requested,
            items,
            reason: reason.into(),
            auto_approved: false,
            tracking_number: None,
            inspection: None,
            resolution: None,
            history: Vec::new(),
            requested_at: Utc::now(),
            version: Version::initial(),
        })
    }

    /// Approves the return. `auto` marks a policy-driven auto-approval.
    pub fn approve(&mut self, actor: Actor, auto: bool) -> Result<(), RmaError> {
        if !self.state.can_approve() {
            return Err(self.invalid("approve"));
        }
        self.auto_approved = auto;
        self.transition(RmaState::Approved, actor);
        Ok(())
    }

    /// Rejects the return (terminal).
    pub fn reject(&mut self, actor: Actor, reason: impl Into<String>) -> Result<(), RmaError> {
        if !self.state.can_reject() {
            return Err(self.invalid("reject"));
        }
        self.reason = format!("{} (rejected: {})", self.reason, reason.into());
        self.transition(RmaState::Rejected, actor);
        Ok(())
    }

    /// Records the customer's shipment.
    pub fn mark_shipped(
        &mut self,
        tracking_number: impl Into<String>,
        actor: Actor,
    ) -> Result<(), RmaError> {
        if !self.state.can_mark_shipped() {
            return Err(self.invalid("mark shipped"));
        }
        self.tracking_number = Some(tracking_number.into());
        self.transition(RmaState::Shipped, actor);
        Ok(())
    }

    /// Records arrival at the warehouse.
    pub fn mark_received(&mut self, actor: Actor) -> Result<(), RmaError> {
        if !self.state.can_mark_received() {
            return Err(self.invalid("mark received"));
        }
        self.transition(RmaState::Received, actor);
        Ok(())
    }

    /// Records the inspection outcome and per-line conditions, moving to
    /// `Inspecting`.
    ///
    /// `conditions` pairs up with the return lines by position; shorter
    /// slices leave the remaining lines unassessed.
    pub fn inspect(
        &mut self,
        passed: bool,
        notes: impl Into<String>,
        conditions: &[ItemCondition],
        actor: Actor,
    ) -> Result<(), RmaError> {
        if !self.state.can_inspect() {
            return Err(self.invalid("inspect"));
        }
        for (line, condition) in self.items.iter_mut().zip(conditions) {
            line.condition = Some(*condition);
        }
        self.inspection = Some(InspectionReport {
            passed,
            notes: notes.into(),
            inspected_at: Utc::now(),
        });
        self.transition(RmaState::Inspecting, actor);
        Ok(())
    }

    /// Settles the return with the given resolution, producing exactly one
    /// resolution record and moving to the matching terminal state.
    pub fn resolve(
        &mut self,
        kind: ResolutionKind,
        refund_amount: Option<Money>,
        actor: Actor,
    ) -> Result<(), RmaError> {
        if !self.state.can_resolve() {
            return Err(self.invalid("resolve"));
        }
        if self.resolution.is_some() {
            return Err(RmaError::ResolutionExists {
                rma_number: self.rma_number.clone(),
            });
        }
        self.resolution = Some(Resolution {
            kind,
            refund_amount,
            actor: actor.clone(),
            resolved_at: Utc::now(),
        });
        self.transition(kind.terminal_state(), actor);
        Ok(())
    }

    /// Closes the return without a resolution record (failed inspection).
    pub fn close(&mut self, actor: Actor) -> Result<(), RmaError> {
        if !self.state.can_resolve() {
            return Err(self.invalid("close"));
        }
        self.transition(RmaState::Closed, actor);
        Ok(())
    }

    /// Lines that passed inspection in restockable condition.
    pub fn restockable_lines(&self) -> impl Iterator<Item = &ReturnLine> {
        self.items
            .iter()
            .filter(|line| line.condition.is_some_and(|c| c.is_restockable()))
    }

    fn transition(&mut self, next: RmaState, actor: Actor) {
        self.history.push(StateTransition {
            from: self.state,
            to: next,
            actor,
            at: Utc::now(),
        });
        self.state = next;
    }

    fn invalid(&self, action: &'static str) -> RmaError {
        RmaError::InvalidTransition {
            current: self.state,
            action,
        }
    }
}

fn generate_rma_number() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("RMA-{}", uuid[..8].to_uppercase())
}
