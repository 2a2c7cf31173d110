//! Escrow endpoints: queries, releases, disputes, conditions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{Actor, Escrow, Money};
use record_store::RecordStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

use super::AppState;
use super::checkouts::parse_record_id;

// -- Request types --

#[derive(Deserialize)]
pub struct ReleaseRequest {
    pub amount_cents: i64,
    pub actor: String,
}

#[derive(Deserialize)]
pub struct DisputeRequest {
    pub reason: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct EscrowResponse {
    pub transaction_id: String,
    pub amount_cents: i64,
    pub status: String,
    pub released_cents: i64,
    pub refunded_cents: i64,
    pub remaining_cents: i64,
    pub releases: Vec<ReleaseResponse>,
    pub conditions: Vec<ConditionResponse>,
    pub all_conditions_met: bool,
    pub dispute_reason: Option<String>,
}

#[derive(Serialize)]
pub struct ReleaseResponse {
    pub amount_cents: i64,
    pub released_at: String,
    pub actor: String,
}

#[derive(Serialize)]
pub struct ConditionResponse {
    pub kind: String,
    pub description: String,
    pub met: bool,
}

impl EscrowResponse {
    fn from_escrow(escrow: &Escrow) -> Self {
        Self {
            transaction_id: escrow.transaction_id().to_string(),
            amount_cents: escrow.amount().cents(),
            status: escrow.status().to_string(),
            released_cents: escrow.released_total().cents(),
            refunded_cents: escrow.refunded_amount().cents(),
            remaining_cents: escrow.remaining().cents(),
            releases: escrow
                .releases()
                .iter()
                .map(|release| ReleaseResponse {
                    amount_cents: release.amount.cents(),
                    released_at: release.released_at.to_rfc3339(),
                    actor: release.actor.to_string(),
                })
                .collect(),
            conditions: escrow
                .conditions()
                .iter()
                .map(|condition| ConditionResponse {
                    kind: condition.kind.as_str().to_string(),
                    description: condition.description.clone(),
                    met: condition.met,
                })
                .collect(),
            all_conditions_met: escrow.all_conditions_met(),
            dispute_reason: escrow.dispute().map(|d| d.reason.clone()),
        }
    }
}

// -- Handlers --

/// GET /escrows/:transaction_id — load the escrow for a transaction.
#[tracing::instrument(skip(state))]
pub async fn get<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<EscrowResponse>, ApiError> {
    let transaction_id = parse_record_id(&id)?;
    let escrow = state.escrow.get(transaction_id).await?;
    Ok(Json(EscrowResponse::from_escrow(&escrow)))
}

/// POST /escrows/:transaction_id/releases — record a (partial) release.
#[tracing::instrument(skip(state, req))]
pub async fn record_release<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<EscrowResponse>, ApiError> {
    let transaction_id = parse_record_id(&id)?;
    let escrow = state
        .escrow
        .record_release(
            transaction_id,
            Money::from_cents(req.amount_cents),
            Actor::new(req.actor),
        )
        .await?;
    Ok(Json(EscrowResponse::from_escrow(&escrow)))
}

/// POST /escrows/:transaction_id/dispute — open a dispute.
#[tracing::instrument(skip(state, req))]
pub async fn open_dispute<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<DisputeRequest>,
) -> Result<Json<EscrowResponse>, ApiError> {
    let transaction_id = parse_record_id(&id)?;
    let escrow = state.escrow.open_dispute(transaction_id, req.reason).await?;
    Ok(Json(EscrowResponse::from_escrow(&escrow)))
}

/// POST /escrows/:transaction_id/dispute/resolve — resolve the open
/// dispute.
#[tracing::instrument(skip(state))]
pub async fn resolve_dispute<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<EscrowResponse>, ApiError> {
    let transaction_id = parse_record_id(&id)?;
    let escrow = state.escrow.resolve_dispute(transaction_id).await?;
    Ok(Json(EscrowResponse::from_escrow(&escrow)))
}

/// POST /escrows/:transaction_id/conditions/:index/met — mark a release
/// condition met (driven by the external scheduler).
#[tracing::instrument(skip(state))]
pub async fn mark_condition_met<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<EscrowResponse>, ApiError> {
    let transaction_id = parse_record_id(&id)?;
    let escrow = state.escrow.mark_condition_met(transaction_id, index).await?;
    Ok(Json(EscrowResponse::from_escrow(&escrow)))
}
