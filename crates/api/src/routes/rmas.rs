//! RMA endpoints: request, approval, shipment chain, inspection.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{Actor, ItemCondition, Money, ReturnLine, Rma};
use fulfillment::RmaResolution;
use record_store::RecordStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

use super::AppState;
use super::checkouts::parse_record_id;

// -- Request types --

#[derive(Deserialize)]
pub struct RequestRmaRequest {
    pub order_id: String,
    pub reason: String,
    pub items: Vec<ReturnLineRequest>,
}

#[derive(Deserialize)]
pub struct ReturnLineRequest {
    pub product_id: String,
    pub warehouse_id: String,
    pub quantity: u32,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ActorRequest {
    pub actor: String,
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub actor: String,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ShipRequest {
    pub actor: String,
    pub tracking_number: String,
}

#[derive(Deserialize)]
pub struct InspectRequest {
    pub actor: String,
    pub passed: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub conditions: Vec<ItemCondition>,
    pub resolution: ResolutionRequest,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolutionRequest {
    Refund { amount_cents: i64 },
    Replacement,
    Credit,
}

impl From<ResolutionRequest> for RmaResolution {
    fn from(req: ResolutionRequest) -> Self {
        match req {
            ResolutionRequest::Refund { amount_cents } => RmaResolution::Refund {
                amount: Money::from_cents(amount_cents),
            },
            ResolutionRequest::Replacement => RmaResolution::Replacement,
            ResolutionRequest::Credit => RmaResolution::Credit,
        }
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct RmaResponse {
    pub rma_number: String,
    pub order_id: String,
    pub state: String,
    pub reason: String,
    pub auto_approved: bool,
    pub tracking_number: Option<String>,
    pub items: Vec<ReturnLineResponse>,
    pub inspection_passed: Option<bool>,
    pub resolution: Option<ResolutionResponse>,
    pub history: Vec<TransitionResponse>,
}

#[derive(Serialize)]
pub struct ReturnLineResponse {
    pub product_id: String,
    pub warehouse_id: String,
    pub quantity: u32,
    pub reason: String,
    pub condition: Option<ItemCondition>,
}

#[derive(Serialize)]
pub struct ResolutionResponse {
    pub kind: String,
    pub refund_cents: Option<i64>,
    pub actor: String,
    pub resolved_at: String,
}

#[derive(Serialize)]
pub struct TransitionResponse {
    pub from: String,
    pub to: String,
    pub actor: String,
    pub at: String,
}

impl RmaResponse {
    fn from_rma(rma: &Rma) -> Self {
        Self {
            rma_number: rma.rma_number().to_string(),
            order_id: rma.order_id().to_string(),
            state: rma.state().to_string(),
            reason: rma.reason().to_string(),
            auto_approved: rma.auto_approved(),
            tracking_number: rma.tracking_number().map(String::from),
            items: rma
                .items()
                .iter()
                .map(|line| ReturnLineResponse {
                    product_id: line.product_id.to_string(),
                    warehouse_id: line.warehouse_id.to_string(),
                    quantity: line.quantity,
                    reason: line.reason.clone(),
                    condition: line.condition,
                })
                .collect(),
            inspection_passed: rma.inspection().map(|report| report.passed),
            resolution: rma.resolution().map(|resolution| ResolutionResponse {
                kind: format!("{:?}", resolution.kind).to_lowercase(),
                refund_cents: resolution.refund_amount.map(|m| m.cents()),
                actor: resolution.actor.to_string(),
                resolved_at: resolution.resolved_at.to_rfc3339(),
            }),
            history: rma
                .history()
                .iter()
                .map(|transition| TransitionResponse {
                    from: transition.from.to_string(),
                    to: transition.to.to_string(),
                    actor: transition.actor.to_string(),
                    at: transition.at.to_rfc3339(),
                })
                .collect(),
        }
    }
}

// -- Handlers --

/// POST /rmas — open a return request.
#[tracing::instrument(skip(state, req))]
pub async fn request<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<RequestRmaRequest>,
) -> Result<(axum::http::StatusCode, Json<RmaResponse>), ApiError> {
    let order_id = parse_record_id(&req.order_id)?;
    let items: Vec<ReturnLine> = req
        .items
        .iter()
        .map(|line| {
            ReturnLine::new(
                line.product_id.as_str(),
                line.warehouse_id.as_str(),
                line.quantity,
                line.reason.as_str(),
            )
        })
        .collect();

    let rma = state.rmas.request(order_id, items, req.reason).await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(RmaResponse::from_rma(&rma)),
    ))
}

/// GET /rmas/:rma_number — load an RMA.
#[tracing::instrument(skip(state))]
pub async fn get<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(rma_number): Path<String>,
) -> Result<Json<RmaResponse>, ApiError> {
    let rma = state.rmas.get(&rma_number).await?;
    Ok(Json(RmaResponse::from_rma(&rma)))
}

/// POST /rmas/:rma_number/approve — approve the return (policy gated).
#[tracing::instrument(skip(state, req))]
pub async fn approve<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(rma_number): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<RmaResponse>, ApiError> {
    let rma = state
        .rmas
        .approve(&rma_number, Actor::new(req.actor))
        .await?;
    Ok(Json(RmaResponse::from_rma(&rma)))
}

/// POST /rmas/:rma_number/reject — reject the return.
#[tracing::instrument(skip(state, req))]
pub async fn reject<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(rma_number): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<RmaResponse>, ApiError> {
    let rma = state
        .rmas
        .reject(&rma_number, Actor::new(req.actor), req.reason)
        .await?;
    Ok(Json(RmaResponse::from_rma(&rma)))
}

/// POST /rmas/:rma_number/ship — record the customer's return shipment.
#[tracing::instrument(skip(state, req))]
pub async fn ship<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(rma_number): Path<String>,
    Json(req): Json<ShipRequest>,
) -> Result<Json<RmaResponse>, ApiError> {
    let rma = state
        .rmas
        .mark_shipped(&rma_number, &req.tracking_number, Actor::new(req.actor))
        .await?;
    Ok(Json(RmaResponse::from_rma(&rma)))
}

/// POST /rmas/:rma_number/receive — record warehouse receipt.
#[tracing::instrument(skip(state, req))]
pub async fn receive<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(rma_number): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<RmaResponse>, ApiError> {
    let rma = state
        .rmas
        .mark_received(&rma_number, Actor::new(req.actor))
        .await?;
    Ok(Json(RmaResponse::from_rma(&rma)))
}

/// POST /rmas/:rma_number/inspect — inspect and settle the return.
#[tracing::instrument(skip(state, req))]
pub async fn inspect<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(rma_number): Path<String>,
    Json(req): Json<InspectRequest>,
) -> Result<Json<RmaResponse>, ApiError> {
    let rma = state
        .rmas
        .receive_and_inspect(
            &rma_number,
            req.passed,
            &req.notes,
            &req.conditions,
            req.resolution.into(),
            Actor::new(req.actor),
        )
        .await?;
    Ok(Json(RmaResponse::from_rma(&rma)))
}
