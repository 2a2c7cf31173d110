//! Inventory endpoints: registration, stock queries, adjustments.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{InventoryRecord, StockKey};
use record_store::RecordStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

use super::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateInventoryRequest {
    pub product_id: String,
    pub warehouse_id: String,
    pub quantity_on_hand: i64,
    #[serde(default)]
    pub reorder_point: i64,
}

#[derive(Deserialize)]
pub struct AdjustRequest {
    pub delta: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct InventoryResponse {
    pub product_id: String,
    pub warehouse_id: String,
    pub quantity_on_hand: i64,
    pub quantity_reserved: i64,
    pub quantity_available: i64,
    pub reorder_point: i64,
    pub status: String,
}

impl InventoryResponse {
    fn from_record(record: &InventoryRecord) -> Self {
        Self {
            product_id: record.product_id.to_string(),
            warehouse_id: record.warehouse_id.to_string(),
            quantity_on_hand: record.quantity_on_hand(),
            quantity_reserved: record.quantity_reserved(),
            quantity_available: record.quantity_available(),
            reorder_point: record.reorder_point(),
            status: record.status().to_string(),
        }
    }
}

// -- Handlers --

/// POST /inventory — register a (product, warehouse) record.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateInventoryRequest>,
) -> Result<(axum::http::StatusCode, Json<InventoryResponse>), ApiError> {
    if req.quantity_on_hand < 0 {
        return Err(ApiError::BadRequest(
            "quantity_on_hand must not be negative".to_string(),
        ));
    }

    let record = state
        .ledger
        .create(
            StockKey::new(req.product_id, req.warehouse_id),
            req.quantity_on_hand,
            req.reorder_point,
        )
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(InventoryResponse::from_record(&record)),
    ))
}

/// GET /inventory — list all inventory records.
#[tracing::instrument(skip(state))]
pub async fn list<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<InventoryResponse>>, ApiError> {
    let records = state.ledger.list().await?;
    Ok(Json(
        records.iter().map(InventoryResponse::from_record).collect(),
    ))
}

/// GET /inventory/:warehouse_id/:product_id — stock level for one pair.
#[tracing::instrument(skip(state))]
pub async fn get<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((warehouse_id, product_id)): Path<(String, String)>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let record = state
        .ledger
        .get(&StockKey::new(product_id, warehouse_id))
        .await?;
    Ok(Json(InventoryResponse::from_record(&record)))
}

/// POST /inventory/:warehouse_id/:product_id/adjust — restock or correct
/// the on-hand count.
#[tracing::instrument(skip(state, req))]
pub async fn adjust<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((warehouse_id, product_id)): Path<(String, String)>,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let record = state
        .ledger
        .adjust_on_hand(&StockKey::new(product_id, warehouse_id), req.delta)
        .await?;
    Ok(Json(InventoryResponse::from_record(&record)))
}

/// POST /inventory/:warehouse_id/:product_id/discontinue — withdraw from
/// sale.
#[tracing::instrument(skip(state))]
pub async fn discontinue<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((warehouse_id, product_id)): Path<(String, String)>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let record = state
        .ledger
        .discontinue(&StockKey::new(product_id, warehouse_id))
        .await?;
    Ok(Json(InventoryResponse::from_record(&record)))
}
