//! Checkout, payment webhook, and reservation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{IdempotencyKey, RecordId};
use domain::{CartItem, Checkout, CustomerId, Money, ShippingInfo};
use fulfillment::{InitiateCheckout, PaymentWebhook};
use record_store::RecordStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

use super::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct InitiateCheckoutRequest {
    pub idempotency_key: String,
    pub customer_id: Option<String>,
    pub items: Vec<CartItemRequest>,
    #[serde(default)]
    pub tax_cents: i64,
    #[serde(default)]
    pub shipping_cents: i64,
    #[serde(default)]
    pub discount_cents: i64,
    pub shipping: Option<ShippingInfo>,
}

#[derive(Deserialize)]
pub struct CartItemRequest {
    pub product_id: String,
    pub warehouse_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub id: String,
    pub idempotency_key: String,
    pub customer_id: String,
    pub state: String,
    pub items: Vec<CartItemResponse>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub reservation_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub failure_reason: Option<String>,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub product_id: String,
    pub warehouse_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Serialize)]
pub struct ReservationResponse {
    pub id: String,
    pub checkout_id: String,
    pub status: String,
    pub expires_at: String,
    pub lines: Vec<ReservationLineResponse>,
}

#[derive(Serialize)]
pub struct ReservationLineResponse {
    pub product_id: String,
    pub warehouse_id: String,
    pub quantity: u32,
}

impl CheckoutResponse {
    fn from_checkout(checkout: &Checkout) -> Self {
        let totals = checkout.totals();
        Self {
            id: checkout.id().to_string(),
            idempotency_key: checkout.idempotency_key().to_string(),
            customer_id: checkout.customer_id().to_string(),
            state: checkout.state().to_string(),
            items: checkout
                .items()
                .iter()
                .map(|item| CartItemResponse {
                    product_id: item.product_id.to_string(),
                    warehouse_id: item.warehouse_id.to_string(),
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                })
                .collect(),
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            shipping_cents: totals.shipping.cents(),
            discount_cents: totals.discount.cents(),
            total_cents: totals.total.cents(),
            reservation_id: checkout.reservation_id().map(|id| id.to_string()),
            payment_intent_id: checkout.payment_intent_id().map(String::from),
            failure_reason: checkout.failure_reason().map(String::from),
        }
    }
}

// -- Handlers --

/// POST /checkouts — initiate a checkout under an idempotency key.
#[tracing::instrument(skip(state, req))]
pub async fn initiate<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<InitiateCheckoutRequest>,
) -> Result<(axum::http::StatusCode, Json<CheckoutResponse>), ApiError> {
    if req.idempotency_key.is_empty() {
        return Err(ApiError::BadRequest(
            "idempotency_key must not be empty".to_string(),
        ));
    }

    let customer_id = if let Some(ref id_str) = req.customer_id {
        let uuid = uuid::Uuid::parse_str(id_str)
            .map_err(|e| ApiError::BadRequest(format!("Invalid customer_id: {e}")))?;
        CustomerId::from_uuid(uuid)
    } else {
        CustomerId::new()
    };

    let items: Vec<CartItem> = req
        .items
        .iter()
        .map(|item| {
            CartItem::new(
                item.product_id.as_str(),
                item.warehouse_id.as_str(),
                item.product_name.as_str(),
                item.quantity,
                Money::from_cents(item.unit_price_cents),
            )
        })
        .collect();

    let checkout = state
        .checkouts
        .initiate(InitiateCheckout {
            idempotency_key: IdempotencyKey::new(req.idempotency_key),
            customer_id,
            items,
            tax: Money::from_cents(req.tax_cents),
            shipping_cost: Money::from_cents(req.shipping_cents),
            discount: Money::from_cents(req.discount_cents),
            shipping: req.shipping,
        })
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(CheckoutResponse::from_checkout(&checkout)),
    ))
}

/// GET /checkouts/:id — load a checkout by ID.
#[tracing::instrument(skip(state))]
pub async fn get<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let checkout_id = parse_record_id(&id)?;
    let checkout = state.checkouts.get(checkout_id).await?;
    Ok(Json(CheckoutResponse::from_checkout(&checkout)))
}

/// POST /checkouts/:id/refund — refund a completed checkout.
#[tracing::instrument(skip(state))]
pub async fn refund<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let checkout_id = parse_record_id(&id)?;
    let checkout = state.checkouts.refund(checkout_id).await?;
    Ok(Json(CheckoutResponse::from_checkout(&checkout)))
}

/// POST /webhooks/payment — payment processor outcome delivery.
#[tracing::instrument(skip(state, webhook))]
pub async fn payment_webhook<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(webhook): Json<PaymentWebhook>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let checkout = state.checkouts.handle_payment_webhook(webhook).await?;
    Ok(Json(CheckoutResponse::from_checkout(&checkout)))
}

/// GET /reservations/:id — load a reservation by ID.
#[tracing::instrument(skip(state))]
pub async fn get_reservation<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let reservation_id = parse_record_id(&id)?;
    let reservation = state.reservations.get(reservation_id).await?;
    Ok(Json(reservation_response(&reservation)))
}

/// POST /reservations/:id/extend — push a held reservation's expiry out.
#[tracing::instrument(skip(state))]
pub async fn extend_reservation<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let reservation_id = parse_record_id(&id)?;
    let reservation = state.reservations.extend(reservation_id).await?;
    Ok(Json(reservation_response(&reservation)))
}

fn reservation_response(reservation: &domain::Reservation) -> ReservationResponse {
    ReservationResponse {
        id: reservation.id().to_string(),
        checkout_id: reservation.checkout_id().to_string(),
        status: reservation.status().to_string(),
        expires_at: reservation.expires_at().to_rfc3339(),
        lines: reservation
            .lines()
            .iter()
            .map(|line| ReservationLineResponse {
                product_id: line.product_id.to_string(),
                warehouse_id: line.warehouse_id.to_string(),
                quantity: line.quantity,
            })
            .collect(),
    }
}

pub(super) fn parse_record_id(id: &str) -> Result<RecordId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(RecordId::from(uuid))
}
