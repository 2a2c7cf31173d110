//! HTTP API server with observability for the fulfillment core.
//!
//! Provides REST endpoints for checkout, inventory, escrow, and RMA
//! operations, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use fulfillment::{
    CheckoutService, EscrowLedger, ExpirySweeper, FulfillmentConfig, InMemoryPaymentProcessor,
    InMemoryPolicyEngine, InventoryLedger, ReservationManager, RmaWorkflow,
};
use metrics_exporter_prometheus::PrometheusHandle;
use record_store::RecordStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: RecordStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkouts", post(routes::checkouts::initiate::<S>))
        .route("/checkouts/{id}", get(routes::checkouts::get::<S>))
        .route("/checkouts/{id}/refund", post(routes::checkouts::refund::<S>))
        .route("/webhooks/payment", post(routes::checkouts::payment_webhook::<S>))
        .route("/reservations/{id}", get(routes::checkouts::get_reservation::<S>))
        .route(
            "/reservations/{id}/extend",
            post(routes::checkouts::extend_reservation::<S>),
        )
        .route("/inventory", post(routes::inventory::create::<S>))
        .route("/inventory", get(routes::inventory::list::<S>))
        .route(
            "/inventory/{warehouse_id}/{product_id}",
            get(routes::inventory::get::<S>),
        )
        .route(
            "/inventory/{warehouse_id}/{product_id}/adjust",
            post(routes::inventory::adjust::<S>),
        )
        .route(
            "/inventory/{warehouse_id}/{product_id}/discontinue",
            post(routes::inventory::discontinue::<S>),
        )
        .route("/escrows/{id}", get(routes::escrows::get::<S>))
        .route("/escrows/{id}/releases", post(routes::escrows::record_release::<S>))
        .route("/escrows/{id}/dispute", post(routes::escrows::open_dispute::<S>))
        .route(
            "/escrows/{id}/dispute/resolve",
            post(routes::escrows::resolve_dispute::<S>),
        )
        .route(
            "/escrows/{id}/conditions/{index}/met",
            post(routes::escrows::mark_condition_met::<S>),
        )
        .route("/rmas", post(routes::rmas::request::<S>))
        .route("/rmas/{rma_number}", get(routes::rmas::get::<S>))
        .route("/rmas/{rma_number}/approve", post(routes::rmas::approve::<S>))
        .route("/rmas/{rma_number}/reject", post(routes::rmas::reject::<S>))
        .route("/rmas/{rma_number}/ship", post(routes::rmas::ship::<S>))
        .route("/rmas/{rma_number}/receive", post(routes::rmas::receive::<S>))
        .route("/rmas/{rma_number}/inspect", post(routes::rmas::inspect::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state with in-memory collaborator
/// services, plus the sweeper for the caller to spawn.
pub fn create_default_state<S: RecordStore + Clone + 'static>(
    store: S,
    config: FulfillmentConfig,
) -> (Arc<AppState<S>>, ExpirySweeper<S>) {
    let ledger = InventoryLedger::new(store.clone(), config.clone());
    let reservations = ReservationManager::new(store.clone(), ledger.clone(), config.clone());
    let escrow = EscrowLedger::new(store.clone());
    let payments = InMemoryPaymentProcessor::new();
    let policy = InMemoryPolicyEngine::new();

    let checkouts = CheckoutService::new(
        store.clone(),
        reservations.clone(),
        escrow.clone(),
        payments.clone(),
        policy.clone(),
        config.clone(),
    );
    let rmas = RmaWorkflow::new(
        store.clone(),
        ledger.clone(),
        reservations.clone(),
        escrow.clone(),
        policy,
    );
    let sweeper = ExpirySweeper::new(store, reservations.clone(), config);

    let state = Arc::new(AppState {
        checkouts,
        reservations,
        ledger,
        escrow,
        rmas,
        payments,
    });

    (state, sweeper)
}
