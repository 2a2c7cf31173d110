//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{CheckoutError, DomainError, EscrowError, RmaError};
use fulfillment::FulfillmentError;
use record_store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Workflow error.
    Fulfillment(FulfillmentError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Fulfillment(err) => fulfillment_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn fulfillment_error_to_response(err: FulfillmentError) -> (StatusCode, String) {
    match &err {
        FulfillmentError::InsufficientStock { .. } => (StatusCode::CONFLICT, err.to_string()),
        FulfillmentError::Contention { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        FulfillmentError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        FulfillmentError::InvariantViolation(_) => {
            tracing::error!(error = %err, "invariant violation surfaced to API");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        FulfillmentError::ExternalTimeout { .. } => {
            (StatusCode::GATEWAY_TIMEOUT, err.to_string())
        }
        FulfillmentError::PaymentProcessor(_) => (StatusCode::BAD_GATEWAY, err.to_string()),
        FulfillmentError::PolicyDenied { .. } => (StatusCode::FORBIDDEN, err.to_string()),
        FulfillmentError::Checkout(checkout_err) => match checkout_err {
            CheckoutError::InvalidTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
            CheckoutError::EmptyCart
            | CheckoutError::TotalsMismatch { .. }
            | CheckoutError::InvalidQuantity { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        },
        FulfillmentError::Reservation(_) => (StatusCode::CONFLICT, err.to_string()),
        FulfillmentError::Escrow(escrow_err) => match escrow_err {
            EscrowError::OverRelease { .. } | EscrowError::InvalidState { .. } => {
                (StatusCode::CONFLICT, err.to_string())
            }
            EscrowError::InvalidAmount { .. } | EscrowError::ConditionOutOfRange { .. } => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
        },
        FulfillmentError::Rma(rma_err) => match rma_err {
            RmaError::InvalidTransition { .. } | RmaError::ResolutionExists { .. } => {
                (StatusCode::CONFLICT, err.to_string())
            }
            RmaError::EmptyReturn => (StatusCode::BAD_REQUEST, err.to_string()),
        },
        FulfillmentError::Domain(domain_err) => match domain_err {
            DomainError::EntityNotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
            DomainError::Store(StoreError::VersionConflict { .. }) => {
                (StatusCode::CONFLICT, err.to_string())
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        },
        FulfillmentError::Serialization(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}
