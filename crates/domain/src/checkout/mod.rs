//! Checkout aggregate and related types.

mod aggregate;
mod cart;
mod state;

pub use aggregate::Checkout;
pub use cart::{CartItem, CartTotals, ShippingInfo};
pub use state::CheckoutState;

use thiserror::Error;

/// Errors that can occur during checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The checkout is not in a state that allows the transition.
    #[error("Invalid checkout transition: cannot {action} from {current} state")]
    InvalidTransition {
        current: CheckoutState,
        action: &'static str,
    },

    /// The cart snapshot has no items.
    #[error("Checkout has no items")]
    EmptyCart,

    /// The cart totals do not satisfy
    /// `total = subtotal + tax + shipping - discount`.
    #[error("Cart totals are inconsistent: expected total {expected}, got {actual}")]
    TotalsMismatch {
        expected: crate::types::Money,
        actual: crate::types::Money,
    },

    /// An item carries a zero quantity.
    #[error("Invalid quantity for {product_id}: must be greater than 0")]
    InvalidQuantity { product_id: String },
}
