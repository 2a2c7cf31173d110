//! Cart snapshot types: items, computed totals, shipping details.

use serde::{Deserialize, Serialize};

use crate::types::{Money, ProductId, StockKey, WarehouseId};

/// An item in the cart snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// The product identifier.
    pub product_id: ProductId,

    /// The warehouse the units ship from.
    pub warehouse_id: WarehouseId,

    /// Human-readable product name.
    pub product_name: String,

    /// Quantity ordered.
    pub quantity: u32,

    /// Price per unit at the time of checkout.
    pub unit_price: Money,
}

impl CartItem {
    /// Creates a new cart item.
    pub fn new(
        product_id: impl Into<ProductId>,
        warehouse_id: impl Into<WarehouseId>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            warehouse_id: warehouse_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns the total price for this item (quantity * unit_price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    /// Returns the (product, warehouse) key for this item.
    pub fn stock_key(&self) -> StockKey {
        StockKey {
            product_id: self.product_id.clone(),
            warehouse_id: self.warehouse_id.clone(),
        }
    }
}

/// Computed totals for a cart snapshot.
///
/// Invariant: `total = subtotal + tax + shipping - discount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CartTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub total: Money,
}

impl CartTotals {
    /// Computes totals from the item lines and the given charges.
    pub fn compute(items: &[CartItem], tax: Money, shipping: Money, discount: Money) -> Self {
        let subtotal: Money = items.iter().map(|item| item.total_price()).sum();
        Self {
            subtotal,
            tax,
            shipping,
            discount,
            total: subtotal + tax + shipping - discount,
        }
    }

    /// Returns true if the totals invariant holds.
    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal + self.tax + self.shipping - self.discount
    }
}

/// Where the order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub recipient: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<CartItem> {
        vec![
            CartItem::new("SKU-001", "W1", "Widget", 2, Money::from_cents(1000)),
            CartItem::new("SKU-002", "W1", "Gadget", 1, Money::from_cents(2500)),
        ]
    }

    #[test]
    fn item_total_price() {
        let item = CartItem::new("SKU-001", "W1", "Widget", 3, Money::from_cents(1000));
        assert_eq!(item.total_price().cents(), 3000);
    }

    #[test]
    fn compute_totals() {
        let totals = CartTotals::compute(
            &items(),
            Money::from_cents(450),
            Money::from_cents(500),
            Money::from_cents(200),
        );

        assert_eq!(totals.subtotal.cents(), 4500);
        assert_eq!(totals.total.cents(), 4500 + 450 + 500 - 200);
        assert!(totals.is_consistent());
    }

    #[test]
    fn compute_totals_with_no_charges() {
        let totals = CartTotals::compute(&items(), Money::zero(), Money::zero(), Money::zero());
        assert_eq!(totals.total, totals.subtotal);
        assert!(totals.is_consistent());
    }

    #[test]
    fn tampered_totals_are_inconsistent() {
        let mut totals = CartTotals::compute(
            &items(),
            Money::from_cents(450),
            Money::zero(),
            Money::zero(),
        );
        totals.total = Money::from_cents(1);
        assert!(!totals.is_consistent());
    }

    #[test]
    fn cart_item_serialization_roundtrip() {
        let item = CartItem::new("SKU-001", "W1", "Widget", 2, Money::from_cents(999));
        let json = serde_json::to_string(&item).unwrap();
        let deserialized: CartItem = serde_json::from_str(&json).unwrap();
        assert_eq!(item, deserialized);
    }
}
