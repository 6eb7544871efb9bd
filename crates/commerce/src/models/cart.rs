//! Cart aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shoplite_core::{CartId, CartItemId, CartToken, Money, ProductId, UserId};

/// A pre-purchase collection of product lines.
///
/// Owned by exactly one of an authenticated user or a guest token. An
/// open cart has `checked_out_at: None`; checkout sets the timestamp and
/// clears the lines, and the row is never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: Option<UserId>,
    pub guest_token: Option<CartToken>,
    pub checked_out_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Whether the cart is still open for mutation.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.checked_out_at.is_none()
    }
}

/// One product line in a cart; at most one per (cart, product) pair.
///
/// `unit_price` is a snapshot of the product price, refreshed on every
/// mutation of the line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart with its lines and computed totals, as handed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartView {
    pub id: CartId,
    /// Present for guest carts so the client can retain it.
    pub cart_token: Option<CartToken>,
    pub items: Vec<CartItem>,
    pub subtotal: Money,
    pub total_items: i64,
}

/// Cart subtotal: sum of unit price times quantity over all lines,
/// quantized once at the final sum.
#[must_use]
pub fn subtotal(items: &[CartItem]) -> Money {
    items
        .iter()
        .map(|item| item.unit_price.times(item.quantity))
        .sum::<Money>()
        .round2()
}

/// Total number of units across all lines (0 for an empty cart).
#[must_use]
pub fn total_items(items: &[CartItem]) -> i64 {
    items.iter().map(|item| item.quantity).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i64, unit_price: &str) -> CartItem {
        let now = Utc::now();
        CartItem {
            id: CartItemId::new(1),
            cart_id: CartId::new(1),
            product_id: ProductId::new(1),
            product_name: "item".to_owned(),
            quantity,
            unit_price: unit_price.parse().expect("decimal"),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_subtotal_empty() {
        assert_eq!(subtotal(&[]), Money::ZERO);
        assert_eq!(total_items(&[]), 0);
    }

    #[test]
    fn test_subtotal_rounds_final_sum_only() {
        // Each line is 3 x 0.335 = 1.005; three lines sum to 3.015,
        // which rounds (banker's) to 3.02. Per-line rounding first would
        // give 3.00.
        let items = vec![item(3, "0.335"), item(3, "0.335"), item(3, "0.335")];
        assert_eq!(subtotal(&items), "3.02".parse().expect("decimal"));
    }

    #[test]
    fn test_total_items_sums_quantities() {
        let items = vec![item(2, "1.00"), item(5, "2.00")];
        assert_eq!(total_items(&items), 7);
    }
}
