//! Order snapshot entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shoplite_core::{CouponId, Money, OrderId, OrderItemId, OrderStatus, ProductId, UserId};

/// An immutable order snapshot.
///
/// Only `status` ever changes after creation, and only along
/// pending -> shipped | cancelled. The coupon reference is kept even if
/// the coupon is later edited; the amounts here are authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub guest_full_name: String,
    pub guest_email: String,
    pub status: OrderStatus,
    pub coupon_id: Option<CouponId>,
    pub subtotal_amount: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One product line frozen into an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    /// Unit price at purchase time, copied from the cart line.
    pub unit_price: Money,
    /// `unit_price` times `quantity`, quantized to 2 places.
    pub line_total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Checkout input for creating an order from the active cart.
#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    /// Coupon code to apply, if any. Blank is treated as absent.
    pub coupon_code: Option<String>,
    /// Required for guest checkout.
    pub guest_full_name: Option<String>,
    /// Required for guest checkout.
    pub guest_email: Option<String>,
}
