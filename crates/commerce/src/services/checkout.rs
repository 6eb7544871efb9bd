//! Checkout transaction: cart to order, atomically.
//!
//! Every precondition and every mutation runs inside one database
//! transaction whose opening statement is a write, so competing
//! checkouts serialize on the database write lock. Any precondition
//! failure drops the transaction and nothing is mutated.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use shoplite_core::{CartToken, Email, Money, ProductId};

use crate::config::CommerceConfig;
use crate::db::{
    CartRepository, CouponRepository, OrderDraft, OrderRepository, ProductRepository,
    UserRepository,
};
use crate::error::{CommerceError, Result};
use crate::identity::Identity;
use crate::models::{NewOrder, OrderDetail};
use crate::services::coupons::{check_eligibility, compute_discount};
use crate::services::notifications::{NotificationSink, order_confirmation_message};
use crate::services::CartService;

/// The order-creation operation.
pub struct CheckoutService<'a, S> {
    pool: &'a SqlitePool,
    config: &'a CommerceConfig,
    sink: &'a S,
}

struct OrderOwnerInfo {
    guest_full_name: String,
    guest_email: String,
    recipient: Email,
}

impl<'a, S: NotificationSink> CheckoutService<'a, S> {
    /// Create a new checkout service.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool, config: &'a CommerceConfig, sink: &'a S) -> Self {
        Self { pool, config, sink }
    }

    /// Convert the caller's cart into an order.
    ///
    /// Preconditions, checked in order: the cart has items, the
    /// subtotal meets the configured minimum, a supplied coupon exists
    /// and is eligible, and every line fits current stock. Only then is
    /// anything written: stock decrements, the order snapshot, the
    /// coupon counter, and the cart retirement commit as one unit.
    ///
    /// The confirmation email is sent after commit, best-effort.
    ///
    /// # Errors
    ///
    /// Each failed precondition maps to its own `CommerceError` kind;
    /// none of them leave partial state behind.
    pub async fn checkout(
        &self,
        identity: Identity,
        cart_token: Option<&CartToken>,
        input: &NewOrder,
    ) -> Result<OrderDetail> {
        let owner = self.resolve_owner(identity, input).await?;
        let cart = CartService::new(self.pool)
            .resolve(identity, cart_token)
            .await?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Opening write; also fences out a cart that a concurrent
        // checkout already closed.
        if !CartRepository::touch_open_tx(&mut tx, cart.id, now).await? {
            return Err(CommerceError::Conflict("Cart is already checked out.".to_owned()));
        }

        let lines = CartRepository::lines_for_checkout_tx(&mut tx, cart.id).await?;
        if lines.is_empty() {
            return Err(CommerceError::Validation("Cart is empty.".to_owned()));
        }

        let subtotal = lines
            .iter()
            .map(|line| line.unit_price.times(line.quantity))
            .sum::<Money>()
            .round2();
        if subtotal < self.config.min_order_amount {
            return Err(CommerceError::MinimumOrderNotMet);
        }

        let code = input.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let coupon = match code {
            Some(code) => {
                let Some(coupon) = CouponRepository::get_by_code_tx(&mut tx, code).await? else {
                    return Err(CommerceError::CouponInvalid);
                };
                let restricted_to =
                    CouponRepository::applicable_product_ids_tx(&mut tx, coupon.id).await?;
                let cart_product_ids: Vec<ProductId> =
                    lines.iter().map(|line| line.product_id).collect();
                check_eligibility(&coupon, subtotal, &cart_product_ids, &restricted_to, now)
                    .map_err(|reason| CommerceError::CouponIneligible(reason.to_owned()))?;
                Some(coupon)
            }
            None => None,
        };
        let discount = coupon
            .as_ref()
            .map_or_else(|| Money::ZERO.round2(), |c| compute_discount(c, subtotal));
        let total = (subtotal - discount).round2().floor_zero();

        // All lines are checked before any stock is touched, so a late
        // failure cannot leave earlier lines decremented.
        for line in &lines {
            if line.quantity > line.stock_quantity {
                return Err(CommerceError::InsufficientStock(format!(
                    "Insufficient stock for {}.",
                    line.product_name
                )));
            }
        }
        for line in &lines {
            let decremented =
                ProductRepository::decrement_stock_tx(&mut tx, line.product_id, line.quantity, now)
                    .await?;
            if !decremented {
                return Err(CommerceError::InsufficientStock(format!(
                    "Insufficient stock for {}.",
                    line.product_name
                )));
            }
        }

        let draft = OrderDraft {
            user_id: identity.user_id(),
            guest_full_name: owner.guest_full_name,
            guest_email: owner.guest_email,
            coupon_id: coupon.as_ref().map(|c| c.id),
            subtotal_amount: subtotal,
            discount_amount: discount,
            total_amount: total,
        };
        let order = OrderRepository::insert_order_tx(&mut tx, &draft, now).await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = OrderRepository::insert_item_tx(
                &mut tx,
                order.id,
                line.product_id,
                &line.product_name,
                line.quantity,
                line.unit_price,
                now,
            )
            .await?;
            items.push(item);
        }

        if let Some(coupon) = &coupon {
            if !CouponRepository::increment_usage_tx(&mut tx, coupon.id, now).await? {
                return Err(CommerceError::CouponIneligible(
                    "Coupon is expired or disabled.".to_owned(),
                ));
            }
        }

        CartRepository::retire_tx(&mut tx, cart.id, now).await?;
        tx.commit().await?;

        info!(order = %order.id, total = %order.total_amount, "order created");

        let detail = OrderDetail { order, items };
        let message =
            order_confirmation_message(&self.config.from_email, &owner.recipient, &detail);
        if let Err(err) = self.sink.send(message).await {
            warn!(order = %detail.order.id, error = %err, "order confirmation send failed");
        }
        Ok(detail)
    }

    /// Resolve who the order belongs to and where its mail goes.
    async fn resolve_owner(
        &self,
        identity: Identity,
        input: &NewOrder,
    ) -> Result<OrderOwnerInfo> {
        match identity {
            Identity::User(user_id) => {
                let user = UserRepository::new(self.pool)
                    .get(user_id)
                    .await?
                    .ok_or_else(|| CommerceError::NotFound("User not found.".to_owned()))?;
                Ok(OrderOwnerInfo {
                    guest_full_name: String::new(),
                    guest_email: String::new(),
                    recipient: user.email,
                })
            }
            Identity::Guest => {
                let full_name = input
                    .guest_full_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|name| !name.is_empty());
                let email = input
                    .guest_email
                    .as_deref()
                    .map(str::trim)
                    .filter(|email| !email.is_empty());
                let (Some(full_name), Some(email)) = (full_name, email) else {
                    return Err(CommerceError::Validation(
                        "Guest checkout requires full name and email.".to_owned(),
                    ));
                };
                let email: Email = email.parse().map_err(|_| {
                    CommerceError::Validation("Enter a valid email address.".to_owned())
                })?;
                Ok(OrderOwnerInfo {
                    guest_full_name: full_name.to_owned(),
                    guest_email: email.to_string(),
                    recipient: email,
                })
            }
        }
    }
}
