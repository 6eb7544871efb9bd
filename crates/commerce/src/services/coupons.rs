//! Coupon engine: eligibility rules, discount computation, management.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use shoplite_core::{CartToken, CouponId, DiscountType, Money, ProductId};

use crate::db::CouponRepository;
use crate::error::{CommerceError, Result};
use crate::identity::Identity;
use crate::models::{Coupon, NewCoupon};
use crate::services::CartService;

/// Check whether a coupon can be applied to a cart.
///
/// Rules are evaluated in a fixed order and the first failure wins:
/// disabled, outside the validity window, usage limit exhausted,
/// subtotal below the minimum, product restriction disjoint from the
/// cart. `restricted_to` is the coupon's product restriction; empty
/// means it applies to everything.
///
/// # Errors
///
/// Returns the ineligibility reason as shown to the caller.
pub fn check_eligibility(
    coupon: &Coupon,
    subtotal: Money,
    cart_product_ids: &[ProductId],
    restricted_to: &[ProductId],
    now: DateTime<Utc>,
) -> std::result::Result<(), &'static str> {
    let expired = "Coupon is expired or disabled.";
    if !coupon.is_enabled {
        return Err(expired);
    }
    if now < coupon.start_at || now > coupon.end_at {
        return Err(expired);
    }
    if coupon.usage_limit.is_some_and(|limit| coupon.times_used >= limit) {
        return Err(expired);
    }
    if subtotal < coupon.minimum_cart_value {
        return Err("Minimum cart value not met for this coupon.");
    }
    if !restricted_to.is_empty()
        && !cart_product_ids.iter().any(|id| restricted_to.contains(id))
    {
        return Err("Coupon is not applicable to items in your cart.");
    }
    Ok(())
}

/// Compute the discount an eligible coupon grants on a subtotal.
///
/// Percentage coupons quantize the ratio to 4 places before applying
/// it; flat coupons are capped at the subtotal. Either way the result
/// never exceeds the subtotal.
#[must_use]
pub fn compute_discount(coupon: &Coupon, subtotal: Money) -> Money {
    match coupon.discount_type {
        DiscountType::Percentage => subtotal.percent(coupon.discount_value),
        DiscountType::Flat => Money::new(coupon.discount_value).min(subtotal).round2(),
    }
}

fn conflict_to_taken(err: crate::db::RepositoryError) -> CommerceError {
    match err {
        crate::db::RepositoryError::Conflict(_) => {
            CommerceError::Conflict("A coupon with that code already exists.".to_owned())
        }
        other => other.into(),
    }
}

/// What applying a coupon to the current cart would do.
#[derive(Debug, Clone, Serialize)]
pub struct CouponPreview {
    pub code: String,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
}

/// Coupon preview and management operations.
pub struct CouponService<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CouponService<'a> {
    /// Create a new coupon service.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Preview a coupon against the caller's current cart without
    /// consuming a use.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::CouponInvalid` for an unknown code and
    /// `CommerceError::CouponIneligible` with the reason when the
    /// coupon cannot apply.
    pub async fn validate_for_cart(
        &self,
        identity: Identity,
        cart_token: Option<&CartToken>,
        code: &str,
    ) -> Result<CouponPreview> {
        let view = CartService::new(self.pool).current(identity, cart_token).await?;

        let repo = CouponRepository::new(self.pool);
        let Some(coupon) = repo.get_by_code(code.trim()).await? else {
            return Err(CommerceError::CouponInvalid);
        };
        let restricted_to = repo.applicable_product_ids(coupon.id).await?;
        let cart_product_ids: Vec<ProductId> =
            view.items.iter().map(|item| item.product_id).collect();

        check_eligibility(&coupon, view.subtotal, &cart_product_ids, &restricted_to, Utc::now())
            .map_err(|reason| CommerceError::CouponIneligible(reason.to_owned()))?;

        let discount = compute_discount(&coupon, view.subtotal);
        let total = (view.subtotal - discount).round2().floor_zero();
        Ok(CouponPreview {
            code: coupon.code,
            subtotal: view.subtotal,
            discount,
            total,
        })
    }

    /// Create a coupon after validating the management input.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` for bad input and
    /// `CommerceError::Conflict` for a duplicate code.
    pub async fn create(&self, new: &NewCoupon) -> Result<Coupon> {
        new.validate()?;
        CouponRepository::new(self.pool).create(new).await.map_err(conflict_to_taken)
    }

    /// Update a coupon after validating the management input.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` for bad input and
    /// `CommerceError::NotFound` for an unknown coupon.
    pub async fn update(&self, id: CouponId, new: &NewCoupon) -> Result<Coupon> {
        new.validate()?;
        CouponRepository::new(self.pool).update(id, new).await.map_err(conflict_to_taken)
    }

    /// Delete a coupon.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::NotFound` for an unknown coupon.
    pub async fn delete(&self, id: CouponId) -> Result<()> {
        Ok(CouponRepository::new(self.pool).delete(id).await?)
    }

    /// List all coupons, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn list(&self) -> Result<Vec<Coupon>> {
        Ok(CouponRepository::new(self.pool).list().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn money(raw: &str) -> Money {
        raw.parse().expect("decimal")
    }

    fn coupon(discount_type: DiscountType, value: i64) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: CouponId::new(1),
            code: "SAVE".to_owned(),
            discount_type,
            discount_value: Decimal::from(value),
            start_at: now - Duration::days(1),
            end_at: now + Duration::days(1),
            minimum_cart_value: Money::ZERO,
            usage_limit: None,
            times_used: 0,
            is_enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_eligibility_passes_for_open_coupon() {
        let c = coupon(DiscountType::Flat, 5);
        assert_eq!(check_eligibility(&c, money("10.00"), &[], &[], Utc::now()), Ok(()));
    }

    #[test]
    fn test_eligibility_disabled_and_window_share_reason() {
        let mut c = coupon(DiscountType::Flat, 5);
        c.is_enabled = false;
        assert_eq!(
            check_eligibility(&c, money("10.00"), &[], &[], Utc::now()),
            Err("Coupon is expired or disabled.")
        );

        let mut c = coupon(DiscountType::Flat, 5);
        c.end_at = Utc::now() - Duration::hours(1);
        assert_eq!(
            check_eligibility(&c, money("10.00"), &[], &[], Utc::now()),
            Err("Coupon is expired or disabled.")
        );
    }

    #[test]
    fn test_eligibility_usage_limit_exhausted() {
        let mut c = coupon(DiscountType::Flat, 5);
        c.usage_limit = Some(3);
        c.times_used = 3;
        assert_eq!(
            check_eligibility(&c, money("10.00"), &[], &[], Utc::now()),
            Err("Coupon is expired or disabled.")
        );
    }

    #[test]
    fn test_eligibility_minimum_cart_value() {
        let mut c = coupon(DiscountType::Flat, 5);
        c.minimum_cart_value = money("50.00");
        assert_eq!(
            check_eligibility(&c, money("40.00"), &[], &[], Utc::now()),
            Err("Minimum cart value not met for this coupon.")
        );
        assert_eq!(check_eligibility(&c, money("50.00"), &[], &[], Utc::now()), Ok(()));
    }

    #[test]
    fn test_eligibility_product_restriction() {
        let c = coupon(DiscountType::Flat, 5);
        let restricted = [ProductId::new(9)];

        let cart = [ProductId::new(1), ProductId::new(2)];
        assert_eq!(
            check_eligibility(&c, money("10.00"), &cart, &restricted, Utc::now()),
            Err("Coupon is not applicable to items in your cart.")
        );

        let cart = [ProductId::new(1), ProductId::new(9)];
        assert_eq!(
            check_eligibility(&c, money("10.00"), &cart, &restricted, Utc::now()),
            Ok(())
        );
    }

    #[test]
    fn test_eligibility_order_window_before_minimum() {
        // Both the window and the minimum fail; the window reason wins.
        let mut c = coupon(DiscountType::Flat, 5);
        c.end_at = Utc::now() - Duration::hours(1);
        c.minimum_cart_value = money("50.00");
        assert_eq!(
            check_eligibility(&c, money("40.00"), &[], &[], Utc::now()),
            Err("Coupon is expired or disabled.")
        );
    }

    #[test]
    fn test_discount_flat_and_percentage() {
        let subtotal = money("100.00");
        assert_eq!(compute_discount(&coupon(DiscountType::Flat, 15), subtotal), money("15.00"));
        assert_eq!(
            compute_discount(&coupon(DiscountType::Percentage, 10), subtotal),
            money("10.00")
        );
    }

    #[test]
    fn test_discount_flat_capped_at_subtotal() {
        assert_eq!(
            compute_discount(&coupon(DiscountType::Flat, 50), money("40.00")),
            money("40.00")
        );
    }

    #[test]
    fn test_discount_percentage_quantizes_ratio_first() {
        // 0.125% of 1000.00: the ratio 0.00125 quantizes to 0.0012, so
        // the discount is 1.20 rather than 1.25.
        let mut c = coupon(DiscountType::Percentage, 0);
        c.discount_value = "0.125".parse().expect("decimal");
        assert_eq!(compute_discount(&c, money("1000.00")), money("1.20"));
    }
}
