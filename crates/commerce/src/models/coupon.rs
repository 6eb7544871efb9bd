//! Coupon entity and management input.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shoplite_core::{CouponId, DiscountType, Money, ProductId};

use crate::error::CommerceError;

/// A named discount rule.
///
/// `times_used` is incremented by checkout through an atomic SQL-side
/// update; the value carried here may be stale the moment it is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub code: String,
    pub discount_type: DiscountType,
    /// Percentage (0-100) or flat amount, per `discount_type`.
    pub discount_value: Decimal,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub minimum_cart_value: Money,
    /// `None` means unlimited.
    pub usage_limit: Option<i64>,
    pub times_used: i64,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating or updating a coupon.
#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub minimum_cart_value: Money,
    pub usage_limit: Option<i64>,
    pub is_enabled: bool,
    /// Products the coupon is restricted to; empty applies to all.
    pub applicable_products: Vec<ProductId>,
}

impl NewCoupon {
    /// Validate management input before it reaches storage.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` for an empty code, a negative
    /// value, a percentage above 100, a window that ends before it
    /// starts, or a negative usage limit.
    pub fn validate(&self) -> Result<(), CommerceError> {
        if self.code.trim().is_empty() {
            return Err(CommerceError::Validation("Coupon code is required.".to_owned()));
        }
        if self.discount_value < Decimal::ZERO {
            return Err(CommerceError::Validation(
                "Discount value cannot be negative. Minimum is 0.".to_owned(),
            ));
        }
        if self.discount_type == DiscountType::Percentage
            && self.discount_value > Decimal::ONE_HUNDRED
        {
            return Err(CommerceError::Validation(
                "Percentage discount cannot exceed 100.".to_owned(),
            ));
        }
        if self.end_at <= self.start_at {
            return Err(CommerceError::Validation(
                "End date must be after start date.".to_owned(),
            ));
        }
        if self.usage_limit.is_some_and(|limit| limit < 0) {
            return Err(CommerceError::Validation(
                "Usage limit cannot be negative.".to_owned(),
            ));
        }
        Ok(())
    }
}
