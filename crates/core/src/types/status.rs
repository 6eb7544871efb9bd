//! Status and discount-type enums.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when parsing a status or discount type from storage.
#[derive(thiserror::Error, Debug, Clone)]
#[error("unknown {kind}: {value}")]
pub struct StatusParseError {
    /// What was being parsed ("order status", "discount type").
    pub kind: &'static str,
    /// The offending value.
    pub value: String,
}

/// Order lifecycle status.
///
/// Orders are immutable snapshots except for this field. The only
/// allowed transitions are `Pending -> Shipped` and `Pending ->
/// Cancelled`; shipped and cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Shipped => "shipped",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether a transition from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Shipped) | (Self::Pending, Self::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "shipped" => Ok(Self::Shipped),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(StatusParseError {
                kind: "order status",
                value: other.to_owned(),
            }),
        }
    }
}

/// How a coupon's discount value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// Value is a percentage of the cart subtotal (0-100).
    Percentage,
    /// Value is a flat amount, capped at the subtotal.
    #[default]
    Flat,
}

impl DiscountType {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::Flat => "flat",
        }
    }
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DiscountType {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "flat" => Ok(Self::Flat),
            other => Err(StatusParseError {
                kind: "discount type",
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_status_str_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Shipped,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().expect("parse"), status);
        }
        for ty in [DiscountType::Percentage, DiscountType::Flat] {
            assert_eq!(ty.as_str().parse::<DiscountType>().expect("parse"), ty);
        }
    }

    #[test]
    fn test_unknown_values_rejected() {
        assert!("refunded".parse::<OrderStatus>().is_err());
        assert!("bogo".parse::<DiscountType>().is_err());
    }
}
