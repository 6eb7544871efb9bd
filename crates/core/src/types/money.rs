//! Fixed-point money arithmetic.
//!
//! Monetary amounts are `rust_decimal` values wrapped in [`Money`]. Line
//! amounts stay unrounded; callers quantize once at the final sum with
//! [`Money::round2`], which uses banker's rounding to match the decimal
//! semantics the amounts were originally priced under.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Sub};
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A monetary amount in the shop's single configured currency.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a money value from a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Quantize to 2 decimal places (banker's rounding).
    #[must_use]
    pub fn round2(self) -> Self {
        Self(self.0.round_dp(2))
    }

    /// Multiply by a line quantity. The result is intentionally not
    /// rounded; sums are quantized once at the end.
    #[must_use]
    pub fn times(self, quantity: i64) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }

    /// Take `value` percent of this amount.
    ///
    /// The ratio is quantized to 4 decimal places before multiplying and
    /// the result to 2. This two-step quantize can differ from direct
    /// multiplication by a cent at certain amounts and is kept
    /// deliberately.
    #[must_use]
    pub fn percent(self, value: Decimal) -> Self {
        let ratio = (value / Decimal::ONE_HUNDRED).round_dp(4);
        Self((self.0 * ratio).round_dp(2))
    }

    /// The smaller of two amounts.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// Clamp negative amounts to zero.
    #[must_use]
    pub fn floor_zero(self) -> Self {
        if self.0.is_sign_negative() {
            Self::ZERO
        } else {
            self
        }
    }

    /// Whether the amount is strictly negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Whether the amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Decimal::from_str(s)?))
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}
