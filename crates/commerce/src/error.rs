//! Service-boundary error taxonomy.
//!
//! Every operation recovers storage and validation failures into a
//! [`CommerceError`] carrying the kind and a human-readable reason; none
//! of these propagate as panics.

use thiserror::Error;

use crate::db::RepositoryError;

/// Application-level error type for the commerce engine.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed or rejected input.
    #[error("{0}")]
    Validation(String),

    /// Requested quantity exceeds the product's current stock.
    #[error("{0}")]
    InsufficientStock(String),

    /// Cart subtotal is below the configured minimum order amount.
    #[error("Minimum order amount not met.")]
    MinimumOrderNotMet,

    /// No coupon exists for the supplied code.
    #[error("Invalid coupon code.")]
    CouponInvalid,

    /// The coupon exists but is not applicable, with the first failing
    /// reason.
    #[error("{0}")]
    CouponIneligible(String),

    /// Unique-constraint conflict (duplicate username/email, or a
    /// concurrent writer got there first).
    #[error("{0}")]
    Conflict(String),

    /// An external collaborator (notification sink) failed in a way the
    /// caller must see.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Storage layer failure.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for CommerceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_error_lands_in_the_repository_variant() {
        let err = CommerceError::from(sqlx::Error::PoolClosed);
        assert!(matches!(
            err,
            CommerceError::Repository(RepositoryError::Database(_))
        ));
    }
}

/// Result type alias for `CommerceError`.
pub type Result<T> = std::result::Result<T, CommerceError>;
