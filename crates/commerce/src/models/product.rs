//! Catalog entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shoplite_core::{Money, ProductId, ProductImageId};

use crate::error::CommerceError;

/// A sellable product.
///
/// `stock_quantity` is decremented only by checkout; it never goes
/// negative (guarded updates plus a schema CHECK).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub short_description: String,
    pub stock_quantity: i64,
    pub is_active: bool,
    /// Legacy single-image path, superseded by `product_images` rows.
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether any units are in stock.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock_quantity > 0
    }
}

/// One of a product's gallery images; at most one per product is the
/// cover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductImage {
    pub id: ProductImageId,
    pub product_id: ProductId,
    pub image: String,
    pub is_cover: bool,
    pub sort_order: i64,
}

/// Fields for creating or updating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub short_description: String,
    pub stock_quantity: i64,
    pub is_active: bool,
    pub image: Option<String>,
}

impl NewProduct {
    /// Validate management input before it reaches storage.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` for an empty name, a negative
    /// price, or negative stock.
    pub fn validate(&self) -> Result<(), CommerceError> {
        if self.name.trim().is_empty() {
            return Err(CommerceError::Validation("Product name is required.".to_owned()));
        }
        if self.price.is_negative() {
            return Err(CommerceError::Validation(
                "Price cannot be negative. Minimum is 0.".to_owned(),
            ));
        }
        if self.stock_quantity < 0 {
            return Err(CommerceError::Validation(
                "Stock cannot be negative. Minimum is 0.".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> NewProduct {
        NewProduct {
            name: "Blue T-Shirt".to_owned(),
            price: "19.99".parse().expect("decimal"),
            short_description: String::new(),
            stock_quantity: 5,
            is_active: true,
            image: None,
        }
    }

    #[test]
    fn test_validate_accepts_valid_input() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut p = valid();
        p.name = "  ".to_owned();
        assert!(p.validate().is_err());

        let mut p = valid();
        p.price = "-1.00".parse().expect("decimal");
        assert!(p.validate().is_err());

        let mut p = valid();
        p.stock_quantity = -1;
        assert!(p.validate().is_err());
    }
}
