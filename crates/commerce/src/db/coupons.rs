//! Coupon repository.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};

use shoplite_core::{CouponId, DiscountType, ProductId};

use super::{RepositoryError, decimal_column, money_column, money_text};
use crate::models::{Coupon, NewCoupon};

/// Repository for coupon database operations.
pub struct CouponRepository<'a> {
    pool: &'a SqlitePool,
}

fn map_coupon(row: &SqliteRow) -> Result<Coupon, RepositoryError> {
    let discount_type: String = row.try_get("discount_type")?;
    let discount_type = discount_type
        .parse::<DiscountType>()
        .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
    Ok(Coupon {
        id: CouponId::new(row.try_get("id")?),
        code: row.try_get("code")?,
        discount_type,
        discount_value: decimal_column(row, "discount_value")?,
        start_at: row.try_get("start_at")?,
        end_at: row.try_get("end_at")?,
        minimum_cart_value: money_column(row, "minimum_cart_value")?,
        usage_limit: row.try_get("usage_limit")?,
        times_used: row.try_get("times_used")?,
        is_enabled: row.try_get("is_enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const COUPON_COLUMNS: &str = "id, code, discount_type, discount_value, start_at, end_at, \
     minimum_cart_value, usage_limit, times_used, is_enabled, created_at, updated_at";

async fn replace_products(
    conn: &mut SqliteConnection,
    coupon_id: CouponId,
    products: &[ProductId],
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM coupon_products WHERE coupon_id = ?")
        .bind(coupon_id.as_i64())
        .execute(&mut *conn)
        .await?;
    for product_id in products {
        sqlx::query("INSERT INTO coupon_products (coupon_id, product_id) VALUES (?, ?)")
            .bind(coupon_id.as_i64())
            .bind(product_id.as_i64())
            .execute(&mut *conn)
            .await
            .map_err(RepositoryError::from_sqlx)?;
    }
    Ok(())
}

impl<'a> CouponRepository<'a> {
    /// Create a new coupon repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a coupon with its product restrictions.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` when the code is already
    /// taken.
    pub async fn create(&self, new: &NewCoupon) -> Result<Coupon, RepositoryError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO coupons \
             (code, discount_type, discount_value, start_at, end_at, minimum_cart_value, \
              usage_limit, is_enabled, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.code)
        .bind(new.discount_type.as_str())
        .bind(new.discount_value.to_string())
        .bind(new.start_at)
        .bind(new.end_at)
        .bind(money_text(new.minimum_cart_value.round2()))
        .bind(new.usage_limit)
        .bind(new.is_enabled)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        let id = CouponId::new(result.last_insert_rowid());
        replace_products(&mut *tx, id, &new.applicable_products).await?;

        tx.commit().await?;

        Ok(Coupon {
            id,
            code: new.code.clone(),
            discount_type: new.discount_type,
            discount_value: new.discount_value,
            start_at: new.start_at,
            end_at: new.end_at,
            minimum_cart_value: new.minimum_cart_value.round2(),
            usage_limit: new.usage_limit,
            times_used: 0,
            is_enabled: new.is_enabled,
            created_at: now,
            updated_at: now,
        })
    }

    /// Overwrite a coupon's rule fields and product restrictions. The
    /// usage counter is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such coupon exists.
    pub async fn update(&self, id: CouponId, new: &NewCoupon) -> Result<Coupon, RepositoryError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE coupons SET \
             code = ?, discount_type = ?, discount_value = ?, start_at = ?, end_at = ?, \
             minimum_cart_value = ?, usage_limit = ?, is_enabled = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&new.code)
        .bind(new.discount_type.as_str())
        .bind(new.discount_value.to_string())
        .bind(new.start_at)
        .bind(new.end_at)
        .bind(money_text(new.minimum_cart_value.round2()))
        .bind(new.usage_limit)
        .bind(new.is_enabled)
        .bind(now)
        .bind(id.as_i64())
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        replace_products(&mut *tx, id, &new.applicable_products).await?;

        tx.commit().await?;
        self.get(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Get a coupon by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: CouponId) -> Result<Option<Coupon>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = ?"))
            .bind(id.as_i64())
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(map_coupon).transpose()
    }

    /// Look up a coupon by code, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<Coupon>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = ?"))
            .bind(code)
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(map_coupon).transpose()
    }

    /// List all coupons, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Coupon>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons ORDER BY id DESC"
        ))
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(map_coupon).collect()
    }

    /// Product IDs a coupon is restricted to. Empty means unrestricted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn applicable_product_ids(
        &self,
        coupon_id: CouponId,
    ) -> Result<Vec<ProductId>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT product_id FROM coupon_products WHERE coupon_id = ? ORDER BY product_id",
        )
        .bind(coupon_id.as_i64())
        .fetch_all(self.pool)
        .await?;
        rows.iter()
            .map(|row| Ok(ProductId::new(row.try_get("product_id")?)))
            .collect()
    }

    /// Delete a coupon. Orders keep their amounts; their coupon
    /// reference is nulled by the schema.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such coupon exists.
    pub async fn delete(&self, id: CouponId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM coupons WHERE id = ?")
            .bind(id.as_i64())
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Checkout transaction helpers
    // =========================================================================

    /// Look up a coupon by code inside an open transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_code_tx(
        conn: &mut SqliteConnection,
        code: &str,
    ) -> Result<Option<Coupon>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = ?"))
            .bind(code)
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(map_coupon).transpose()
    }

    /// Product restrictions, read inside an open transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn applicable_product_ids_tx(
        conn: &mut SqliteConnection,
        coupon_id: CouponId,
    ) -> Result<Vec<ProductId>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT product_id FROM coupon_products WHERE coupon_id = ? ORDER BY product_id",
        )
        .bind(coupon_id.as_i64())
        .fetch_all(conn)
        .await?;
        rows.iter()
            .map(|row| Ok(ProductId::new(row.try_get("product_id")?)))
            .collect()
    }

    /// Count one redemption inside the checkout transaction. The
    /// increment happens SQL-side against the stored counter, and the
    /// usage limit is re-checked in the same statement. Returns `false`
    /// when the limit was already exhausted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn increment_usage_tx(
        conn: &mut SqliteConnection,
        coupon_id: CouponId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE coupons SET times_used = times_used + 1, updated_at = ? \
             WHERE id = ? AND (usage_limit IS NULL OR times_used < usage_limit)",
        )
        .bind(now)
        .bind(coupon_id.as_i64())
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
