//! Product repository.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};

use shoplite_core::{ProductId, ProductImageId};

use super::{RepositoryError, money_column, money_text};
use crate::models::{NewProduct, Product, ProductImage};

/// Repository for catalog database operations.
pub struct ProductRepository<'a> {
    pool: &'a SqlitePool,
}

fn map_product(row: &SqliteRow) -> Result<Product, RepositoryError> {
    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        price: money_column(row, "price")?,
        short_description: row.try_get("short_description")?,
        stock_quantity: row.try_get("stock_quantity")?,
        is_active: row.try_get("is_active")?,
        image: row.try_get("image")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_image(row: &SqliteRow) -> Result<ProductImage, RepositoryError> {
    Ok(ProductImage {
        id: ProductImageId::new(row.try_get("id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        image: row.try_get("image")?,
        is_cover: row.try_get("is_cover")?,
        sort_order: row.try_get("sort_order")?,
    })
}

const PRODUCT_COLUMNS: &str =
    "id, name, price, short_description, stock_quantity, is_active, image, created_at, updated_at";

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, new: &NewProduct) -> Result<Product, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO products \
             (name, price, short_description, stock_quantity, is_active, image, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.name)
        .bind(money_text(new.price.round2()))
        .bind(&new.short_description)
        .bind(new.stock_quantity)
        .bind(new.is_active)
        .bind(&new.image)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(Product {
            id: ProductId::new(result.last_insert_rowid()),
            name: new.name.clone(),
            price: new.price.round2(),
            short_description: new.short_description.clone(),
            stock_quantity: new.stock_quantity,
            is_active: new.is_active,
            image: new.image.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Overwrite a product's management fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such product exists.
    pub async fn update(&self, id: ProductId, new: &NewProduct) -> Result<Product, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE products SET \
             name = ?, price = ?, short_description = ?, stock_quantity = ?, \
             is_active = ?, image = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&new.name)
        .bind(money_text(new.price.round2()))
        .bind(&new.short_description)
        .bind(new.stock_quantity)
        .bind(new.is_active)
        .bind(&new.image)
        .bind(now)
        .bind(id.as_i64())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        self.get(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"))
            .bind(id.as_i64())
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(map_product).transpose()
    }

    /// Get an active product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_active(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ? AND is_active = 1"
        ))
        .bind(id.as_i64())
        .fetch_optional(self.pool)
        .await?;
        row.as_ref().map(map_product).transpose()
    }

    /// List active products, oldest first (the storefront listing).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1 ORDER BY id"
        ))
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(map_product).collect()
    }

    /// List all products by name (the management listing).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name, id"
        ))
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(map_product).collect()
    }

    /// Delete a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` while any cart or order line
    /// still references the product, and `RepositoryError::NotFound` if
    /// it does not exist.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id.as_i64())
            .execute(self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Images
    // =========================================================================

    /// Attach an image to a product. Marking it as the cover clears the
    /// flag on the product's other images.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the product does not exist.
    pub async fn add_image(
        &self,
        product_id: ProductId,
        image: &str,
        is_cover: bool,
        sort_order: i64,
    ) -> Result<ProductImage, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if is_cover {
            sqlx::query("UPDATE product_images SET is_cover = 0 WHERE product_id = ?")
                .bind(product_id.as_i64())
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query(
            "INSERT INTO product_images (product_id, image, is_cover, sort_order) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(product_id.as_i64())
        .bind(image)
        .bind(is_cover)
        .bind(sort_order)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        tx.commit().await?;

        Ok(ProductImage {
            id: ProductImageId::new(result.last_insert_rowid()),
            product_id,
            image: image.to_owned(),
            is_cover,
            sort_order,
        })
    }

    /// List a product's images by (sort order, id).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_images(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<ProductImage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, product_id, image, is_cover, sort_order \
             FROM product_images WHERE product_id = ? ORDER BY sort_order, id",
        )
        .bind(product_id.as_i64())
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(map_image).collect()
    }

    /// Resolve a product's cover image path.
    ///
    /// Fallback chain: the flagged cover, else the first gallery image by
    /// (sort order, id), else the product's legacy single image.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn cover_image(
        &self,
        product_id: ProductId,
    ) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query(
            "SELECT image FROM product_images WHERE product_id = ? \
             ORDER BY is_cover DESC, sort_order, id LIMIT 1",
        )
        .bind(product_id.as_i64())
        .fetch_optional(self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(Some(row.try_get("image")?));
        }

        let row = sqlx::query("SELECT image FROM products WHERE id = ?")
            .bind(product_id.as_i64())
            .fetch_optional(self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.try_get("image")?),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Checkout transaction helpers
    // =========================================================================

    /// Decrement stock inside an open transaction, guarded so stock never
    /// goes negative. Returns `false` if the product had insufficient
    /// stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn decrement_stock_tx(
        conn: &mut SqliteConnection,
        product_id: ProductId,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE products SET stock_quantity = stock_quantity - ?, updated_at = ? \
             WHERE id = ? AND stock_quantity >= ?",
        )
        .bind(quantity)
        .bind(now)
        .bind(product_id.as_i64())
        .bind(quantity)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
