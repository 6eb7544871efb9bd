//! Cart repository.
//!
//! Line mutations are single guarded statements: the stock check and the
//! write happen in one SQL statement, so two concurrent adders cannot
//! both slip past the stock limit. A guard that bites reports back as a
//! [`LineChange`] variant rather than an error.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};

use shoplite_core::{CartId, CartItemId, CartToken, Money, ProductId, UserId};

use super::{RepositoryError, money_column};
use crate::models::{Cart, CartItem};

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a SqlitePool,
}

/// Outcome of a guarded cart line mutation.
#[derive(Debug)]
pub enum LineChange {
    /// The mutation applied; the resulting line.
    Applied(CartItem),
    /// The product does not exist or is inactive.
    MissingProduct,
    /// The cart line does not exist.
    MissingItem,
    /// The requested quantity exceeds available stock.
    OutOfStock,
}

/// A cart line joined with live product stock, read inside the checkout
/// transaction.
#[derive(Debug, Clone)]
pub struct CheckoutLine {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub stock_quantity: i64,
}

fn map_cart(row: &SqliteRow) -> Result<Cart, RepositoryError> {
    let token: Option<String> = row.try_get("guest_token")?;
    let guest_token = token
        .map(|raw| raw.parse::<CartToken>())
        .transpose()
        .map_err(|e| RepositoryError::DataCorruption(format!("cart token: {e}")))?;
    Ok(Cart {
        id: CartId::new(row.try_get("id")?),
        user_id: row.try_get::<Option<i64>, _>("user_id")?.map(UserId::new),
        guest_token,
        checked_out_at: row.try_get("checked_out_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_item(row: &SqliteRow) -> Result<CartItem, RepositoryError> {
    Ok(CartItem {
        id: CartItemId::new(row.try_get("id")?),
        cart_id: CartId::new(row.try_get("cart_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        product_name: row.try_get("product_name")?,
        quantity: row.try_get("quantity")?,
        unit_price: money_column(row, "unit_price")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const CART_COLUMNS: &str = "id, user_id, guest_token, checked_out_at, created_at, updated_at";

const ITEM_COLUMNS: &str = "ci.id, ci.cart_id, ci.product_id, p.name AS product_name, \
     ci.quantity, ci.unit_price, ci.created_at, ci.updated_at";

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a cart by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: CartId) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CART_COLUMNS} FROM carts WHERE id = ?"))
            .bind(id.as_i64())
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(map_cart).transpose()
    }

    /// Get a user's open cart, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_open_for_user(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts \
             WHERE user_id = ? AND checked_out_at IS NULL"
        ))
        .bind(user_id.as_i64())
        .fetch_optional(self.pool)
        .await?;
        row.as_ref().map(map_cart).transpose()
    }

    /// Get the user's open cart, creating one if none exists.
    ///
    /// The partial unique index on open user carts arbitrates races: a
    /// losing insert surfaces as a unique violation and the winner's row
    /// is re-read.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_or_create_for_user(&self, user_id: UserId) -> Result<Cart, RepositoryError> {
        if let Some(cart) = self.get_open_for_user(user_id).await? {
            return Ok(cart);
        }

        let now = Utc::now();
        let inserted = sqlx::query(
            "INSERT INTO carts (user_id, created_at, updated_at) VALUES (?, ?, ?)",
        )
        .bind(user_id.as_i64())
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(RepositoryError::from_sqlx);

        match inserted {
            Ok(result) => Ok(Cart {
                id: CartId::new(result.last_insert_rowid()),
                user_id: Some(user_id),
                guest_token: None,
                checked_out_at: None,
                created_at: now,
                updated_at: now,
            }),
            Err(RepositoryError::Conflict(_)) => self
                .get_open_for_user(user_id)
                .await?
                .ok_or(RepositoryError::NotFound),
            Err(err) => Err(err),
        }
    }

    /// Get the open guest cart for a token, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_open_by_token(
        &self,
        token: &CartToken,
    ) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts \
             WHERE guest_token = ? AND checked_out_at IS NULL"
        ))
        .bind(token.to_string())
        .fetch_optional(self.pool)
        .await?;
        row.as_ref().map(map_cart).transpose()
    }

    /// Create a guest cart owned by a fresh token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` on a token collision.
    pub async fn create_guest(&self, token: &CartToken) -> Result<Cart, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO carts (guest_token, created_at, updated_at) VALUES (?, ?, ?)",
        )
        .bind(token.to_string())
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        Ok(Cart {
            id: CartId::new(result.last_insert_rowid()),
            user_id: None,
            guest_token: Some(*token),
            checked_out_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// List a cart's lines with their product names, oldest line first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, cart_id: CartId) -> Result<Vec<CartItem>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM cart_items ci \
             JOIN products p ON p.id = ci.product_id \
             WHERE ci.cart_id = ? ORDER BY ci.id"
        ))
        .bind(cart_id.as_i64())
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(map_item).collect()
    }

    /// Add a quantity of a product to a cart, folding into an existing
    /// line for the same product. The unit price snapshot is refreshed
    /// and the resulting quantity is capped by current stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<LineChange, RepositoryError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Insert and fold in one statement; both paths carry a stock
        // guard so the line never exceeds what is on hand.
        let result = sqlx::query(
            "INSERT INTO cart_items \
             (cart_id, product_id, quantity, unit_price, created_at, updated_at) \
             SELECT ?1, p.id, ?2, p.price, ?3, ?3 \
             FROM products p \
             WHERE p.id = ?4 AND p.is_active = 1 AND ?2 <= p.stock_quantity \
             ON CONFLICT (cart_id, product_id) DO UPDATE SET \
             quantity = quantity + excluded.quantity, \
             unit_price = excluded.unit_price, \
             updated_at = excluded.updated_at \
             WHERE cart_items.quantity + excluded.quantity <= \
             (SELECT stock_quantity FROM products WHERE id = excluded.product_id)",
        )
        .bind(cart_id.as_i64())
        .bind(quantity)
        .bind(now)
        .bind(product_id.as_i64())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let product_ok = sqlx::query("SELECT 1 FROM products WHERE id = ? AND is_active = 1")
                .bind(product_id.as_i64())
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            tx.commit().await?;
            return Ok(if product_ok {
                LineChange::OutOfStock
            } else {
                LineChange::MissingProduct
            });
        }

        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM cart_items ci \
             JOIN products p ON p.id = ci.product_id \
             WHERE ci.cart_id = ? AND ci.product_id = ?"
        ))
        .bind(cart_id.as_i64())
        .bind(product_id.as_i64())
        .fetch_one(&mut *tx)
        .await?;
        let item = map_item(&row)?;

        sqlx::query("UPDATE carts SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(cart_id.as_i64())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(LineChange::Applied(item))
    }

    /// Set a cart line to an absolute quantity, refreshing the unit
    /// price snapshot. The new quantity is capped by current stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn update_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: i64,
    ) -> Result<LineChange, RepositoryError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE cart_items SET \
             quantity = ?1, \
             unit_price = (SELECT price FROM products WHERE id = cart_items.product_id), \
             updated_at = ?2 \
             WHERE id = ?3 AND cart_id = ?4 \
             AND ?1 <= (SELECT stock_quantity FROM products WHERE id = cart_items.product_id)",
        )
        .bind(quantity)
        .bind(now)
        .bind(item_id.as_i64())
        .bind(cart_id.as_i64())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let item_exists = sqlx::query("SELECT 1 FROM cart_items WHERE id = ? AND cart_id = ?")
                .bind(item_id.as_i64())
                .bind(cart_id.as_i64())
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            tx.commit().await?;
            return Ok(if item_exists {
                LineChange::OutOfStock
            } else {
                LineChange::MissingItem
            });
        }

        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM cart_items ci \
             JOIN products p ON p.id = ci.product_id \
             WHERE ci.id = ?"
        ))
        .bind(item_id.as_i64())
        .fetch_one(&mut *tx)
        .await?;
        let item = map_item(&row)?;

        sqlx::query("UPDATE carts SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(cart_id.as_i64())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(LineChange::Applied(item))
    }

    /// Remove a line from a cart. Removing an absent line is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn remove_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM cart_items WHERE id = ? AND cart_id = ?")
            .bind(item_id.as_i64())
            .bind(cart_id.as_i64())
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Fold a guest cart's lines into a user cart and empty the guest
    /// cart. Quantities for the same product are added without a stock
    /// cap; checkout revalidates stock anyway.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn merge_guest_into_user(
        &self,
        guest_cart_id: CartId,
        user_cart_id: CartId,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE carts SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(user_cart_id.as_i64())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO cart_items \
             (cart_id, product_id, quantity, unit_price, created_at, updated_at) \
             SELECT ?1, gi.product_id, gi.quantity, gi.unit_price, ?2, ?2 \
             FROM cart_items gi WHERE gi.cart_id = ?3 \
             ON CONFLICT (cart_id, product_id) DO UPDATE SET \
             quantity = quantity + excluded.quantity, \
             unit_price = (SELECT price FROM products WHERE id = excluded.product_id), \
             updated_at = excluded.updated_at",
        )
        .bind(user_cart_id.as_i64())
        .bind(now)
        .bind(guest_cart_id.as_i64())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = ?")
            .bind(guest_cart_id.as_i64())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Checkout transaction helpers
    // =========================================================================

    /// Touch a cart's `updated_at` inside an open transaction. This is
    /// the checkout transaction's opening write, which takes the
    /// database write lock before any reads. Returns `false` if the
    /// cart is missing or already checked out.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn touch_open_tx(
        conn: &mut SqliteConnection,
        cart_id: CartId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE carts SET updated_at = ? WHERE id = ? AND checked_out_at IS NULL",
        )
        .bind(now)
        .bind(cart_id.as_i64())
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Read a cart's lines joined with live stock inside an open
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines_for_checkout_tx(
        conn: &mut SqliteConnection,
        cart_id: CartId,
    ) -> Result<Vec<CheckoutLine>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT ci.id AS item_id, ci.product_id, p.name AS product_name, \
             ci.quantity, ci.unit_price, p.stock_quantity \
             FROM cart_items ci \
             JOIN products p ON p.id = ci.product_id \
             WHERE ci.cart_id = ? ORDER BY ci.id",
        )
        .bind(cart_id.as_i64())
        .fetch_all(conn)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CheckoutLine {
                    item_id: CartItemId::new(row.try_get("item_id")?),
                    product_id: ProductId::new(row.try_get("product_id")?),
                    product_name: row.try_get("product_name")?,
                    quantity: row.try_get("quantity")?,
                    unit_price: money_column(row, "unit_price")?,
                    stock_quantity: row.try_get("stock_quantity")?,
                })
            })
            .collect()
    }

    /// Close a cart after a successful checkout: stamp `checked_out_at`
    /// and delete its lines, inside the open transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn retire_tx(
        conn: &mut SqliteConnection,
        cart_id: CartId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE carts SET checked_out_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(cart_id.as_i64())
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM cart_items WHERE cart_id = ?")
            .bind(cart_id.as_i64())
            .execute(conn)
            .await?;
        Ok(())
    }
}
