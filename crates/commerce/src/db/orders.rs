//! Order repository.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};

use shoplite_core::{CouponId, Money, OrderId, OrderItemId, OrderStatus, ProductId, UserId};

use super::{RepositoryError, money_column, money_text};
use crate::models::{Order, OrderDetail, OrderItem};

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a SqlitePool,
}

/// The computed header of an order about to be written.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub user_id: Option<UserId>,
    pub guest_full_name: String,
    pub guest_email: String,
    pub coupon_id: Option<CouponId>,
    pub subtotal_amount: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
}

fn map_order(row: &SqliteRow) -> Result<Order, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<OrderStatus>()
        .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        user_id: row.try_get::<Option<i64>, _>("user_id")?.map(UserId::new),
        guest_full_name: row.try_get("guest_full_name")?,
        guest_email: row.try_get("guest_email")?,
        status,
        coupon_id: row.try_get::<Option<i64>, _>("coupon_id")?.map(CouponId::new),
        subtotal_amount: money_column(row, "subtotal_amount")?,
        discount_amount: money_column(row, "discount_amount")?,
        total_amount: money_column(row, "total_amount")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_item(row: &SqliteRow) -> Result<OrderItem, RepositoryError> {
    Ok(OrderItem {
        id: OrderItemId::new(row.try_get("id")?),
        order_id: OrderId::new(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        product_name: row.try_get("product_name")?,
        quantity: row.try_get("quantity")?,
        unit_price: money_column(row, "unit_price")?,
        line_total: money_column(row, "line_total")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const ORDER_COLUMNS: &str = "id, user_id, guest_full_name, guest_email, status, coupon_id, \
     subtotal_amount, discount_amount, total_amount, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, quantity, unit_price, \
     line_total, created_at, updated_at";

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"))
            .bind(id.as_i64())
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(map_order).transpose()
    }

    /// List an order's lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ? ORDER BY id"
        ))
        .bind(order_id.as_i64())
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(map_item).collect()
    }

    /// Get an order with its lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn detail(&self, id: OrderId) -> Result<Option<OrderDetail>, RepositoryError> {
        let Some(order) = self.get(id).await? else {
            return Ok(None);
        };
        let items = self.items(id).await?;
        Ok(Some(OrderDetail { order, items }))
    }

    /// List a user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ? ORDER BY id DESC"
        ))
        .bind(user_id.as_i64())
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(map_order).collect()
    }

    /// List all orders, newest first, optionally filtered by status
    /// (the management listing).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE status = ? ORDER BY id DESC"
                ))
                .bind(status.as_str())
                .fetch_all(self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY id DESC"))
                    .fetch_all(self.pool)
                    .await?
            }
        };
        rows.iter().map(map_order).collect()
    }

    /// Move an order from one status to another, guarded on the
    /// expected current status so concurrent transitions cannot both
    /// land. Returns `false` when the order was not in `from`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE orders SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(id.as_i64())
        .bind(from.as_str())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Checkout transaction helpers
    // =========================================================================

    /// Write the order header inside the checkout transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn insert_order_tx(
        conn: &mut SqliteConnection,
        draft: &OrderDraft,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO orders \
             (user_id, guest_full_name, guest_email, status, coupon_id, \
              subtotal_amount, discount_amount, total_amount, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(draft.user_id.map(|id| id.as_i64()))
        .bind(&draft.guest_full_name)
        .bind(&draft.guest_email)
        .bind(OrderStatus::Pending.as_str())
        .bind(draft.coupon_id.map(|id| id.as_i64()))
        .bind(money_text(draft.subtotal_amount))
        .bind(money_text(draft.discount_amount))
        .bind(money_text(draft.total_amount))
        .bind(now)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(Order {
            id: OrderId::new(result.last_insert_rowid()),
            user_id: draft.user_id,
            guest_full_name: draft.guest_full_name.clone(),
            guest_email: draft.guest_email.clone(),
            status: OrderStatus::Pending,
            coupon_id: draft.coupon_id,
            subtotal_amount: draft.subtotal_amount,
            discount_amount: draft.discount_amount,
            total_amount: draft.total_amount,
            created_at: now,
            updated_at: now,
        })
    }

    /// Write one frozen order line inside the checkout transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn insert_item_tx(
        conn: &mut SqliteConnection,
        order_id: OrderId,
        product_id: ProductId,
        product_name: &str,
        quantity: i64,
        unit_price: Money,
        now: DateTime<Utc>,
    ) -> Result<OrderItem, RepositoryError> {
        let line_total = unit_price.times(quantity).round2();
        let result = sqlx::query(
            "INSERT INTO order_items \
             (order_id, product_id, product_name, quantity, unit_price, line_total, \
              created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(order_id.as_i64())
        .bind(product_id.as_i64())
        .bind(product_name)
        .bind(quantity)
        .bind(money_text(unit_price))
        .bind(money_text(line_total))
        .bind(now)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(OrderItem {
            id: OrderItemId::new(result.last_insert_rowid()),
            order_id,
            product_id,
            product_name: product_name.to_owned(),
            quantity,
            unit_price,
            line_total,
            created_at: now,
            updated_at: now,
        })
    }
}
