//! Order lookup and status management.

use sqlx::SqlitePool;
use tracing::{info, warn};

use shoplite_core::{Email, OrderId, OrderStatus, UserId};

use crate::config::CommerceConfig;
use crate::db::{OrderRepository, UserRepository};
use crate::error::{CommerceError, Result};
use crate::models::{Order, OrderDetail};
use crate::services::notifications::{NotificationSink, order_status_message};

/// Order queries and the status transition operation.
pub struct OrderService<'a, S> {
    pool: &'a SqlitePool,
    config: &'a CommerceConfig,
    sink: &'a S,
}

impl<'a, S: NotificationSink> OrderService<'a, S> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool, config: &'a CommerceConfig, sink: &'a S) -> Self {
        Self { pool, config, sink }
    }

    /// Get one of a user's orders with its lines.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::NotFound` when the order does not exist
    /// or belongs to someone else.
    pub async fn get_for_user(&self, user_id: UserId, order_id: OrderId) -> Result<OrderDetail> {
        let detail = OrderRepository::new(self.pool)
            .detail(order_id)
            .await?
            .filter(|detail| detail.order.user_id == Some(user_id))
            .ok_or_else(|| CommerceError::NotFound("Order not found.".to_owned()))?;
        Ok(detail)
    }

    /// List a user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(OrderRepository::new(self.pool).list_for_user(user_id).await?)
    }

    /// Get any order with its lines (the management view).
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::NotFound` when the order does not exist.
    pub async fn get(&self, order_id: OrderId) -> Result<OrderDetail> {
        OrderRepository::new(self.pool)
            .detail(order_id)
            .await?
            .ok_or_else(|| CommerceError::NotFound("Order not found.".to_owned()))
    }

    /// List all orders, newest first, optionally filtered by status
    /// (the management listing).
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn list_all(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        Ok(OrderRepository::new(self.pool).list_all(status).await?)
    }

    /// Move an order to a new status and notify the buyer, best-effort.
    ///
    /// The only allowed transitions are pending to shipped and pending
    /// to cancelled. The database update is guarded on the expected
    /// current status, so two concurrent transitions cannot both win.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` for a disallowed transition
    /// and `CommerceError::Conflict` when the order moved concurrently.
    pub async fn update_status(&self, order_id: OrderId, to: OrderStatus) -> Result<Order> {
        let repo = OrderRepository::new(self.pool);
        let order = repo
            .get(order_id)
            .await?
            .ok_or_else(|| CommerceError::NotFound("Order not found.".to_owned()))?;

        if order.status == to {
            return Ok(order);
        }
        if !order.status.can_transition_to(to) {
            return Err(CommerceError::Validation(format!(
                "Cannot change status from {} to {}.",
                order.status, to
            )));
        }
        if !repo.set_status(order_id, order.status, to).await? {
            return Err(CommerceError::Conflict(
                "Order status changed concurrently.".to_owned(),
            ));
        }
        let updated = repo
            .get(order_id)
            .await?
            .ok_or_else(|| CommerceError::NotFound("Order not found.".to_owned()))?;

        info!(order = %updated.id, status = %updated.status, "order status updated");

        if let Some(recipient) = self.recipient(&updated).await? {
            let message = order_status_message(&self.config.from_email, &recipient, &updated);
            if let Err(err) = self.sink.send(message).await {
                warn!(order = %updated.id, error = %err, "status notification send failed");
            }
        }
        Ok(updated)
    }

    /// Where mail about an order goes: the owning account's address,
    /// else the guest address captured at checkout, else nowhere.
    async fn recipient(&self, order: &Order) -> Result<Option<Email>> {
        if let Some(user_id) = order.user_id {
            if let Some(user) = UserRepository::new(self.pool).get(user_id).await? {
                return Ok(Some(user.email));
            }
        }
        Ok(order.guest_email.parse().ok())
    }
}
