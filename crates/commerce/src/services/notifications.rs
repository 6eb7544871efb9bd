//! Notification sink boundary.
//!
//! Delivery is a collaborator concern; this crate only composes the
//! message and hands it across the [`NotificationSink`] trait. Checkout
//! and status changes send best-effort and swallow failures. OTP sends
//! are load-bearing: a failure there unwinds the record that triggered
//! them.

use std::future::Future;

use thiserror::Error;
use tracing::info;

use shoplite_core::Email;

use crate::models::{Order, OrderDetail};

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Otp,
    EmailChangeOtp,
    OrderConfirmation,
    OrderStatusChanged,
}

/// A composed message ready for delivery.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub from: Email,
    pub recipient: Email,
    pub subject: String,
    pub body: String,
}

/// Delivery failure reported by a sink.
#[derive(Debug, Error)]
#[error("notification send failed: {0}")]
pub struct NotificationError(pub String);

/// Outbound delivery boundary.
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification.
    fn send(
        &self,
        notification: Notification,
    ) -> impl Future<Output = Result<(), NotificationError>> + Send;
}

/// A sink that logs instead of delivering. The default for local runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    async fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(
            kind = ?notification.kind,
            recipient = %notification.recipient,
            subject = %notification.subject,
            "notification"
        );
        Ok(())
    }
}

/// Compose the signup verification message.
#[must_use]
pub fn otp_message(from: &Email, recipient: &Email, otp: &str, expire_minutes: i64) -> Notification {
    Notification {
        kind: NotificationKind::Otp,
        from: from.clone(),
        recipient: recipient.clone(),
        subject: "Your verification code".to_owned(),
        body: format!(
            "Your OTP for account verification is: {otp}\n\nIt is valid for {expire_minutes} minutes."
        ),
    }
}

/// Compose the email change confirmation message, addressed to the new
/// address.
#[must_use]
pub fn email_change_message(
    from: &Email,
    new_email: &Email,
    otp: &str,
    expire_minutes: i64,
) -> Notification {
    Notification {
        kind: NotificationKind::EmailChangeOtp,
        from: from.clone(),
        recipient: new_email.clone(),
        subject: "Verify your new email address".to_owned(),
        body: format!(
            "Your code to confirm your new email address is: {otp}\n\nIt is valid for {expire_minutes} minutes."
        ),
    }
}

/// Compose the order confirmation message.
#[must_use]
pub fn order_confirmation_message(
    from: &Email,
    recipient: &Email,
    detail: &OrderDetail,
) -> Notification {
    let order = &detail.order;
    let mut lines = vec![
        format!("Thank you for your order #{}.", order.id),
        format!("Status: {}", order.status),
        format!("Subtotal: {}", order.subtotal_amount),
        format!("Discount: {}", order.discount_amount),
        format!("Total: {}", order.total_amount),
    ];
    for item in &detail.items {
        lines.push(format!(
            "  - {} x {}: {}",
            item.product_name, item.quantity, item.line_total
        ));
    }
    Notification {
        kind: NotificationKind::OrderConfirmation,
        from: from.clone(),
        recipient: recipient.clone(),
        subject: format!("Order #{} confirmed", order.id),
        body: lines.join("\n"),
    }
}

/// Compose the status change message.
#[must_use]
pub fn order_status_message(from: &Email, recipient: &Email, order: &Order) -> Notification {
    let body = format!(
        "Your order #{} has been updated.\nNew status: {}\nTotal: {}",
        order.id, order.status, order.total_amount
    );
    Notification {
        kind: NotificationKind::OrderStatusChanged,
        from: from.clone(),
        recipient: recipient.clone(),
        subject: format!("Order #{} - status updated to {}", order.id, order.status),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shoplite_core::{Money, OrderId, OrderItemId, OrderStatus, ProductId};

    use crate::models::{Order, OrderItem};

    fn email(raw: &str) -> Email {
        raw.parse().expect("email")
    }

    fn detail(guest_email: &str) -> OrderDetail {
        let now = Utc::now();
        OrderDetail {
            order: Order {
                id: OrderId::new(7),
                user_id: None,
                guest_full_name: "Jo Buyer".to_owned(),
                guest_email: guest_email.to_owned(),
                status: OrderStatus::Pending,
                coupon_id: None,
                subtotal_amount: "20.00".parse().expect("decimal"),
                discount_amount: Money::ZERO.round2(),
                total_amount: "20.00".parse().expect("decimal"),
                created_at: now,
                updated_at: now,
            },
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                order_id: OrderId::new(7),
                product_id: ProductId::new(1),
                product_name: "Mug".to_owned(),
                quantity: 2,
                unit_price: "10.00".parse().expect("decimal"),
                line_total: "20.00".parse().expect("decimal"),
                created_at: now,
                updated_at: now,
            }],
        }
    }

    #[test]
    fn test_otp_message_names_code_and_expiry() {
        let msg = otp_message(&email("shop@example.com"), &email("jo@example.com"), "123456", 10);
        assert_eq!(msg.kind, NotificationKind::Otp);
        assert!(msg.body.contains("123456"));
        assert!(msg.body.contains("10 minutes"));
    }

    #[test]
    fn test_order_confirmation_lists_lines() {
        let msg = order_confirmation_message(
            &email("shop@example.com"),
            &email("jo@example.com"),
            &detail("jo@example.com"),
        );
        assert_eq!(msg.subject, "Order #7 confirmed");
        assert!(msg.body.contains("Mug x 2: 20.00"));
        assert!(msg.body.contains("Total: 20.00"));
    }

    #[test]
    fn test_status_message_names_new_status() {
        let msg = order_status_message(
            &email("shop@example.com"),
            &email("jo@example.com"),
            &detail("jo@example.com").order,
        );
        assert!(msg.subject.contains("status updated to pending"));
        assert!(msg.body.contains("New status: pending"));
    }
}
