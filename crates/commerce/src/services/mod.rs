//! Domain services.
//!
//! Services own the operation-level rules and compose the repositories
//! in `crate::db`. Each service borrows the shared pool and the
//! [`crate::CommerceConfig`]; notification-sending services are generic
//! over a [`NotificationSink`].

pub mod accounts;
pub mod cart;
pub mod checkout;
pub mod coupons;
pub mod notifications;
pub mod orders;

pub use accounts::AccountService;
pub use cart::CartService;
pub use checkout::CheckoutService;
pub use coupons::{CouponService, check_eligibility, compute_discount};
pub use notifications::{LogSink, Notification, NotificationError, NotificationKind, NotificationSink};
pub use orders::OrderService;
