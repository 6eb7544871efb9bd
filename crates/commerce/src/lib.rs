//! Shoplite commerce engine.
//!
//! Catalog, guest/user shopping carts, coupon discounts, and the atomic
//! checkout transaction, backed by SQLite. HTTP routing, sessions, email
//! transport, and password hashing are external collaborators: callers
//! pass an explicit [`Identity`], opaque password hashes, and a
//! [`services::NotificationSink`] implementation.
//!
//! # Modules
//!
//! - [`config`] - Environment-driven configuration
//! - [`db`] - SQLite pool, migrations, and repositories
//! - [`error`] - The service-level error type
//! - [`models`] - Domain entities
//! - [`services`] - Cart, coupon, checkout, order, and account operations
//! - [`identity`] - The per-request identity parameter

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod services;

pub use config::{CommerceConfig, ConfigError};
pub use error::{CommerceError, Result};
pub use identity::Identity;
