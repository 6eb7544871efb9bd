//! SQLite storage layer.
//!
//! ## Tables
//!
//! - `users` - Accounts (inactive until email verification)
//! - `email_verification_codes` / `email_change_requests` - One-time codes
//! - `products` / `product_images` - Catalog
//! - `coupons` / `coupon_products` - Discount rules and restrictions
//! - `carts` / `cart_items` - Open carts and lines
//! - `orders` / `order_items` - Immutable order snapshots
//!
//! Migrations are embedded from `crates/commerce/migrations/` and run via
//! [`run_migrations`].
//!
//! ## Concurrency
//!
//! SQLite's single-writer lock is the serialization primitive. Every
//! multi-statement mutation opens its transaction with a write statement
//! so the write lock is taken before anything is read; competing writers
//! then queue on the busy timeout instead of failing on a stale snapshot.

pub mod carts;
pub mod coupons;
pub mod one_time_codes;
pub mod orders;
pub mod products;
pub mod users;

use std::str::FromStr;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::SqlitePool;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::Row;
use thiserror::Error;

pub use carts::{CartRepository, CheckoutLine, LineChange};
pub use coupons::CouponRepository;
pub use one_time_codes::OneTimeCodeRepository;
pub use orders::{OrderDraft, OrderRepository};
pub use products::ProductRepository;
pub use users::UserRepository;

use shoplite_core::Money;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique code or username).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a sqlx error, turning unique and foreign-key violations into
    /// `Conflict`.
    #[must_use]
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Self::Conflict(format!("unique constraint: {db_err}"));
            }
            // SQLite reports ON DELETE RESTRICT with extended code 1811
            // (SQLITE_CONSTRAINT_TRIGGER), which is_foreign_key_violation
            // does not cover.
            if db_err.is_foreign_key_violation()
                || matches!(db_err.code().as_deref(), Some("787" | "1811"))
            {
                return Self::Conflict(format!("foreign key constraint: {db_err}"));
            }
        }
        Self::Database(err)
    }
}

/// Create a SQLite connection pool with sensible defaults.
///
/// WAL journaling, enforced foreign keys, and a busy timeout so
/// concurrent writers queue instead of erroring.
///
/// # Errors
///
/// Returns `sqlx::Error` if the URL is invalid or the database cannot be
/// opened.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url.expose_secret())?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

/// Run embedded migrations against the pool.
///
/// # Errors
///
/// Returns `sqlx::migrate::MigrateError` if any migration fails.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Read a money column stored as TEXT.
pub(crate) fn money_column(row: &SqliteRow, column: &str) -> Result<Money, RepositoryError> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid decimal in column {column}: {e}"))
    })
}

/// Read a decimal column stored as TEXT.
pub(crate) fn decimal_column(
    row: &SqliteRow,
    column: &str,
) -> Result<rust_decimal::Decimal, RepositoryError> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid decimal in column {column}: {e}"))
    })
}

/// TEXT representation for a money column.
pub(crate) fn money_text(amount: Money) -> String {
    amount.amount().to_string()
}
