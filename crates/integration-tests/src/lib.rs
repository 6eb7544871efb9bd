//! Integration test support for shoplite.
//!
//! Each [`TestShop`] owns a fresh SQLite database under the system temp
//! directory with migrations applied, so tests are hermetic and can run
//! in parallel. Seed helpers go through the production repositories, and
//! the recording/failing sinks stand in for the notification boundary.

#![forbid(unsafe_code)]

use std::sync::{Mutex, Once};

use secrecy::SecretString;
use sqlx::SqlitePool;
use uuid::Uuid;

use shoplite_commerce::config::CommerceConfig;
use shoplite_commerce::db::{self, CouponRepository, ProductRepository, UserRepository};
use shoplite_commerce::models::{Coupon, NewCoupon, NewProduct, NewUser, Product, User};
use shoplite_commerce::services::{Notification, NotificationError, NotificationSink};
use shoplite_core::{DiscountType, Money};

static TRACING: Once = Once::new();

/// Route tracing output through the test writer so `--nocapture` shows it.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A fresh shop backed by its own temporary database.
pub struct TestShop {
    pub pool: SqlitePool,
    pub config: CommerceConfig,
}

impl TestShop {
    /// Create a new shop with migrations applied and default config.
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be created or migrated.
    pub async fn new() -> Self {
        init_tracing();
        let path = std::env::temp_dir().join(format!("shoplite-test-{}.db", Uuid::new_v4()));
        let database_url = SecretString::from(format!("sqlite://{}", path.display()));
        let pool = db::create_pool(&database_url)
            .await
            .expect("create test database");
        db::run_migrations(&pool).await.expect("run migrations");

        let config = CommerceConfig {
            database_url,
            min_order_amount: Money::ZERO,
            otp_expire_minutes: 10,
            from_email: "shop@test.local".parse().expect("from email"),
        };
        Self { pool, config }
    }

    /// Set the minimum order amount enforced at checkout.
    #[must_use]
    pub fn with_min_order(mut self, amount: &str) -> Self {
        self.config.min_order_amount = amount.parse().expect("decimal");
        self
    }

    /// Seed an active product.
    ///
    /// # Panics
    ///
    /// Panics if the insert fails.
    pub async fn seed_product(&self, name: &str, price: &str, stock: i64) -> Product {
        ProductRepository::new(&self.pool)
            .create(&NewProduct {
                name: name.to_owned(),
                price: price.parse().expect("decimal"),
                short_description: String::new(),
                stock_quantity: stock,
                is_active: true,
                image: None,
            })
            .await
            .expect("seed product")
    }

    /// Seed an inactive product.
    ///
    /// # Panics
    ///
    /// Panics if the insert fails.
    pub async fn seed_inactive_product(&self, name: &str, price: &str, stock: i64) -> Product {
        ProductRepository::new(&self.pool)
            .create(&NewProduct {
                name: name.to_owned(),
                price: price.parse().expect("decimal"),
                short_description: String::new(),
                stock_quantity: stock,
                is_active: false,
                image: None,
            })
            .await
            .expect("seed product")
    }

    /// Seed an active, verified user.
    ///
    /// # Panics
    ///
    /// Panics if the insert fails.
    pub async fn seed_user(&self, username: &str, email: &str) -> User {
        let repo = UserRepository::new(&self.pool);
        let mut user = repo
            .create(&NewUser {
                username: username.to_owned(),
                email: email.parse().expect("email"),
                password_hash: "argon2-hash-placeholder".to_owned(),
                first_name: "Test".to_owned(),
                last_name: "User".to_owned(),
            })
            .await
            .expect("seed user");
        repo.activate(user.id).await.expect("activate user");
        user.is_active = true;
        user
    }

    /// Seed a coupon from prepared management input.
    ///
    /// # Panics
    ///
    /// Panics if the insert fails.
    pub async fn seed_coupon(&self, new: &NewCoupon) -> Coupon {
        CouponRepository::new(&self.pool)
            .create(new)
            .await
            .expect("seed coupon")
    }
}

/// A currently valid coupon definition, open for customization.
#[must_use]
pub fn coupon_input(code: &str, discount_type: DiscountType, value: &str) -> NewCoupon {
    let now = chrono::Utc::now();
    NewCoupon {
        code: code.to_owned(),
        discount_type,
        discount_value: value.parse().expect("decimal"),
        start_at: now - chrono::Duration::days(1),
        end_at: now + chrono::Duration::days(1),
        minimum_cart_value: Money::ZERO,
        usage_limit: None,
        is_enabled: true,
        applicable_products: Vec::new(),
    }
}

/// A sink that records every notification it is handed.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of notifications delivered so far.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sent.lock().expect("sink lock").len()
    }

    /// Drain and return everything delivered so far.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.sent.lock().expect("sink lock"))
    }
}

impl NotificationSink for RecordingSink {
    async fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        self.sent.lock().expect("sink lock").push(notification);
        Ok(())
    }
}

/// A sink whose every send fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSink;

impl NotificationSink for FailingSink {
    async fn send(&self, _notification: Notification) -> Result<(), NotificationError> {
        Err(NotificationError("sink unavailable".to_owned()))
    }
}
