//! Commerce configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOPLITE_DATABASE_URL` - SQLite connection URL (e.g.
//!   `sqlite:///var/lib/shoplite/shop.db`)
//!
//! ## Optional
//! - `SHOPLITE_MIN_ORDER_AMOUNT` - Minimum order subtotal accepted at
//!   checkout (default: 0.00)
//! - `SHOPLITE_OTP_EXPIRE_MINUTES` - Validity window for one-time codes
//!   (default: 10)
//! - `SHOPLITE_FROM_EMAIL` - Sender address handed to the notification
//!   sink (default: no-reply@shoplite.local)

use secrecy::SecretString;
use thiserror::Error;

use shoplite_core::{Email, Money};

const DEFAULT_MIN_ORDER_AMOUNT: &str = "0.00";
const DEFAULT_OTP_EXPIRE_MINUTES: i64 = 10;
const DEFAULT_FROM_EMAIL: &str = "no-reply@shoplite.local";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Commerce engine configuration.
#[derive(Debug, Clone)]
pub struct CommerceConfig {
    /// SQLite database connection URL.
    pub database_url: SecretString,
    /// Minimum order subtotal accepted at checkout.
    pub min_order_amount: Money,
    /// Validity window for one-time codes, in minutes.
    pub otp_expire_minutes: i64,
    /// Sender address for outgoing notifications.
    pub from_email: Email,
}

impl CommerceConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or any
    /// variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = require_env("SHOPLITE_DATABASE_URL")?;

        let min_order_amount = optional_env("SHOPLITE_MIN_ORDER_AMOUNT")
            .unwrap_or_else(|| DEFAULT_MIN_ORDER_AMOUNT.to_owned());
        let min_order_amount: Money = min_order_amount.parse().map_err(|e| {
            ConfigError::InvalidEnvVar("SHOPLITE_MIN_ORDER_AMOUNT".to_owned(), format!("{e}"))
        })?;
        if min_order_amount.is_negative() {
            return Err(ConfigError::InvalidEnvVar(
                "SHOPLITE_MIN_ORDER_AMOUNT".to_owned(),
                "must not be negative".to_owned(),
            ));
        }

        let otp_expire_minutes = match optional_env("SHOPLITE_OTP_EXPIRE_MINUTES") {
            None => DEFAULT_OTP_EXPIRE_MINUTES,
            Some(raw) => raw.parse::<i64>().ok().filter(|m| *m > 0).ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "SHOPLITE_OTP_EXPIRE_MINUTES".to_owned(),
                    "must be a positive integer".to_owned(),
                )
            })?,
        };

        let from_email =
            optional_env("SHOPLITE_FROM_EMAIL").unwrap_or_else(|| DEFAULT_FROM_EMAIL.to_owned());
        let from_email = Email::parse(&from_email).map_err(|e| {
            ConfigError::InvalidEnvVar("SHOPLITE_FROM_EMAIL".to_owned(), format!("{e}"))
        })?;

        Ok(Self {
            database_url: SecretString::from(database_url),
            min_order_amount: min_order_amount.round2(),
            otp_expire_minutes,
            from_email,
        })
    }
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_owned()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
