//! Account registration and email verification flows.
//!
//! Accounts start inactive. Registration issues a one-time code and
//! mails it; if the mail cannot be sent the account and code are
//! deleted again, so no unconfirmable account is left behind. Email
//! changes follow the same issue-confirm shape, keyed by user.

use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use tracing::{info, warn};

use shoplite_core::{Email, UserId};

use crate::config::CommerceConfig;
use crate::db::{OneTimeCodeRepository, RepositoryError, UserRepository};
use crate::error::{CommerceError, Result};
use crate::services::notifications::{
    NotificationSink, email_change_message, otp_message,
};
use crate::models::{NewUser, User};

/// Registration, verification, and email change operations.
pub struct AccountService<'a, S> {
    pool: &'a SqlitePool,
    config: &'a CommerceConfig,
    sink: &'a S,
}

/// A 6-digit numeric one-time code.
fn generate_otp() -> String {
    rand::rng().random_range(100_000..1_000_000).to_string()
}

impl<'a, S: NotificationSink> AccountService<'a, S> {
    /// Create a new account service.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool, config: &'a CommerceConfig, sink: &'a S) -> Self {
        Self { pool, config, sink }
    }

    /// Register an inactive account and mail its verification code.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Conflict` for a taken username or email,
    /// and `CommerceError::ServiceUnavailable` when the verification
    /// mail cannot be sent; in the latter case the account is deleted
    /// again.
    pub async fn register(&self, new: &NewUser) -> Result<User> {
        new.validate()?;
        let users = UserRepository::new(self.pool);
        let user = users.create(new).await.map_err(|err| match err {
            RepositoryError::Conflict(_) => CommerceError::Conflict(
                "A user with that username or email already exists.".to_owned(),
            ),
            other => other.into(),
        })?;

        if let Err(err) = self.issue_and_send_verification(&user.email).await {
            warn!(user = %user.id, error = %err, "verification send failed; rolling back signup");
            OneTimeCodeRepository::new(self.pool)
                .revoke_verification(&user.email)
                .await?;
            users.delete(user.id).await?;
            return Err(CommerceError::ServiceUnavailable(
                "Could not send verification email.".to_owned(),
            ));
        }

        info!(user = %user.id, "account registered");
        Ok(user)
    }

    /// Re-issue and mail a verification code for an unverified account.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` when the account is already
    /// verified and `CommerceError::ServiceUnavailable` when the mail
    /// cannot be sent; the superseding code is revoked in that case.
    pub async fn resend_verification(&self, email: &Email) -> Result<()> {
        let user = UserRepository::new(self.pool)
            .get_by_email(email)
            .await?
            .ok_or_else(|| CommerceError::NotFound("User not found.".to_owned()))?;
        if user.is_active {
            return Err(CommerceError::Validation(
                "Account is already verified.".to_owned(),
            ));
        }

        if let Err(err) = self.issue_and_send_verification(&user.email).await {
            warn!(user = %user.id, error = %err, "verification resend failed");
            OneTimeCodeRepository::new(self.pool)
                .revoke_verification(&user.email)
                .await?;
            return Err(CommerceError::ServiceUnavailable(
                "Could not send verification email.".to_owned(),
            ));
        }
        Ok(())
    }

    /// Redeem a verification code and activate the account.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` for a wrong or expired code.
    pub async fn verify_email(&self, email: &Email, otp: &str) -> Result<User> {
        let consumed = OneTimeCodeRepository::new(self.pool)
            .consume_verification(email, otp, self.expiry_cutoff())
            .await?;
        if !consumed {
            return Err(CommerceError::Validation("Invalid or expired code.".to_owned()));
        }

        let users = UserRepository::new(self.pool);
        let mut user = users
            .get_by_email(email)
            .await?
            .ok_or_else(|| CommerceError::NotFound("User not found.".to_owned()))?;
        users.activate(user.id).await?;
        user.is_active = true;

        info!(user = %user.id, "email verified");
        Ok(user)
    }

    /// Issue and mail a code confirming a new address for a user. The
    /// account's address is not changed until the code is redeemed.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Conflict` when another account already
    /// holds the address, and `CommerceError::ServiceUnavailable` when
    /// the mail cannot be sent; the request is revoked in that case.
    pub async fn request_email_change(&self, user_id: UserId, new_email: &Email) -> Result<()> {
        let users = UserRepository::new(self.pool);
        users
            .get(user_id)
            .await?
            .ok_or_else(|| CommerceError::NotFound("User not found.".to_owned()))?;
        if let Some(holder) = users.get_by_email(new_email).await? {
            if holder.id != user_id {
                return Err(CommerceError::Conflict(
                    "That email address is already in use.".to_owned(),
                ));
            }
        }

        let codes = OneTimeCodeRepository::new(self.pool);
        let otp = generate_otp();
        codes.issue_email_change(user_id, new_email, &otp).await?;

        let message = email_change_message(
            &self.config.from_email,
            new_email,
            &otp,
            self.config.otp_expire_minutes,
        );
        if let Err(err) = self.sink.send(message).await {
            warn!(user = %user_id, error = %err, "email change send failed");
            codes.revoke_email_change(user_id).await?;
            return Err(CommerceError::ServiceUnavailable(
                "Could not send verification email.".to_owned(),
            ));
        }
        Ok(())
    }

    /// Redeem an email change code and apply the new address.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` for a wrong or expired code
    /// and `CommerceError::Conflict` when the address was taken in the
    /// meantime.
    pub async fn confirm_email_change(&self, user_id: UserId, otp: &str) -> Result<User> {
        let new_email = OneTimeCodeRepository::new(self.pool)
            .consume_email_change(user_id, otp, self.expiry_cutoff())
            .await?
            .ok_or_else(|| CommerceError::Validation("Invalid or expired code.".to_owned()))?;

        let users = UserRepository::new(self.pool);
        users.set_email(user_id, &new_email).await.map_err(|err| match err {
            RepositoryError::Conflict(_) => {
                CommerceError::Conflict("That email address is already in use.".to_owned())
            }
            other => other.into(),
        })?;

        let user = users
            .get(user_id)
            .await?
            .ok_or_else(|| CommerceError::NotFound("User not found.".to_owned()))?;
        info!(user = %user.id, "email changed");
        Ok(user)
    }

    async fn issue_and_send_verification(&self, email: &Email) -> Result<()> {
        let otp = generate_otp();
        OneTimeCodeRepository::new(self.pool)
            .issue_verification(email, &otp)
            .await?;
        let message = otp_message(
            &self.config.from_email,
            email,
            &otp,
            self.config.otp_expire_minutes,
        );
        self.sink
            .send(message)
            .await
            .map_err(|err| CommerceError::ServiceUnavailable(err.to_string()))?;
        Ok(())
    }

    /// Codes issued at or before this instant are expired.
    fn expiry_cutoff(&self) -> chrono::DateTime<Utc> {
        Utc::now() - Duration::minutes(self.config.otp_expire_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_otp_is_six_digits() {
        for _ in 0..100 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
