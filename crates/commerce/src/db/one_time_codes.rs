//! One-time code repository.
//!
//! Issue supersedes: writing a new code deletes prior codes for the same
//! key in the same transaction. Consume is a single guarded DELETE, so a
//! code can be redeemed at most once even under concurrent attempts.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use shoplite_core::{Email, OneTimeCodeId, UserId};

use super::RepositoryError;
use crate::models::{EmailChangeRequest, OneTimeCode};

/// Repository for email verification and email change codes.
pub struct OneTimeCodeRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OneTimeCodeRepository<'a> {
    /// Create a new one-time code repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Issue a verification code for an email address, superseding any
    /// outstanding code for the same address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if either statement fails.
    pub async fn issue_verification(
        &self,
        email: &Email,
        code: &str,
    ) -> Result<OneTimeCode, RepositoryError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM email_verification_codes WHERE email = ?")
            .bind(email.as_str())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "INSERT INTO email_verification_codes (email, code, created_at) VALUES (?, ?, ?)",
        )
        .bind(email.as_str())
        .bind(code)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(OneTimeCode {
            id: OneTimeCodeId::new(result.last_insert_rowid()),
            email: email.clone(),
            code: code.to_owned(),
            created_at: now,
        })
    }

    /// Redeem a verification code issued after `issued_after`. Returns
    /// `true` if a matching unexpired code existed and was deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn consume_verification(
        &self,
        email: &Email,
        code: &str,
        issued_after: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM email_verification_codes \
             WHERE email = ? AND code = ? AND created_at > ?",
        )
        .bind(email.as_str())
        .bind(code)
        .bind(issued_after)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Drop any outstanding verification codes for an address. Used to
    /// unwind an issuance whose email could not be sent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn revoke_verification(&self, email: &Email) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM email_verification_codes WHERE email = ?")
            .bind(email.as_str())
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Drop any outstanding email change requests for a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn revoke_email_change(&self, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM email_change_requests WHERE user_id = ?")
            .bind(user_id.as_i64())
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Issue an email change code for a user, superseding any
    /// outstanding request for the same user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if either statement fails.
    pub async fn issue_email_change(
        &self,
        user_id: UserId,
        new_email: &Email,
        code: &str,
    ) -> Result<EmailChangeRequest, RepositoryError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM email_change_requests WHERE user_id = ?")
            .bind(user_id.as_i64())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "INSERT INTO email_change_requests (user_id, new_email, code, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(user_id.as_i64())
        .bind(new_email.as_str())
        .bind(code)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(EmailChangeRequest {
            id: OneTimeCodeId::new(result.last_insert_rowid()),
            user_id,
            new_email: new_email.clone(),
            code: code.to_owned(),
            created_at: now,
        })
    }

    /// Redeem an email change code issued after `issued_after`. Returns
    /// the confirmed new address when a matching unexpired request
    /// existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DataCorruption` if the stored address
    /// no longer parses.
    pub async fn consume_email_change(
        &self,
        user_id: UserId,
        code: &str,
        issued_after: DateTime<Utc>,
    ) -> Result<Option<Email>, RepositoryError> {
        let row = sqlx::query(
            "DELETE FROM email_change_requests \
             WHERE user_id = ? AND code = ? AND created_at > ? \
             RETURNING new_email",
        )
        .bind(user_id.as_i64())
        .bind(code)
        .bind(issued_after)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("new_email")?;
                let email = raw.parse::<Email>().map_err(|e| {
                    RepositoryError::DataCorruption(format!("email change request: {e}"))
                })?;
                Ok(Some(email))
            }
            None => Ok(None),
        }
    }
}
