//! User account repository.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use shoplite_core::{Email, UserId};

use super::RepositoryError;
use crate::models::{NewUser, User};

/// Repository for account database operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

fn map_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    let email: String = row.try_get("email")?;
    let email = email
        .parse::<Email>()
        .map_err(|e| RepositoryError::DataCorruption(format!("user email: {e}")))?;
    Ok(User {
        id: UserId::new(row.try_get("id")?),
        username: row.try_get("username")?,
        email,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// The password hash is written but never read back; auth lives outside
// this crate and the model stays hash-free.
const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, is_active, created_at, updated_at";

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an inactive user awaiting email verification.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` when the username or email is
    /// already taken.
    pub async fn create(&self, new: &NewUser) -> Result<User, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users \
             (username, email, password_hash, first_name, last_name, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&new.username)
        .bind(new.email.as_str())
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        Ok(User {
            id: UserId::new(result.last_insert_rowid()),
            username: new.username.clone(),
            email: new.email.clone(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            is_active: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id.as_i64())
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(map_user).transpose()
    }

    /// Look up a user by email, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email.as_str())
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(map_user).transpose()
    }

    /// Look up a user by username, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"))
            .bind(username)
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(map_user).transpose()
    }

    /// Mark a user's email as verified.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such user exists.
    pub async fn activate(&self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET is_active = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id.as_i64())
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Replace a user's email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` when another account already
    /// holds the address, and `RepositoryError::NotFound` if the user
    /// does not exist.
    pub async fn set_email(&self, id: UserId, email: &Email) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET email = ?, updated_at = ? WHERE id = ?")
            .bind(email.as_str())
            .bind(Utc::now())
            .bind(id.as_i64())
            .execute(self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Delete a user. Used to unwind a registration whose verification
    /// email could not be sent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.as_i64())
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
