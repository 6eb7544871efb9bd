//! User entity for registration and verification flows.
//!
//! Authentication, sessions, and password hashing live outside this
//! crate; the password hash crosses the boundary as an opaque string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shoplite_core::{Email, UserId};

use crate::error::CommerceError;

/// A shop account.
///
/// Accounts start inactive and are activated by email verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Email,
    /// Opaque, pre-hashed credential supplied by the auth collaborator.
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

impl NewUser {
    /// Validate registration input before it reaches storage.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` if the username or either name
    /// is blank.
    pub fn validate(&self) -> Result<(), CommerceError> {
        if self.username.trim().is_empty() {
            return Err(CommerceError::Validation("Username is required.".to_owned()));
        }
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(CommerceError::Validation(
                "First and last name are required.".to_owned(),
            ));
        }
        Ok(())
    }
}
