//! One-time codes for email verification and email change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shoplite_core::{Email, OneTimeCodeId, UserId};

/// A single-use numeric code proving control of an email address at
/// signup.
///
/// Issuing a new code deletes prior codes for the same address in the
/// same transaction, so at most one valid code exists per address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimeCode {
    pub id: OneTimeCodeId,
    pub email: Email,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

/// A single-use code confirming a user's new email address before the
/// change is applied. Same supersede semantics, keyed by user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailChangeRequest {
    pub id: OneTimeCodeId,
    pub user_id: UserId,
    pub new_email: Email,
    pub code: String,
    pub created_at: DateTime<Utc>,
}
