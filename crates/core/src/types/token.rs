//! Opaque guest cart token.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when a presented cart token is not a valid token.
#[derive(thiserror::Error, Debug, Clone)]
#[error("invalid cart token")]
pub struct CartTokenError;

/// An opaque, unguessable token identifying a guest cart.
///
/// Issued when an unauthenticated request first touches a cart and echoed
/// back by the client on subsequent requests. Random v4 UUIDs keep the
/// token space unguessable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartToken(Uuid);

impl CartToken {
    /// Generate a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for CartToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CartToken {
    type Err = CartTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self).map_err(|_| CartTokenError)
    }
}
