//! Explicit request identity.
//!
//! Session handling lives in the calling layer; every cart and checkout
//! operation takes the acting identity as a parameter instead of reading
//! ambient request state.

use shoplite_core::UserId;

/// Who is performing a cart or checkout operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// An authenticated user.
    User(UserId),
    /// An unauthenticated browser, optionally holding a cart token.
    Guest,
}

impl Identity {
    /// The authenticated user ID, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(*id),
            Self::Guest => None,
        }
    }

    /// Whether this identity is an authenticated user.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }
}
