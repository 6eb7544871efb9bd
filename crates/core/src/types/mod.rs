//! Core types for shoplite.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod status;
pub mod token;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::Money;
pub use status::{DiscountType, OrderStatus, StatusParseError};
pub use token::{CartToken, CartTokenError};
