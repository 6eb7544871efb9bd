//! Shoplite Core - Shared types library.
//!
//! This crate provides common types used across all shoplite components:
//! - `commerce` - Catalog, cart, coupon, and checkout engine
//! - `integration-tests` - End-to-end test suite
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access. This
//! keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money, emails,
//!   cart tokens, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
