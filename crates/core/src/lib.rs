//! Larder Core - Shared types library.
//!
//! This crate provides the domain types used across all Larder components:
//! - `storefront` - Cart synchronizer, cart store clients, reference cart API
//! - `cli` - Command-line cart client
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no storage. Parsing untrusted cart JSON lives here because it is
//! a pure transform; reading it from disk does not.
//!
//! # Modules
//!
//! - [`types`] - Ids, prices, cart items, carts, and the checkout step machine

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
