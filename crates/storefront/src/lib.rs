//! Larder cart synchronization.
//!
//! The client side keeps a shopper's cart consistent across a local cache
//! (guests) and a remote cart store (signed-in users), merging the guest
//! cart into the user's cart on sign-in. The server side is a reference
//! implementation of the remote cart store's HTTP contract.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod config;
pub mod error;
pub mod identity;
pub mod local;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod store;

pub use routes::app;
