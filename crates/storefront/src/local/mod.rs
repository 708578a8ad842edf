//! Local persistent cache for guest carts.
//!
//! A small string-keyed slot store that survives restarts. Only unauthenticated
//! state lives here; authenticated carts belong to the remote store.

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

use thiserror::Error;

/// Errors that can occur when reading or writing the local cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Slot keys are limited to ASCII letters, digits, `-` and `_`.
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

/// Slot names in the local cache.
pub mod keys {
    /// Key for the guest cart (JSON array of cart items).
    pub const GUEST_CART: &str = "guest_cart";

    /// Key for the signed-in user id remembered by the CLI session.
    pub const SESSION_USER: &str = "session_user";
}

/// Durable string-keyed storage on the client.
///
/// Reads and writes are synchronous; they are fast local operations and are
/// never awaited while holding cart state.
pub trait LocalCache: Send + Sync {
    /// Read a slot. Missing slots are `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the slot exists but cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write a slot, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the value cannot be stored.
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Delete a slot. Deleting a missing slot succeeds.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the slot exists but cannot be removed.
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

fn validate_key(key: &str) -> Result<(), CacheError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}
