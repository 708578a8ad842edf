//! CLI commands and the session context they share.

pub mod cart;
pub mod checkout;
pub mod session;

use std::sync::Arc;

use larder_core::{CheckoutError, IdError, PriceError};
use larder_storefront::cart::{CartSynchronizer, Notification};
use larder_storefront::config::{CartSyncConfig, ConfigError};
use larder_storefront::local::{CacheError, FileCache};
use larder_storefront::store::{CartStoreError, HttpCartStore};
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cart store error: {0}")]
    Store(#[from] CartStoreError),

    #[error("Local cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Invalid ID: {0}")]
    InvalidId(#[from] IdError),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),
}

impl From<PriceError> for CommandError {
    fn from(err: PriceError) -> Self {
        Self::InvalidPrice(err.to_string())
    }
}

/// Everything a command needs: the synchronizer, the cache holding the
/// session slot, and a subscription to cart notifications.
pub struct Context {
    sync: CartSynchronizer,
    cache: Arc<FileCache>,
    notifications: broadcast::Receiver<Notification>,
}

impl Context {
    /// Build the context from environment configuration.
    ///
    /// The cart starts unhydrated; commands call [`Self::restore`] or sign
    /// in first.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if configuration is missing or invalid.
    pub fn open() -> Result<Self, CommandError> {
        let config = CartSyncConfig::from_env()?;
        let cache = Arc::new(FileCache::new(&config.cache_dir));
        let store = Arc::new(HttpCartStore::new(&config)?);
        let sync = CartSynchronizer::new(store, cache.clone());
        let notifications = sync.subscribe();
        Ok(Self {
            sync,
            cache,
            notifications,
        })
    }

    /// Hydrate the cart for the identity saved in the session slot.
    pub async fn restore(&self) {
        let identity = session::saved_identity(self.cache.as_ref());
        self.sync.hydrate(identity).await;
    }

    #[must_use]
    pub const fn sync(&self) -> &CartSynchronizer {
        &self.sync
    }

    #[must_use]
    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    /// Print every notification received so far.
    #[allow(clippy::print_stdout)]
    pub fn print_notifications(&mut self) {
        while let Ok(notification) = self.notifications.try_recv() {
            if notification.is_warning() {
                println!("! {notification}");
            } else {
                println!("* {notification}");
            }
        }
    }
}
