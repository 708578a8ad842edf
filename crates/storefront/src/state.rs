//! Application state shared across cart API handlers.

use std::sync::Arc;

use crate::config::CartApiConfig;
use crate::store::InMemoryCartStore;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: CartApiConfig,
    carts: InMemoryCartStore,
}

impl AppState {
    #[must_use]
    pub fn new(config: CartApiConfig) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                carts: InMemoryCartStore::new(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CartApiConfig {
        &self.inner.config
    }

    /// Every user's cart.
    #[must_use]
    pub fn carts(&self) -> &InMemoryCartStore {
        &self.inner.carts
    }
}
