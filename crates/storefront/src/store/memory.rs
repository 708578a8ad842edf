//! In-process cart store.

use std::collections::HashMap;

use async_trait::async_trait;
use larder_core::{Cart, CartItem, ProductId, UserId};
use tokio::sync::RwLock;

use super::{CartStoreError, RemoteCartStore};

/// Cart store holding every user's cart in memory.
///
/// Carts are lost on restart. Used by the reference cart API and in tests.
#[derive(Debug, Default)]
pub struct InMemoryCartStore {
    carts: RwLock<HashMap<UserId, Cart>>,
}

impl InMemoryCartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RemoteCartStore for InMemoryCartStore {
    async fn fetch(&self, user_id: &UserId) -> Result<Cart, CartStoreError> {
        Ok(self
            .carts
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, user_id: &UserId, item: &CartItem) -> Result<(), CartStoreError> {
        self.carts
            .write()
            .await
            .entry(user_id.clone())
            .or_default()
            .insert(item.clone());
        Ok(())
    }

    async fn remove(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
    ) -> Result<(), CartStoreError> {
        if let Some(cart) = self.carts.write().await.get_mut(user_id) {
            cart.remove(product_id);
        }
        Ok(())
    }

    async fn clear(&self, user_id: &UserId) -> Result<(), CartStoreError> {
        self.carts.write().await.remove(user_id);
        Ok(())
    }
}
