//! Remote cart store: the per-user, cross-device source of truth for
//! authenticated carts.
//!
//! # Contract
//!
//! ```text
//! GET    /cart?userId=U   -> { "items": CartItem[] }
//! POST   /cart            { "userId": U, "product": CartItem }  (merges by productId)
//! DELETE /cart/item       { "userId": U, "productId": P }
//! DELETE /cart/clear      { "userId": U }
//! ```
//!
//! [`HttpCartStore`] consumes this contract over HTTP. [`InMemoryCartStore`]
//! implements the same semantics in process and backs the reference cart API.

mod http;
mod memory;
mod retry;

pub use http::HttpCartStore;
pub use memory::InMemoryCartStore;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use larder_core::{Cart, CartItem, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when talking to the remote cart store.
#[derive(Debug, Error)]
pub enum CartStoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The configured base URL cannot address the cart endpoints.
    #[error("Invalid cart store URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl CartStoreError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Parse(_) | Self::InvalidUrl(_) => false,
        }
    }

    /// Whether the store cannot have applied the request, so that resending
    /// a non-idempotent call will not apply it twice.
    #[must_use]
    pub fn is_safe_to_resend(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect(),
            Self::Api { status, .. } => *status == 429,
            Self::Parse(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// Per-user cart persistence.
#[async_trait]
pub trait RemoteCartStore: Send + Sync {
    /// Fetch the cart for `user_id`. Unknown users have an empty cart.
    async fn fetch(&self, user_id: &UserId) -> Result<Cart, CartStoreError>;

    /// Add `item` to the user's cart, summing quantities with an existing
    /// line for the same product.
    async fn append(&self, user_id: &UserId, item: &CartItem) -> Result<(), CartStoreError>;

    /// Remove the line for `product_id` from the user's cart.
    async fn remove(&self, user_id: &UserId, product_id: &ProductId)
    -> Result<(), CartStoreError>;

    /// Remove every line from the user's cart.
    async fn clear(&self, user_id: &UserId) -> Result<(), CartStoreError>;
}

// =============================================================================
// Wire Types
// =============================================================================

/// Query string for `GET /cart`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartQuery {
    pub user_id: UserId,
}

/// Body of `GET /cart` and `POST /cart` responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartResponse {
    pub items: Cart,
}

/// Body of `POST /cart`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendItemRequest {
    pub user_id: UserId,
    pub product: CartItem,
}

/// Body of `DELETE /cart/item`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveItemRequest {
    pub user_id: UserId,
    pub product_id: ProductId,
}

/// Body of `DELETE /cart/clear`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearCartRequest {
    pub user_id: UserId,
}
