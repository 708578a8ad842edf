//! Product snapshot handed to the cart by the storefront UI.

use serde::{Deserialize, Serialize};

use super::{Price, ProductId};

/// The product fields a cart line freezes at add time.
///
/// Title, image and price are not re-read from the catalog afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub title: String,
    pub price: Price,
    #[serde(default)]
    pub image_url: String,
}

impl ProductSnapshot {
    /// Create a snapshot.
    #[must_use]
    pub fn new(
        id: ProductId,
        title: impl Into<String>,
        price: Price,
        image_url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            price,
            image_url: image_url.into(),
        }
    }
}
