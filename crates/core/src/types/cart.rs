//! Cart lines and carts.
//!
//! A [`Cart`] keeps at most one [`CartItem`] per [`ProductId`], in insertion
//! order. Every constructor goes through [`Cart::insert`], so duplicate lines
//! coming from storage or the network are folded into one by summing
//! quantities.

use std::num::NonZeroU32;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Price, ProductId, ProductSnapshot};

/// Errors produced when a stored cart line fails validation.
#[derive(Debug, Error)]
pub enum CartItemError {
    /// The entry does not have the shape of a cart line, or one of its
    /// fields is out of range (blank id, negative price, zero quantity).
    #[error("invalid cart item: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// One product line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    pub title: String,
    #[serde(default)]
    pub image_url: String,
    pub price: Price,
    pub quantity: NonZeroU32,
}

impl CartItem {
    /// A single unit of `product`.
    #[must_use]
    pub fn from_snapshot(product: &ProductSnapshot) -> Self {
        Self {
            product_id: product.id.clone(),
            title: product.title.clone(),
            image_url: product.image_url.clone(),
            price: product.price,
            quantity: NonZeroU32::MIN,
        }
    }

    /// Parse and validate a line from untrusted JSON.
    ///
    /// # Errors
    ///
    /// Returns `CartItemError::Invalid` if the value is not a valid line.
    pub fn from_value(value: serde_json::Value) -> Result<Self, CartItemError> {
        Ok(serde_json::from_value(value)?)
    }

    /// `price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price.times(self.quantity.get())
    }
}

/// Result of loading a cart from untrusted storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizedCart {
    pub cart: Cart,
    /// Number of entries dropped because they failed validation.
    pub discarded: usize,
}

/// An ordered collection of cart lines, unique by product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CartItem>", into = "Vec<CartItem>")]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Parse a cart from untrusted JSON (an array of lines).
    ///
    /// Entries that fail validation are skipped and counted rather than
    /// failing the whole cart.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a JSON array.
    pub fn from_untrusted_json(raw: &str) -> Result<SanitizedCart, serde_json::Error> {
        let entries: Vec<serde_json::Value> = serde_json::from_str(raw)?;
        let mut sanitized = SanitizedCart::default();
        for entry in entries {
            match CartItem::from_value(entry) {
                Ok(item) => sanitized.cart.insert(item),
                Err(_) => sanitized.discarded += 1,
            }
        }
        Ok(sanitized)
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<CartItem> {
        self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find the line for `product_id`.
    #[must_use]
    pub fn get(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    /// Add one unit of `product`.
    ///
    /// Increments the existing line's quantity, or inserts a new line with
    /// quantity 1. Returns the line's resulting quantity.
    pub fn add_product(&mut self, product: &ProductSnapshot) -> NonZeroU32 {
        self.insert(CartItem::from_snapshot(product));
        self.get(&product.id)
            .map_or(NonZeroU32::MIN, |line| line.quantity)
    }

    /// Insert a line, summing quantities with an existing line for the same
    /// product. The existing line keeps its snapshot fields.
    pub fn insert(&mut self, item: CartItem) {
        match self.items.iter_mut().find(|line| line.product_id == item.product_id) {
            Some(line) => line.quantity = line.quantity.saturating_add(item.quantity.get()),
            None => self.items.push(item),
        }
    }

    /// A copy of this cart without `product_id`.
    #[must_use]
    pub fn without(&self, product_id: &ProductId) -> Self {
        Self {
            items: self
                .items
                .iter()
                .filter(|item| &item.product_id != product_id)
                .cloned()
                .collect(),
        }
    }

    /// Remove the line for `product_id`, regardless of its quantity.
    pub fn remove(&mut self, product_id: &ProductId) -> Option<CartItem> {
        let index = self.position(product_id)?;
        Some(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Merge `other` into a copy of this cart, summing quantities by product.
    ///
    /// Lines already in `self` keep their position and snapshot; lines only
    /// in `other` are appended in `other`'s order.
    #[must_use]
    pub fn merged_with(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for item in &other.items {
            merged.insert(item.clone());
        }
        merged
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.items
            .iter()
            .map(|item| u64::from(item.quantity.get()))
            .sum()
    }

    /// Sum of `price * quantity` across all lines, saturating at
    /// `Decimal::MAX`.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.items
            .iter()
            .map(CartItem::line_total)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    fn position(&self, product_id: &ProductId) -> Option<usize> {
        self.items
            .iter()
            .position(|item| &item.product_id == product_id)
    }
}

impl From<Vec<CartItem>> for Cart {
    fn from(items: Vec<CartItem>) -> Self {
        items.into_iter().collect()
    }
}

impl From<Cart> for Vec<CartItem> {
    fn from(cart: Cart) -> Self {
        cart.items
    }
}

impl FromIterator<CartItem> for Cart {
    fn from_iter<I: IntoIterator<Item = CartItem>>(iter: I) -> Self {
        let mut cart = Self::new();
        for item in iter {
            cart.insert(item);
        }
        cart
    }
}
