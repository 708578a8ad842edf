//! Core types for Larder.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod cart;
pub mod checkout;
pub mod id;
pub mod price;
pub mod product;

pub use cart::{Cart, CartItem, CartItemError, SanitizedCart};
pub use checkout::{Checkout, CheckoutError, CheckoutStep};
pub use id::{IdError, ProductId, UserId};
pub use price::{Price, PriceError};
pub use product::ProductSnapshot;
