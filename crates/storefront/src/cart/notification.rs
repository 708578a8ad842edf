//! Soft notifications emitted by the cart synchronizer for the UI layer.

use std::num::NonZeroU32;

use larder_core::ProductId;

/// Outcome of a mutation with respect to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    /// Guest cart; written to the local cache only.
    Local,
    /// The remote store accepted the change.
    Synced,
    /// The remote call failed; the change exists in this session only.
    LocalOnly,
}

/// Remote operation names used in notifications and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Remove,
    Clear,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
            Self::Clear => write!(f, "clear"),
        }
    }
}

/// A message for the user. Never an error the caller must handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ItemAdded {
        product_id: ProductId,
        title: String,
        quantity: NonZeroU32,
    },
    ItemRemoved {
        product_id: ProductId,
    },
    CartCleared,
    CheckoutCompleted,
    /// A remote call failed and the change was kept locally.
    SyncedLocallyOnly {
        operation: Operation,
        reason: String,
    },
    /// The remote cart could not be loaded during sign-in.
    RemoteUnavailable {
        reason: String,
    },
}

impl Notification {
    /// Whether the UI should style this as a warning.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::SyncedLocallyOnly { .. } | Self::RemoteUnavailable { .. }
        )
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemAdded {
                title, quantity, ..
            } => write!(f, "Added {title} to your cart (quantity {quantity})"),
            Self::ItemRemoved { product_id } => write!(f, "Removed {product_id} from your cart"),
            Self::CartCleared => write!(f, "Your cart is empty"),
            Self::CheckoutCompleted => write!(f, "Order placed, thank you!"),
            Self::SyncedLocallyOnly { operation, .. } => write!(
                f,
                "Cart {operation} saved on this device only; it could not be synced"
            ),
            Self::RemoteUnavailable { .. } => {
                write!(f, "Your saved cart could not be loaded right now")
            }
        }
    }
}
