//! Client-side cart state and its synchronization.

mod notification;
mod synchronizer;

pub use notification::{Notification, Operation, SyncStatus};
pub use synchronizer::{CartStatus, CartSynchronizer, HydrationOutcome};
