//! Current-user identity and its sign-in/sign-out lifecycle.
//!
//! The identity provider itself is external. The cart only needs to know who
//! the current user is, if anyone, and to be told when that changes.

use larder_core::UserId;
use tokio::sync::watch;

/// Who the cart belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Identity {
    /// No signed-in user; the cart lives in the local cache.
    #[default]
    Guest,
    /// A signed-in user; the cart lives in the remote store.
    User(UserId),
}

impl Identity {
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Guest => None,
            Self::User(id) => Some(id),
        }
    }

    #[must_use]
    pub const fn is_guest(&self) -> bool {
        matches!(self, Self::Guest)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Guest => write!(f, "guest"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Source of the current identity and of identity changes.
pub trait IdentityProvider: Send + Sync {
    /// The identity right now.
    fn current(&self) -> Identity;

    /// A receiver notified on every sign-in and sign-out.
    fn subscribe(&self) -> watch::Receiver<Identity>;
}

/// Identity held for one client session.
///
/// `sign_in`/`sign_out` stand in for the identity provider's callbacks.
/// Repeating the current identity does not notify subscribers.
#[derive(Debug)]
pub struct SessionIdentity {
    sender: watch::Sender<Identity>,
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new(Identity::Guest)
    }
}

impl SessionIdentity {
    #[must_use]
    pub fn new(initial: Identity) -> Self {
        Self {
            sender: watch::Sender::new(initial),
        }
    }

    /// Returns `true` if the identity changed.
    pub fn sign_in(&self, user_id: UserId) -> bool {
        self.replace(Identity::User(user_id))
    }

    /// Returns `true` if the identity changed.
    pub fn sign_out(&self) -> bool {
        self.replace(Identity::Guest)
    }

    fn replace(&self, identity: Identity) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == identity {
                return false;
            }
            tracing::info!(from = %current, to = %identity, "Identity changed");
            *current = identity;
            true
        })
    }
}

impl IdentityProvider for SessionIdentity {
    fn current(&self) -> Identity {
        self.sender.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Identity> {
        self.sender.subscribe()
    }
}
