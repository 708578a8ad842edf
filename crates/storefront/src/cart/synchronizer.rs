//! The cart synchronizer.
//!
//! Owns the in-memory cart and keeps it consistent with the local cache
//! (guest) or the remote store (signed-in user).
//!
//! # Consistency
//!
//! - Mutations update the in-memory cart first, in call order, then talk to
//!   the remote store. Remote failures never undo the local change.
//! - Guest mutations write the whole cart to the local cache while the
//!   state lock is held, so the cache always matches the last in-memory
//!   update.
//! - Each hydration takes a generation number. Only the newest hydration may
//!   apply its result; older ones resolve as [`HydrationOutcome::Superseded`].
//! - The state lock is never held across an `.await`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use larder_core::{
    Cart, CartItem, Checkout, CheckoutError, CheckoutStep, ProductId, ProductSnapshot,
    SanitizedCart, UserId,
};
use rust_decimal::Decimal;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::notification::{Notification, Operation, SyncStatus};
use crate::identity::Identity;
use crate::local::{LocalCache, keys};
use crate::store::{CartStoreError, RemoteCartStore};

/// Buffered notifications per subscriber before old ones are dropped.
const NOTIFICATION_CAPACITY: usize = 64;

/// Hydration status of the in-memory cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CartStatus {
    /// A hydration is in flight; the cart should not be trusted yet.
    Loading,
    Ready,
}

/// Result of a call to [`CartSynchronizer::hydrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationOutcome {
    /// The hydrated cart replaced the in-memory cart.
    Applied { total_items: u64 },
    /// A newer hydration started before this one finished; its result was
    /// dropped.
    Superseded,
}

/// Handle to the cart state. Cheap to clone; clones share the same cart.
#[derive(Clone)]
pub struct CartSynchronizer {
    inner: Arc<Inner>,
}

struct Inner {
    remote: Arc<dyn RemoteCartStore>,
    local: Arc<dyn LocalCache>,
    state: Mutex<CartState>,
    generation: AtomicU64,
    status: watch::Sender<CartStatus>,
    notifications: broadcast::Sender<Notification>,
}

#[derive(Default)]
struct CartState {
    identity: Identity,
    cart: Cart,
}

impl CartSynchronizer {
    /// Create a synchronizer with an empty cart in the `Loading` state.
    ///
    /// Call [`Self::hydrate`] or [`Self::watch_identity`] before trusting the
    /// cart.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteCartStore>, local: Arc<dyn LocalCache>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                remote,
                local,
                state: Mutex::new(CartState::default()),
                generation: AtomicU64::new(0),
                status: watch::Sender::new(CartStatus::Loading),
                notifications,
            }),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Snapshot of the current cart.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.state().cart.clone()
    }

    /// The identity the cart currently belongs to.
    #[must_use]
    pub fn identity(&self) -> Identity {
        self.state().identity.clone()
    }

    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.state().cart.total_items()
    }

    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.state().cart.total_price()
    }

    #[must_use]
    pub fn status(&self) -> CartStatus {
        *self.inner.status.borrow()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status() == CartStatus::Loading
    }

    /// Wait until the newest hydration has been applied.
    pub async fn wait_ready(&self) {
        let mut status = self.inner.status.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = status.wait_for(|s| *s == CartStatus::Ready).await;
    }

    /// Receive notifications emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    // =========================================================================
    // Hydration
    // =========================================================================

    /// Load the cart for `identity`, replacing the in-memory cart.
    ///
    /// Guests load from the local cache. Signed-in users load from the remote
    /// store; a non-empty guest cart is merged in by product, replayed to the
    /// remote store and removed from the local cache.
    #[instrument(skip(self), fields(identity = %identity))]
    pub async fn hydrate(&self, identity: Identity) -> HydrationOutcome {
        let generation = {
            let mut state = self.state();
            state.identity = identity.clone();
            self.inner.status.send_replace(CartStatus::Loading);
            self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let cart = match identity.user_id() {
            None => Some(self.load_guest_cart()),
            Some(user_id) => self.reconcile(user_id, generation).await,
        };

        let mut state = self.state();
        let Some(cart) = cart.filter(|_| self.is_current(generation)) else {
            debug!(generation, "Discarding stale hydration");
            return HydrationOutcome::Superseded;
        };
        let total_items = cart.total_items();
        state.cart = cart;
        self.inner.status.send_replace(CartStatus::Ready);
        drop(state);

        info!(total_items, "Cart hydrated");
        HydrationOutcome::Applied { total_items }
    }

    /// Hydrate on every identity change, starting with the current identity.
    ///
    /// Each change starts a new hydration without waiting for the previous
    /// one, which is then superseded. The task ends when the identity
    /// provider drops its sender.
    pub fn watch_identity(&self, mut identities: watch::Receiver<Identity>) -> JoinHandle<()> {
        let sync = self.clone();
        tokio::spawn(async move {
            let mut identity = identities.borrow_and_update().clone();
            loop {
                let hydration = sync.clone();
                tokio::spawn(async move {
                    hydration.hydrate(identity).await;
                });
                if identities.changed().await.is_err() {
                    break;
                }
                identity = identities.borrow_and_update().clone();
            }
        })
    }

    /// Fetch the user's remote cart and fold the guest cart into it.
    ///
    /// Returns `None` if the hydration went stale before the guest slot was
    /// removed. Replay stops at the next item and the guest cart stays in
    /// place for whoever is current.
    async fn reconcile(&self, user_id: &UserId, generation: u64) -> Option<Cart> {
        let guest = self.load_guest_cart();
        let remote = match self.inner.remote.fetch(user_id).await {
            Ok(cart) => cart,
            Err(e) => {
                warn!(error = %e, "Failed to fetch remote cart, starting from empty");
                self.notify(Notification::RemoteUnavailable {
                    reason: e.to_string(),
                });
                Cart::new()
            }
        };

        if !self.is_current(generation) {
            return None;
        }
        if guest.is_empty() {
            return Some(remote);
        }

        let merged = remote.merged_with(&guest);
        for item in guest.items() {
            if !self.is_current(generation) {
                info!("Sign-in superseded during merge, keeping guest cart");
                return None;
            }
            if let Err(e) = self.inner.remote.append(user_id, item).await {
                warn!(
                    error = %e,
                    product_id = %item.product_id,
                    "Failed to copy guest cart item to remote cart"
                );
            }
        }

        {
            // Generations only advance under the state lock.
            let _state = self.state();
            if !self.is_current(generation) {
                info!("Sign-in superseded during merge, keeping guest cart");
                return None;
            }
            self.remove_guest_cart();
        }
        info!(guest_lines = guest.len(), "Merged guest cart into user cart");

        Some(if merged.is_empty() { guest } else { merged })
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add one unit of `product` to the cart.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add_to_cart(&self, product: &ProductSnapshot) -> SyncStatus {
        let (identity, quantity) = {
            let mut state = self.state();
            let quantity = state.cart.add_product(product);
            if state.identity.is_guest() {
                self.save_guest_cart(&state.cart);
            }
            (state.identity.clone(), quantity)
        };

        let sync = match identity.user_id() {
            None => SyncStatus::Local,
            Some(user_id) => {
                let item = CartItem::from_snapshot(product);
                let result = self.inner.remote.append(user_id, &item).await;
                self.settle(Operation::Add, result)
            }
        };

        self.notify(Notification::ItemAdded {
            product_id: product.id.clone(),
            title: product.title.clone(),
            quantity,
        });
        sync
    }

    /// Remove the line for `product_id`, whatever its quantity.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_from_cart(&self, product_id: &ProductId) -> SyncStatus {
        let (identity, removed) = {
            let mut state = self.state();
            let filtered = state.cart.without(product_id);
            let removed = filtered.len() != state.cart.len();
            if state.identity.is_guest() {
                self.save_guest_cart(&filtered);
            }
            state.cart = filtered;
            (state.identity.clone(), removed)
        };

        let sync = match identity.user_id() {
            None => SyncStatus::Local,
            Some(user_id) => {
                let result = self.inner.remote.remove(user_id, product_id).await;
                self.settle(Operation::Remove, result)
            }
        };

        if removed {
            self.notify(Notification::ItemRemoved {
                product_id: product_id.clone(),
            });
        }
        sync
    }

    /// Empty the cart and the guest cache slot.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> SyncStatus {
        let identity = {
            let mut state = self.state();
            state.cart.clear();
            self.remove_guest_cart();
            state.identity.clone()
        };

        let sync = match identity.user_id() {
            None => SyncStatus::Local,
            Some(user_id) => {
                let result = self.inner.remote.clear(user_id).await;
                self.settle(Operation::Clear, result)
            }
        };

        self.notify(Notification::CartCleared);
        sync
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Start checkout for the current cart.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` if the cart is empty.
    pub fn begin_checkout(&self) -> Result<Checkout, CheckoutError> {
        Checkout::start(&self.state().cart)
    }

    /// Finish a checkout that has reached review, then empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidTransition` unless `checkout` is at the
    /// review step, or `CheckoutError::EmptyCart` if the cart was emptied in
    /// the meantime.
    pub async fn complete_checkout(
        &self,
        checkout: &mut Checkout,
    ) -> Result<SyncStatus, CheckoutError> {
        if checkout.step() != CheckoutStep::Review {
            return Err(CheckoutError::InvalidTransition {
                from: checkout.step(),
                action: "complete checkout",
            });
        }
        let empty = self.state().cart.is_empty();
        if empty {
            return Err(CheckoutError::EmptyCart);
        }

        checkout.advance()?;
        let sync = self.clear_cart().await;
        self.notify(Notification::CheckoutCompleted);
        Ok(sync)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn state(&self) -> MutexGuard<'_, CartState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    fn notify(&self, notification: Notification) {
        // No subscribers is fine.
        let _ = self.inner.notifications.send(notification);
    }

    fn settle(&self, operation: Operation, result: Result<(), CartStoreError>) -> SyncStatus {
        match result {
            Ok(()) => SyncStatus::Synced,
            Err(e) => {
                warn!(%operation, error = %e, "Remote cart update failed, kept locally");
                self.notify(Notification::SyncedLocallyOnly {
                    operation,
                    reason: e.to_string(),
                });
                SyncStatus::LocalOnly
            }
        }
    }

    /// Read the guest cart, treating unreadable or corrupt data as empty.
    fn load_guest_cart(&self) -> Cart {
        let raw = match self.inner.local.get(keys::GUEST_CART) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Cart::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read guest cart, starting empty");
                return Cart::new();
            }
        };

        match Cart::from_untrusted_json(&raw) {
            Ok(SanitizedCart { cart, discarded }) => {
                if discarded > 0 {
                    warn!(discarded, "Dropped malformed guest cart entries");
                }
                cart
            }
            Err(e) => {
                warn!(error = %e, "Guest cart is corrupt, starting empty");
                Cart::new()
            }
        }
    }

    fn save_guest_cart(&self, cart: &Cart) {
        let result = serde_json::to_string(cart)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                self.inner
                    .local
                    .set(keys::GUEST_CART, &json)
                    .map_err(|e| e.to_string())
            });
        if let Err(error) = result {
            warn!(%error, "Failed to save guest cart");
        }
    }

    fn remove_guest_cart(&self) {
        if let Err(e) = self.inner.local.remove(keys::GUEST_CART) {
            warn!(error = %e, "Failed to remove guest cart");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::num::NonZeroU32;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use async_trait::async_trait;
    use larder_core::Price;
    use tokio::sync::Notify;

    use super::*;
    use crate::identity::{IdentityProvider, SessionIdentity};
    use crate::local::MemoryCache;
    use crate::store::InMemoryCartStore;

    // =========================================================================
    // Test Doubles
    // =========================================================================

    /// Store that fails every call while `offline` is set.
    #[derive(Default)]
    struct FlakyStore {
        carts: InMemoryCartStore,
        offline: AtomicBool,
    }

    impl FlakyStore {
        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), CartStoreError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(CartStoreError::Api {
                    status: 503,
                    message: "cart store offline".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteCartStore for FlakyStore {
        async fn fetch(&self, user_id: &UserId) -> Result<Cart, CartStoreError> {
            self.check()?;
            self.carts.fetch(user_id).await
        }

        async fn append(&self, user_id: &UserId, item: &CartItem) -> Result<(), CartStoreError> {
            self.check()?;
            self.carts.append(user_id, item).await
        }

        async fn remove(
            &self,
            user_id: &UserId,
            product_id: &ProductId,
        ) -> Result<(), CartStoreError> {
            self.check()?;
            self.carts.remove(user_id, product_id).await
        }

        async fn clear(&self, user_id: &UserId) -> Result<(), CartStoreError> {
            self.check()?;
            self.carts.clear(user_id).await
        }
    }

    /// Store whose fetch for one user, or whose first append, blocks until
    /// released.
    struct GatedStore {
        carts: InMemoryCartStore,
        gated_user: Option<UserId>,
        gate_append: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    impl GatedStore {
        fn gating_fetch_for(user_id: &str) -> Self {
            Self {
                carts: InMemoryCartStore::new(),
                gated_user: Some(UserId::new(user_id)),
                gate_append: AtomicBool::new(false),
                entered: Notify::new(),
                release: Notify::new(),
            }
        }

        fn gating_first_append() -> Self {
            Self {
                carts: InMemoryCartStore::new(),
                gated_user: None,
                gate_append: AtomicBool::new(true),
                entered: Notify::new(),
                release: Notify::new(),
            }
        }

        async fn wait_for_release(&self) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    #[async_trait]
    impl RemoteCartStore for GatedStore {
        async fn fetch(&self, user_id: &UserId) -> Result<Cart, CartStoreError> {
            if self.gated_user.as_ref() == Some(user_id) {
                self.wait_for_release().await;
            }
            self.carts.fetch(user_id).await
        }

        async fn append(&self, user_id: &UserId, item: &CartItem) -> Result<(), CartStoreError> {
            if self.gate_append.swap(false, Ordering::SeqCst) {
                self.wait_for_release().await;
            }
            self.carts.append(user_id, item).await
        }

        async fn remove(
            &self,
            user_id: &UserId,
            product_id: &ProductId,
        ) -> Result<(), CartStoreError> {
            self.carts.remove(user_id, product_id).await
        }

        async fn clear(&self, user_id: &UserId) -> Result<(), CartStoreError> {
            self.carts.clear(user_id).await
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn product(id: &str, cents: u32) -> ProductSnapshot {
        ProductSnapshot::new(
            ProductId::new(id),
            format!("Product {id}"),
            Price::from_cents(cents),
            format!("https://img.example.test/{id}.jpg"),
        )
    }

    fn user(id: &str) -> Identity {
        Identity::User(UserId::new(id))
    }

    fn qty(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    fn setup() -> (CartSynchronizer, Arc<FlakyStore>, Arc<MemoryCache>) {
        let store = Arc::new(FlakyStore::default());
        let cache = Arc::new(MemoryCache::new());
        let sync = CartSynchronizer::new(store.clone(), cache.clone());
        (sync, store, cache)
    }

    async fn guest_setup() -> (CartSynchronizer, Arc<FlakyStore>, Arc<MemoryCache>) {
        let (sync, store, cache) = setup();
        sync.hydrate(Identity::Guest).await;
        (sync, store, cache)
    }

    fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
        let mut received = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            received.push(notification);
        }
        received
    }

    // =========================================================================
    // Guest Mode
    // =========================================================================

    #[tokio::test]
    async fn test_new_cart_is_loading_until_hydrated() {
        let (sync, _, _) = setup();
        assert!(sync.is_loading());

        let outcome = sync.hydrate(Identity::Guest).await;
        assert_eq!(outcome, HydrationOutcome::Applied { total_items: 0 });
        assert_eq!(sync.status(), CartStatus::Ready);
        sync.wait_ready().await;
    }

    #[tokio::test]
    async fn test_add_same_product_twice_yields_one_line() {
        let (sync, _, _) = guest_setup().await;

        assert_eq!(sync.add_to_cart(&product("p1", 500)).await, SyncStatus::Local);
        sync.add_to_cart(&product("p1", 500)).await;

        let cart = sync.cart();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.items()[0].quantity, qty(2));
    }

    #[tokio::test]
    async fn test_guest_cart_survives_reload() {
        let (sync, store, cache) = guest_setup().await;
        sync.add_to_cart(&product("p1", 500)).await;
        sync.add_to_cart(&product("p2", 1250)).await;
        sync.add_to_cart(&product("p1", 500)).await;

        let reloaded = CartSynchronizer::new(store, cache);
        reloaded.hydrate(Identity::Guest).await;

        assert_eq!(reloaded.cart(), sync.cart());
        assert_eq!(reloaded.total_items(), 3);
    }

    #[tokio::test]
    async fn test_remove_is_total_and_persisted() {
        let (sync, _, cache) = guest_setup().await;
        for _ in 0..3 {
            sync.add_to_cart(&product("p1", 500)).await;
        }
        sync.add_to_cart(&product("p2", 100)).await;

        sync.remove_from_cart(&ProductId::new("p1")).await;

        assert!(sync.cart().get(&ProductId::new("p1")).is_none());
        let stored = cache.get(keys::GUEST_CART).unwrap().unwrap();
        let stored = Cart::from_untrusted_json(&stored).unwrap().cart;
        assert_eq!(stored, sync.cart());
    }

    #[tokio::test]
    async fn test_aggregates_track_every_mutation() {
        let (sync, _, _) = guest_setup().await;

        sync.add_to_cart(&product("p1", 250)).await;
        assert_eq!(sync.total_items(), 1);
        assert_eq!(sync.total_price(), Decimal::new(250, 2));

        sync.add_to_cart(&product("p1", 250)).await;
        sync.add_to_cart(&product("p2", 1000)).await;
        assert_eq!(sync.total_items(), 3);
        assert_eq!(sync.total_price(), Decimal::new(1500, 2));

        sync.remove_from_cart(&ProductId::new("p1")).await;
        assert_eq!(sync.total_items(), 1);
        assert_eq!(sync.total_price(), Decimal::new(1000, 2));

        sync.clear_cart().await;
        assert_eq!(sync.total_items(), 0);
        assert_eq!(sync.total_price(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_guest_mutations_never_touch_remote() {
        let (sync, store, _) = guest_setup().await;
        store.set_offline(true);

        assert_eq!(sync.add_to_cart(&product("p1", 100)).await, SyncStatus::Local);
        assert_eq!(
            sync.remove_from_cart(&ProductId::new("p1")).await,
            SyncStatus::Local
        );
        assert_eq!(sync.clear_cart().await, SyncStatus::Local);
    }

    #[tokio::test]
    async fn test_corrupt_cache_hydrates_empty() {
        let (sync, _, cache) = setup();
        cache.set(keys::GUEST_CART, "{not json").unwrap();

        let outcome = sync.hydrate(Identity::Guest).await;
        assert_eq!(outcome, HydrationOutcome::Applied { total_items: 0 });
        assert!(sync.cart().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_cache_entries_are_dropped() {
        let (sync, _, cache) = setup();
        cache
            .set(
                keys::GUEST_CART,
                r#"[
                    {"productId": "p1", "title": "Ok", "price": "1.50", "quantity": 2},
                    {"productId": "p2", "title": "Bad", "price": "-9.00", "quantity": 1},
                    {"productId": "p3", "title": "Bad", "price": "1.00", "quantity": 0}
                ]"#,
            )
            .unwrap();

        sync.hydrate(Identity::Guest).await;

        let cart = sync.cart();
        assert_eq!(cart.len(), 1);
        assert_eq!(sync.total_price(), Decimal::new(300, 2));
    }

    // =========================================================================
    // Signed-in Mode
    // =========================================================================

    #[tokio::test]
    async fn test_merge_on_login_moves_guest_cart_to_remote() {
        let (sync, store, cache) = guest_setup().await;
        sync.add_to_cart(&product("p1", 500)).await;

        let outcome = sync.hydrate(user("u1")).await;

        assert_eq!(outcome, HydrationOutcome::Applied { total_items: 1 });
        assert!(sync.cart().get(&ProductId::new("p1")).is_some());
        assert_eq!(cache.get(keys::GUEST_CART).unwrap(), None);
        let remote = store.fetch(&UserId::new("u1")).await.unwrap();
        assert_eq!(remote, sync.cart());
    }

    #[tokio::test]
    async fn test_merge_on_login_sums_quantities() {
        let (sync, store, _) = guest_setup().await;
        let u1 = UserId::new("u1");
        store
            .append(&u1, &CartItem::from_snapshot(&product("p1", 500)))
            .await
            .unwrap();

        sync.add_to_cart(&product("p1", 500)).await;
        sync.add_to_cart(&product("p1", 500)).await;
        sync.add_to_cart(&product("p2", 300)).await;
        sync.hydrate(user("u1")).await;

        let cart = sync.cart();
        assert_eq!(cart.get(&ProductId::new("p1")).unwrap().quantity, qty(3));
        assert_eq!(cart.get(&ProductId::new("p2")).unwrap().quantity, qty(1));
        assert_eq!(store.fetch(&u1).await.unwrap(), cart);
    }

    #[tokio::test]
    async fn test_login_without_guest_cart_loads_remote() {
        let (sync, store, _) = guest_setup().await;
        store
            .append(
                &UserId::new("u1"),
                &CartItem::from_snapshot(&product("p9", 900)),
            )
            .await
            .unwrap();

        sync.hydrate(user("u1")).await;
        assert_eq!(sync.total_items(), 1);
        assert_eq!(sync.identity(), user("u1"));
    }

    #[tokio::test]
    async fn test_logout_hydrates_empty_guest_cart() {
        let (sync, _, _) = guest_setup().await;
        sync.add_to_cart(&product("p1", 500)).await;
        sync.hydrate(user("u1")).await;

        sync.hydrate(Identity::Guest).await;
        assert!(sync.cart().is_empty());
        assert!(sync.identity().is_guest());
    }

    #[tokio::test]
    async fn test_signed_in_mutations_sync_remote() {
        let (sync, store, cache) = setup();
        sync.hydrate(user("u1")).await;
        let u1 = UserId::new("u1");

        assert_eq!(sync.add_to_cart(&product("p1", 500)).await, SyncStatus::Synced);
        sync.add_to_cart(&product("p1", 500)).await;
        sync.add_to_cart(&product("p2", 100)).await;
        assert_eq!(store.fetch(&u1).await.unwrap(), sync.cart());
        assert_eq!(cache.get(keys::GUEST_CART).unwrap(), None);

        assert_eq!(
            sync.remove_from_cart(&ProductId::new("p1")).await,
            SyncStatus::Synced
        );
        assert_eq!(store.fetch(&u1).await.unwrap(), sync.cart());

        assert_eq!(sync.clear_cart().await, SyncStatus::Synced);
        assert!(store.fetch(&u1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_add_failure_keeps_local_item() {
        let (sync, store, _) = setup();
        sync.hydrate(user("u1")).await;
        let mut rx = sync.subscribe();
        store.set_offline(true);

        let status = sync.add_to_cart(&product("p1", 500)).await;

        assert_eq!(status, SyncStatus::LocalOnly);
        assert_eq!(sync.total_items(), 1);
        let received = drain(&mut rx);
        assert!(received.iter().any(|n| matches!(
            n,
            Notification::SyncedLocallyOnly {
                operation: Operation::Add,
                ..
            }
        )));
        assert!(
            received
                .iter()
                .any(|n| matches!(n, Notification::ItemAdded { .. }))
        );
    }

    #[tokio::test]
    async fn test_clear_is_total_even_when_remote_fails() {
        let (sync, store, cache) = setup();
        sync.hydrate(user("u1")).await;
        sync.add_to_cart(&product("p1", 500)).await;
        cache.set(keys::GUEST_CART, "[]").unwrap();
        store.set_offline(true);

        let status = sync.clear_cart().await;

        assert_eq!(status, SyncStatus::LocalOnly);
        assert_eq!(sync.total_items(), 0);
        assert_eq!(sync.total_price(), Decimal::ZERO);
        assert_eq!(cache.get(keys::GUEST_CART).unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_guest_clear_and_add_keep_cache_in_step() {
        let (sync, _, cache) = guest_setup().await;

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let sync = sync.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        sync.add_to_cart(&product(&format!("p{i}"), 100)).await;
                    } else {
                        sync.clear_cart().await;
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let cached = cache
            .get(keys::GUEST_CART)
            .unwrap()
            .map(|raw| Cart::from_untrusted_json(&raw).unwrap().cart)
            .unwrap_or_default();
        assert_eq!(cached, sync.cart());
    }

    #[tokio::test]
    async fn test_remote_remove_failure_still_removes_locally() {
        let (sync, store, _) = setup();
        sync.hydrate(user("u1")).await;
        sync.add_to_cart(&product("p1", 500)).await;
        store.set_offline(true);

        let status = sync.remove_from_cart(&ProductId::new("p1")).await;
        assert_eq!(status, SyncStatus::LocalOnly);
        assert!(sync.cart().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_falls_back_to_empty_cart() {
        let (sync, store, _) = guest_setup().await;
        let mut rx = sync.subscribe();
        store.set_offline(true);

        let outcome = sync.hydrate(user("u1")).await;

        assert_eq!(outcome, HydrationOutcome::Applied { total_items: 0 });
        assert_eq!(sync.status(), CartStatus::Ready);
        assert!(
            drain(&mut rx)
                .iter()
                .any(|n| matches!(n, Notification::RemoteUnavailable { .. }))
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_guest_items_and_clears_slot() {
        let (sync, store, cache) = guest_setup().await;
        sync.add_to_cart(&product("p1", 500)).await;
        store.set_offline(true);

        sync.hydrate(user("u1")).await;

        assert_eq!(sync.total_items(), 1);
        assert_eq!(cache.get(keys::GUEST_CART).unwrap(), None);
    }

    // =========================================================================
    // Hydration Races
    // =========================================================================

    #[tokio::test]
    async fn test_stale_hydration_is_discarded() {
        let store = Arc::new(GatedStore::gating_fetch_for("slow"));
        store
            .carts
            .append(
                &UserId::new("slow"),
                &CartItem::from_snapshot(&product("slow-item", 100)),
            )
            .await
            .unwrap();
        store
            .carts
            .append(
                &UserId::new("fast"),
                &CartItem::from_snapshot(&product("fast-item", 100)),
            )
            .await
            .unwrap();
        let sync = CartSynchronizer::new(store.clone(), Arc::new(MemoryCache::new()));

        let slow = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.hydrate(user("slow")).await })
        };
        store.entered.notified().await;

        let fast = sync.hydrate(user("fast")).await;
        assert_eq!(fast, HydrationOutcome::Applied { total_items: 1 });

        store.release.notify_one();
        assert_eq!(slow.await.unwrap(), HydrationOutcome::Superseded);

        assert_eq!(sync.identity(), user("fast"));
        assert!(sync.cart().get(&ProductId::new("fast-item")).is_some());
        assert!(sync.cart().get(&ProductId::new("slow-item")).is_none());
        assert_eq!(sync.status(), CartStatus::Ready);
    }

    #[tokio::test]
    async fn test_stale_login_leaves_guest_cart_in_place() {
        let store = Arc::new(GatedStore::gating_fetch_for("slow"));
        let cache = Arc::new(MemoryCache::new());
        let sync = CartSynchronizer::new(store.clone(), cache.clone());
        sync.hydrate(Identity::Guest).await;
        sync.add_to_cart(&product("p1", 100)).await;

        let slow = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.hydrate(user("slow")).await })
        };
        store.entered.notified().await;
        sync.hydrate(Identity::Guest).await;
        store.release.notify_one();

        assert_eq!(slow.await.unwrap(), HydrationOutcome::Superseded);
        assert!(cache.get(keys::GUEST_CART).unwrap().is_some());
        assert!(store.carts.fetch(&UserId::new("slow")).await.unwrap().is_empty());
        assert_eq!(sync.total_items(), 1);
    }

    #[tokio::test]
    async fn test_sign_out_during_merge_keeps_guest_cart() {
        let store = Arc::new(GatedStore::gating_first_append());
        let cache = Arc::new(MemoryCache::new());
        let sync = CartSynchronizer::new(store.clone(), cache.clone());
        sync.hydrate(Identity::Guest).await;
        sync.add_to_cart(&product("p1", 100)).await;
        sync.add_to_cart(&product("p2", 200)).await;

        let login = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.hydrate(user("u1")).await })
        };
        store.entered.notified().await;
        let back_to_guest = sync.hydrate(Identity::Guest).await;
        store.release.notify_one();

        assert_eq!(back_to_guest, HydrationOutcome::Applied { total_items: 2 });
        assert_eq!(login.await.unwrap(), HydrationOutcome::Superseded);
        assert_eq!(sync.identity(), Identity::Guest);
        assert_eq!(sync.total_items(), 2);
        assert!(cache.get(keys::GUEST_CART).unwrap().is_some());
        // Replay stopped after the item that was already in flight.
        let remote = store.carts.fetch(&UserId::new("u1")).await.unwrap();
        assert_eq!(remote.len(), 1);
    }

    #[tokio::test]
    async fn test_watch_identity_hydrates_on_sign_in() {
        let (sync, store, _) = guest_setup().await;
        sync.add_to_cart(&product("p1", 500)).await;
        let session = SessionIdentity::default();
        let watcher = sync.watch_identity(session.subscribe());

        session.sign_in(UserId::new("u1"));

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if sync.identity() == user("u1") && !sync.is_loading() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(sync.total_items(), 1);
        assert_eq!(store.fetch(&UserId::new("u1")).await.unwrap().len(), 1);

        drop(session);
        tokio::time::timeout(Duration::from_secs(5), watcher)
            .await
            .unwrap()
            .unwrap();
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    #[tokio::test]
    async fn test_checkout_completion_empties_cart() {
        let (sync, _, cache) = guest_setup().await;
        sync.add_to_cart(&product("p1", 500)).await;
        let mut rx = sync.subscribe();

        let mut checkout = sync.begin_checkout().unwrap();
        checkout.advance().unwrap();
        checkout.advance().unwrap();
        let status = sync.complete_checkout(&mut checkout).await.unwrap();

        assert_eq!(status, SyncStatus::Local);
        assert!(checkout.is_complete());
        assert!(sync.cart().is_empty());
        assert_eq!(cache.get(keys::GUEST_CART).unwrap(), None);
        assert!(drain(&mut rx).contains(&Notification::CheckoutCompleted));
    }

    #[tokio::test]
    async fn test_checkout_must_reach_review() {
        let (sync, _, _) = guest_setup().await;
        sync.add_to_cart(&product("p1", 500)).await;

        let mut checkout = sync.begin_checkout().unwrap();
        let err = sync.complete_checkout(&mut checkout).await.unwrap_err();

        assert!(matches!(err, CheckoutError::InvalidTransition { .. }));
        assert_eq!(sync.total_items(), 1);
    }

    #[tokio::test]
    async fn test_checkout_rejects_empty_cart() {
        let (sync, _, _) = guest_setup().await;
        assert_eq!(sync.begin_checkout(), Err(CheckoutError::EmptyCart));
    }
}
