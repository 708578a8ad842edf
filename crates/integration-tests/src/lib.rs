//! Integration test harness for Larder.
//!
//! Spawns the reference cart API in process on an ephemeral loopback port,
//! so tests need no external services.
//!
//! ```bash
//! cargo test -p larder-integration-tests
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use larder_storefront::config::{CartApiConfig, CartSyncConfig};
use larder_storefront::state::AppState;
use larder_storefront::store::RetryPolicy;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;

/// A running cart API. Stopped on drop.
pub struct TestServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server with no token.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn spawn() -> Self {
        Self::spawn_with(CartApiConfig::local()).await
    }

    /// Start a server that requires `token`.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn spawn_with_token(token: &str) -> Self {
        let mut config = CartApiConfig::local();
        config.api_token = Some(SecretString::from(token));
        Self::spawn_with(config).await
    }

    /// Start a server with `config`.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn spawn_with(config: CartApiConfig) -> Self {
        let listener = TcpListener::bind(config.socket_addr())
            .await
            .expect("Failed to bind test listener");
        let addr = listener
            .local_addr()
            .expect("Failed to read test listener address");
        let app = larder_storefront::app(AppState::new(config));

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, handle }
    }

    /// Base URL of the server.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url())
    }

    /// Client configuration pointing at this server.
    #[must_use]
    pub fn sync_config(&self, cache_dir: &Path) -> CartSyncConfig {
        sync_config(&self.base_url(), cache_dir)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Client configuration for `base_url` with a short timeout and no retries.
///
/// # Panics
///
/// Panics if `base_url` is not a valid URL.
#[must_use]
pub fn sync_config(base_url: &str, cache_dir: &Path) -> CartSyncConfig {
    CartSyncConfig {
        api_url: Url::parse(base_url).expect("Invalid test URL"),
        api_token: None,
        timeout: Duration::from_secs(2),
        retry: RetryPolicy::none(),
        cache_dir: cache_dir.to_path_buf(),
    }
}

/// A loopback URL with nothing listening on it.
///
/// # Panics
///
/// Panics if a scratch listener cannot be bound.
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind scratch listener");
    let addr = listener
        .local_addr()
        .expect("Failed to read scratch listener address");
    drop(listener);
    format!("http://{addr}")
}

/// A user id no other test uses.
#[must_use]
pub fn unique_user() -> String {
    format!("user-{}", Uuid::new_v4())
}
