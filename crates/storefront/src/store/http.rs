//! HTTP client for the remote cart store.

use async_trait::async_trait;
use larder_core::{Cart, CartItem, ProductId, UserId};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::instrument;
use url::Url;

use super::{
    AppendItemRequest, CartResponse, CartStoreError, ClearCartRequest, RemoteCartStore,
    RemoveItemRequest, RetryPolicy,
};
use crate::config::CartSyncConfig;

/// Remote cart store reached over HTTP.
#[derive(Clone)]
pub struct HttpCartStore {
    client: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl HttpCartStore {
    /// Create a new cart store client.
    ///
    /// # Errors
    ///
    /// Returns error if the token is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &CartSyncConfig) -> Result<Self, CartStoreError> {
        let mut headers = HeaderMap::new();

        if let Some(token) = &config.api_token {
            let auth_value = format!("Bearer {}", token.expose_secret());
            let mut value = HeaderValue::from_str(&auth_value)
                .map_err(|e| CartStoreError::Parse(format!("Invalid API token format: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: with_trailing_slash(config.api_url.clone()),
            retry: config.retry,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CartStoreError> {
        Ok(self.base_url.join(path)?)
    }

    /// Turn a non-success status into `CartStoreError::Api`.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, CartStoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(CartStoreError::Api {
            status: status.as_u16(),
            message: message.chars().take(200).collect(),
        })
    }

    /// Send a JSON body with `method` to `path`, retrying errors that match
    /// `retryable` per policy.
    async fn send_json<B: Serialize + Sync>(
        &self,
        operation: &str,
        method: reqwest::Method,
        path: &str,
        body: &B,
        retryable: fn(&CartStoreError) -> bool,
    ) -> Result<(), CartStoreError> {
        let url = self.endpoint(path)?;
        self.retry
            .run_if(operation, retryable, || async {
                let response = self
                    .client
                    .request(method.clone(), url.clone())
                    .json(body)
                    .send()
                    .await?;
                Self::check(response).await.map(drop)
            })
            .await
    }
}

#[async_trait]
impl RemoteCartStore for HttpCartStore {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn fetch(&self, user_id: &UserId) -> Result<Cart, CartStoreError> {
        let mut url = self.endpoint("cart")?;
        url.query_pairs_mut().append_pair("userId", user_id.as_str());

        let response: CartResponse = self
            .retry
            .run("fetch", || async {
                let response = self.client.get(url.clone()).send().await?;
                let response = Self::check(response).await?;
                response
                    .json::<CartResponse>()
                    .await
                    .map_err(|e| CartStoreError::Parse(e.to_string()))
            })
            .await?;

        Ok(response.items)
    }

    #[instrument(skip(self, item), fields(user_id = %user_id, product_id = %item.product_id))]
    async fn append(&self, user_id: &UserId, item: &CartItem) -> Result<(), CartStoreError> {
        let body = AppendItemRequest {
            user_id: user_id.clone(),
            product: item.clone(),
        };
        // Appends sum quantities, so only resend what the store never saw.
        self.send_json(
            "append",
            reqwest::Method::POST,
            "cart",
            &body,
            CartStoreError::is_safe_to_resend,
        )
        .await
    }

    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    async fn remove(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
    ) -> Result<(), CartStoreError> {
        let body = RemoveItemRequest {
            user_id: user_id.clone(),
            product_id: product_id.clone(),
        };
        self.send_json(
            "remove",
            reqwest::Method::DELETE,
            "cart/item",
            &body,
            CartStoreError::is_transient,
        )
        .await
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn clear(&self, user_id: &UserId) -> Result<(), CartStoreError> {
        let body = ClearCartRequest {
            user_id: user_id.clone(),
        };
        self.send_json(
            "clear",
            reqwest::Method::DELETE,
            "cart/clear",
            &body,
            CartStoreError::is_transient,
        )
        .await
    }
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::{delete, post};
    use larder_core::{Price, ProductSnapshot};
    use secrecy::SecretString;

    use super::*;

    fn config(api_url: &str) -> CartSyncConfig {
        CartSyncConfig {
            api_url: Url::parse(api_url).unwrap(),
            api_token: None,
            timeout: Duration::from_secs(1),
            retry: RetryPolicy::none(),
            cache_dir: PathBuf::from(".larder"),
        }
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let store = HttpCartStore::new(&config("http://localhost:3100/api")).unwrap();
        assert_eq!(
            store.endpoint("cart/item").unwrap().as_str(),
            "http://localhost:3100/api/cart/item"
        );
    }

    #[test]
    fn test_endpoint_at_root() {
        let store = HttpCartStore::new(&config("http://localhost:3100")).unwrap();
        assert_eq!(
            store.endpoint("cart").unwrap().as_str(),
            "http://localhost:3100/cart"
        );
    }

    #[test]
    fn test_rejects_token_with_newline() {
        let mut config = config("http://localhost:3100");
        config.api_token = Some(SecretString::from("bad\ntoken"));
        assert!(matches!(
            HttpCartStore::new(&config),
            Err(CartStoreError::Parse(_))
        ));
    }

    /// Serve `router` on an ephemeral port and return a retrying store for it.
    async fn serve(router: Router) -> HttpCartStore {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let mut config = config(&format!("http://{addr}"));
        config.retry =
            RetryPolicy::exponential(3, Duration::from_millis(1), Duration::from_millis(5));
        HttpCartStore::new(&config).unwrap()
    }

    /// Counts requests and answers each with 503.
    fn unavailable_route(
        hits: Arc<AtomicU32>,
    ) -> impl Fn() -> std::future::Ready<StatusCode> + Clone {
        move || {
            hits.fetch_add(1, Ordering::SeqCst);
            std::future::ready(StatusCode::SERVICE_UNAVAILABLE)
        }
    }

    #[tokio::test]
    async fn test_append_is_sent_once_when_server_errors() {
        let hits = Arc::new(AtomicU32::new(0));
        let router = Router::new().route("/cart", post(unavailable_route(hits.clone())));
        let store = serve(router).await;
        let item = CartItem::from_snapshot(&ProductSnapshot::new(
            ProductId::new("p1"),
            "Product",
            Price::from_cents(100),
            "https://img.example.test/p1.jpg",
        ));

        let result = store.append(&UserId::new("u1"), &item).await;

        assert!(matches!(
            result,
            Err(CartStoreError::Api { status: 503, .. })
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_is_retried_when_server_errors() {
        let hits = Arc::new(AtomicU32::new(0));
        let router = Router::new().route("/cart/clear", delete(unavailable_route(hits.clone())));
        let store = serve(router).await;

        let result = store.clear(&UserId::new("u1")).await;

        assert!(result.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
