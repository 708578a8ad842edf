//! HTTP routes for the reference cart API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health       - Liveness check
//!
//! # Cart (bearer token when CART_API_TOKEN is set)
//! GET    /cart         - Fetch a user's cart (?userId=)
//! POST   /cart         - Append an item, merging by productId
//! DELETE /cart/item    - Remove a product line
//! DELETE /cart/clear   - Empty a user's cart
//! ```

pub mod cart;

use std::time::Duration;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get},
};
use tower::ServiceBuilder;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::{request_id_middleware, require_api_token};
use crate::state::AppState;

/// Cart routes, guarded by the bearer token check.
pub fn cart_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/cart", get(cart::show).post(cart::append))
        .route("/cart/item", delete(cart::remove))
        .route("/cart/clear", delete(cart::clear))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_api_token,
        ))
}

/// Build the full application router.
///
/// Sentry layers are added by the binary so tests can run without a client.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(cart_routes(&state))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &axum::http::Request<_>| {
                            tracing::info_span!(
                                "http_request",
                                method = %request.method(),
                                uri = %request.uri(),
                                request_id = tracing::field::Empty,
                                status = tracing::field::Empty,
                                latency_ms = tracing::field::Empty,
                            )
                        })
                        .on_response(
                            |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                                span.record("status", response.status().as_u16());
                                span.record(
                                    "latency_ms",
                                    u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                                );
                                DefaultOnResponse::default().on_response(response, latency, span);
                            },
                        ),
                )
                .layer(axum_middleware::from_fn(request_id_middleware)),
        )
        .with_state(state)
}

/// Liveness health check endpoint.
async fn health() -> &'static str {
    "ok"
}
