//! Cart route handlers.
//!
//! Carts are keyed by the `userId` carried in each request. The bearer token
//! authenticates the caller, not the user.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use tracing::instrument;

use crate::error::{Result, set_sentry_user};
use crate::state::AppState;
use crate::store::{
    AppendItemRequest, CartQuery, CartResponse, ClearCartRequest, RemoteCartStore,
    RemoveItemRequest,
};

/// `GET /cart?userId=U`
#[instrument(skip(state), fields(user_id = %query.user_id))]
pub async fn show(
    State(state): State<AppState>,
    Query(query): Query<CartQuery>,
) -> Result<Json<CartResponse>> {
    set_sentry_user(&query.user_id);
    let items = state.carts().fetch(&query.user_id).await?;
    Ok(Json(CartResponse { items }))
}

/// `POST /cart`
///
/// Adds the item's quantity to any existing line for the same product and
/// returns the updated cart.
#[instrument(
    skip(state, request),
    fields(user_id = %request.user_id, product_id = %request.product.product_id)
)]
pub async fn append(
    State(state): State<AppState>,
    Json(request): Json<AppendItemRequest>,
) -> Result<Json<CartResponse>> {
    set_sentry_user(&request.user_id);
    let carts = state.carts();
    carts.append(&request.user_id, &request.product).await?;
    let items = carts.fetch(&request.user_id).await?;
    tracing::debug!(lines = items.len(), "Item appended");
    Ok(Json(CartResponse { items }))
}

/// `DELETE /cart/item`
#[instrument(
    skip(state, request),
    fields(user_id = %request.user_id, product_id = %request.product_id)
)]
pub async fn remove(
    State(state): State<AppState>,
    Json(request): Json<RemoveItemRequest>,
) -> Result<StatusCode> {
    set_sentry_user(&request.user_id);
    state
        .carts()
        .remove(&request.user_id, &request.product_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /cart/clear`
#[instrument(skip(state, request), fields(user_id = %request.user_id))]
pub async fn clear(
    State(state): State<AppState>,
    Json(request): Json<ClearCartRequest>,
) -> Result<StatusCode> {
    set_sentry_user(&request.user_id);
    state.carts().clear(&request.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
