//! Bearer token check for the cart routes.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use secrecy::ExposeSecret;

use crate::error::AppError;
use crate::state::AppState;

/// Reject requests without the configured bearer token.
///
/// Passes everything through when no token is configured.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` if the `Authorization` header is missing
/// or does not carry the expected token.
pub async fn require_api_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = &state.config().api_token else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match presented {
        Some(token) if constant_time_eq(token.as_bytes(), expected.expose_secret().as_bytes()) => {}
        Some(_) => {
            tracing::warn!("Rejected request with wrong API token");
            return Err(AppError::Unauthorized("invalid API token".to_string()));
        }
        None => return Err(AppError::Unauthorized("missing API token".to_string())),
    }

    Ok(next.run(request).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
