//! HTTP middleware for the reference cart API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (added by the binary)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (recorded on the span, echoed on the response)
//! 4. Bearer token check (cart routes only)

pub mod auth;
pub mod request_id;

pub use auth::require_api_token;
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
