//! Concurrent call limit for the telephony WebSocket
//!
//! Reserves a [`CallSlot`] for every upgrade request and hands it to the
//! handler through the request extensions. Requests over the limit get
//! `503 Service Unavailable` before the upgrade happens.
//!
//! ```ignore
//! let telephony = routes::telephony::create_telephony_router(&path)
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         call_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::errors::app_error::AppError;
use crate::state::{AppState, CallSlot};

/// Middleware that enforces `max_concurrent_calls`
///
/// Only WebSocket upgrade requests take a slot. Plain HTTP requests pass
/// through so the handler can answer them with `426`.
pub async fn call_limit_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !is_websocket_upgrade(&request) {
        return next.run(request).await;
    }

    match state.try_acquire_call() {
        Ok(slot) => {
            request.extensions_mut().insert::<CallSlot>(slot);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(
                active_calls = state.active_calls(),
                "Rejecting telephony connection: {}",
                e
            );
            AppError::ServiceUnavailable("Server at capacity. Please try again later.".to_string())
                .into_response()
        }
    }
}

fn is_websocket_upgrade(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}
