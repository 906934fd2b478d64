use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::telephony::{telephony_handler, test_socket_handler};
use crate::state::AppState;
use std::sync::Arc;

/// Path of the WebSocket smoke-test endpoint
pub const TEST_SOCKET_PATH: &str = "/test";

/// Create the telephony media-stream router
///
/// # Arguments
/// * `path` - Route for the telephony WebSocket, e.g. `/twilio`
pub fn create_telephony_router(path: &str) -> Router<Arc<AppState>> {
    Router::new()
        .route(path, get(telephony_handler))
        .layer(TraceLayer::new_for_http())
}

/// Create the router for the `/test` socket
pub fn create_test_socket_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(TEST_SOCKET_PATH, get(test_socket_handler))
        .layer(TraceLayer::new_for_http())
}
