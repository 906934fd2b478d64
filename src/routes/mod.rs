pub mod api;
pub mod telephony;

use axum::{Router, middleware};
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::middleware::call_limit_middleware;
use crate::state::AppState;

/// Assemble the full application router
///
/// The telephony route sits behind the call-limit middleware. Health and
/// `/test` are public.
pub fn create_app(state: Arc<AppState>) -> Router {
    let telephony_routes = telephony::create_telephony_router(&state.config.telephony_path)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            call_limit_middleware,
        ));

    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ));

    api::create_api_router()
        .merge(telephony::create_test_socket_router())
        .merge(telephony_routes)
        .with_state(state)
        .layer(security_headers)
}
