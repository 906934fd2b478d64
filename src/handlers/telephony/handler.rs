use axum::{
    Extension,
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::telephony::{TelephonyOutbound, TelephonySender};
use crate::core::transport::split_server_socket;
use crate::errors::app_error::AppError;
use crate::state::{AppState, CallSlot};

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

const UPGRADE_HINT: &str = "WebSocket upgrade expected. Connect with a WebSocket client.";

const TEST_SOCKET_MESSAGE: &str = "Test WebSocket connection successful";

/// Telephony media-stream handler
///
/// Upgrades the connection and runs one call session over it. Plain HTTP
/// requests get `426 Upgrade Required`.
///
/// # Arguments
/// * `ws` - The WebSocket upgrade request, or why it is not one
/// * `state` - Application state
/// * `slot` - Call slot reserved by the call-limit middleware, when present
pub async fn telephony_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<AppState>>,
    slot: Option<Extension<CallSlot>>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(reason = %rejection, "Rejecting non-WebSocket request on telephony path");
            return AppError::UpgradeRequired(UPGRADE_HINT.to_string()).into_response();
        }
    };

    info!(
        active_calls = state.active_calls(),
        "Telephony WebSocket connection upgrade requested"
    );

    let slot = slot.map(|Extension(slot)| slot);
    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_telephony_socket(socket, state, slot))
}

/// Run a call session over an upgraded telephony socket
async fn handle_telephony_socket(socket: WebSocket, state: Arc<AppState>, slot: Option<CallSlot>) {
    let session = state.new_session();
    info!(call_id = %session.call_id(), "Telephony WebSocket connection established");

    let (sink, source) = split_server_socket(socket);
    let call_id = session.call_id().to_string();

    match session.run(sink, source).await {
        Ok(report) => info!(
            call_id = %call_id,
            stream_sid = ?report.stream_sid,
            chunks_sent = report.chunks_sent,
            media_frames = report.media_frames,
            clears = report.clears,
            function_calls = report.function_calls,
            "Telephony connection closed"
        ),
        Err(e) => warn!(
            call_id = %call_id,
            code = e.code(),
            error = %e,
            "Telephony connection closed with error"
        ),
    }

    // Release the call slot only once the session is fully torn down
    drop(slot);
}

/// WebSocket smoke-test endpoint
///
/// Sends a single `connected` frame and closes.
pub async fn test_socket_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match ws {
        Ok(ws) => ws.on_upgrade(handle_test_socket),
        Err(_) => AppError::UpgradeRequired(UPGRADE_HINT.to_string()).into_response(),
    }
}

async fn handle_test_socket(socket: WebSocket) {
    let (sink, _source) = split_server_socket(socket);
    let sender = TelephonySender::new(sink);

    let frame = TelephonyOutbound::Connected {
        message: TEST_SOCKET_MESSAGE.to_string(),
    };
    if let Err(e) = sender.send(&frame).await {
        warn!(error = %e, "Failed to send test socket greeting");
        return;
    }
    if let Err(e) = sender.close().await {
        debug!(error = %e, "Test socket close failed");
    }
}
