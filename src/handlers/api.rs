use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub agent_api_key_configured: bool,
    pub functions: Vec<String>,
    pub active_calls: usize,
    pub telephony_path: String,
}

/// Health check handler
///
/// Served at both `/` and `/health`.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        agent_api_key_configured: state.config.agent_api_key().is_some(),
        functions: state.dispatcher.names(),
        active_calls: state.active_calls(),
        telephony_path: state.config.telephony_path.clone(),
    })
}
