use axum::{extract::State, Json};
use serde::Serialize;

use crate::notification::{DispatcherState, DispatcherStatsSnapshot};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub dispatcher: DispatcherStatus,
    pub notifications: DispatcherStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct DispatcherStatus {
    pub state: DispatcherState,
    pub queued: usize,
    pub templates_loaded: usize,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let dispatcher = &state.dispatcher;

    Json(StatsResponse {
        dispatcher: DispatcherStatus {
            state: dispatcher.state(),
            queued: dispatcher.queue_len(),
            templates_loaded: dispatcher.templates().len(),
        },
        notifications: dispatcher.stats(),
    })
}
