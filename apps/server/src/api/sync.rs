//! Sync control endpoints: manual drain, engine status and connectivity.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use fieldsync_core::sync::{
    DeadLetter, NetworkState, SyncConfig, SyncEngineStatus, SyncRunOutcome, SyncTrigger,
};

use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncStatusResponse {
    #[serde(flatten)]
    engine: SyncEngineStatus,
    periodic_running: bool,
    config: SyncConfig,
}

#[derive(Debug, Deserialize)]
struct DeadLetterQuery {
    limit: Option<i64>,
}

async fn trigger_sync(State(state): State<Arc<AppState>>) -> Json<SyncRunOutcome> {
    Json(state.sync_service().sync_on_demand(SyncTrigger::Manual).await)
}

async fn sync_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<SyncStatusResponse>> {
    let sync_service = state.sync_service();
    let engine = sync_service.status()?;
    let periodic_running = state
        .periodic_sync
        .lock()
        .await
        .as_ref()
        .is_some_and(|handle| handle.is_running());

    Ok(Json(SyncStatusResponse {
        engine,
        periodic_running,
        config: sync_service.config().clone(),
    }))
}

async fn dead_letters(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeadLetterQuery>,
) -> ApiResult<Json<Vec<DeadLetter>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    Ok(Json(state.queue.list_dead_letters(limit)?))
}

/// Connectivity pushed by the shell. Rejected when reachability is probed.
async fn update_network(
    State(state): State<Arc<AppState>>,
    Json(network): Json<NetworkState>,
) -> ApiResult<StatusCode> {
    let monitor = state.pushed_network.as_ref().ok_or_else(|| {
        ApiError::Conflict("Network state is probed, not pushed".to_string())
    })?;

    let came_online = !monitor.current().internet_reachable && network.internet_reachable;
    monitor.set_state(network);
    if came_online {
        info!("Network reachable again ({:?})", network.network_type);
        state.notify_local_mutation();
    }
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync", post(trigger_sync))
        .route("/sync/status", get(sync_status))
        .route("/sync/dead-letters", get(dead_letters))
        .route("/network", post(update_network))
}
