//! HTTP API consumed by the field app shell.

mod consumers;
mod sync;

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiResult;
use crate::main_lib::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    schema_version: i32,
    pending_entries: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> ApiResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok",
        schema_version: state.store.schema_version()?,
        pending_entries: state.sync_service.pending_count()?,
    }))
}

pub fn app_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .merge(consumers::router())
        .merge(sync::router());

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use fieldsync_core::sync::SyncConfig;
    use tokio::net::TcpListener;

    use crate::config::Config;
    use crate::main_lib::{build_state, AppState};

    pub struct TestServer {
        pub base_url: String,
        pub state: Arc<AppState>,
        _dir: tempfile::TempDir,
        task: tokio::task::JoinHandle<()>,
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.task.abort();
        }
    }

    /// Serves the router on an ephemeral port. The remote points at a closed
    /// port and the network starts offline, so nothing leaves the process.
    pub async fn start() -> TestServer {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            data_dir: dir.path().to_string_lossy().to_string(),
            api_url: "http://127.0.0.1:9".to_string(),
            api_token: None,
            probe_url: None,
            sync: SyncConfig {
                auto_sync: false,
                cooldown_secs: 0,
                request_timeout_secs: 1,
                ..SyncConfig::default()
            },
        };
        let state = build_state(&config).expect("build state");
        if let Some(network) = &state.pushed_network {
            network.set_state(fieldsync_core::sync::NetworkState::offline());
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = super::app_router(Arc::clone(&state));
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        TestServer {
            base_url: format!("http://{}/api/v1", addr),
            state,
            _dir: dir,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support;

    #[tokio::test]
    async fn health_reports_schema_version() {
        let server = test_support::start().await;
        let body: serde_json::Value = reqwest::get(format!("{}/health", server.base_url))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert!(body["schemaVersion"].as_i64().unwrap() >= 1);
        assert_eq!(body["pendingEntries"], 0);
    }
}
