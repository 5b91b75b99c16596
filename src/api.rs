use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::ingest::config::PipelineConfig;
use crate::ingest::coordinator::{invoke, InvocationResponse, RunCoordinator};

#[derive(Clone)]
pub struct AppState {
    config: Arc<PipelineConfig>,
    /// Pre-wired coordinator; when absent each run builds one from `config`.
    coordinator: Option<RunCoordinator>,
    /// Held for the duration of a run so two triggers never overlap.
    running: Arc<Mutex<()>>,
}

impl AppState {
    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            config: Arc::new(config),
            coordinator: None,
            running: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_coordinator(config: PipelineConfig, coordinator: RunCoordinator) -> Self {
        Self {
            coordinator: Some(coordinator),
            ..Self::from_config(config)
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/run", post(trigger_run))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn trigger_run(State(state): State<AppState>) -> (StatusCode, Json<InvocationResponse>) {
    let Ok(_guard) = state.running.try_lock() else {
        return (
            StatusCode::CONFLICT,
            Json(InvocationResponse {
                status_code: StatusCode::CONFLICT.as_u16(),
                message: "A run is already in progress".to_string(),
            }),
        );
    };

    let resp = match &state.coordinator {
        Some(c) => InvocationResponse::from(&c.run(&state.config.categories).await),
        None => invoke(&state.config).await,
    };
    let status = StatusCode::from_u16(resp.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(resp))
}
