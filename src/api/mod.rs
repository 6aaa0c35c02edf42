//! HTTP trigger surface: health, statistics, manual and webhook-driven
//! passes, and log inspection.

pub mod health;
pub mod logs;
pub mod sync;
pub mod webhook;

use crate::application::monitor::RunMonitor;
use crate::application::sync_runner::SyncTrigger;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<dyn SyncTrigger>,
    pub monitor: Arc<RunMonitor>,
    pub webhook_secret: Option<String>,
    pub logs_dir: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        runner: Arc<dyn SyncTrigger>,
        monitor: Arc<RunMonitor>,
        webhook_secret: Option<String>,
        logs_dir: PathBuf,
    ) -> Self {
        Self {
            runner,
            monitor,
            webhook_secret,
            logs_dir,
            started_at: Utc::now(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/stats", get(health::stats))
        .route("/sync", post(sync::manual_sync))
        .route("/webhook/notion", post(webhook::notion_webhook))
        .route("/logs", get(logs::read_logs))
        .with_state(state)
}

pub(crate) fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": message.into(),
            "timestamp": Utc::now(),
        })),
    )
        .into_response()
}
