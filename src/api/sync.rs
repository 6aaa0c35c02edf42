use super::{json_error, AppState};
use crate::application::coordinator::Trigger;
use crate::application::sync_runner::TriggerOutcome;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, info};

/// POST /sync: one manual pass.
pub async fn manual_sync(State(state): State<AppState>) -> Response {
    info!("manual sync triggered");
    match state.runner.trigger(Trigger::Manual).await {
        Ok(TriggerOutcome::Completed(report)) => Json(json!({
            "success": true,
            "stats": report.stats,
            "report": report,
        }))
        .into_response(),
        Ok(TriggerOutcome::Rejected(rejection)) => {
            json_error(StatusCode::CONFLICT, rejection.to_string())
        }
        Err(sync_error) => {
            error!(error = %sync_error, "manual sync failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, sync_error.to_string())
        }
    }
}
