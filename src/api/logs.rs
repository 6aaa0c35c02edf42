use super::{json_error, AppState};
use crate::infrastructure::logging::{log_path, tail_log, LogKind};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

const DEFAULT_LINES: usize = 50;

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    lines: Option<usize>,
}

/// GET /logs?type=app|error&lines=N. Unknown types read the app log.
pub async fn read_logs(State(state): State<AppState>, Query(query): Query<LogQuery>) -> Response {
    let kind = query
        .kind
        .as_deref()
        .and_then(LogKind::parse)
        .unwrap_or(LogKind::App);
    let lines = query.lines.unwrap_or(DEFAULT_LINES);
    let path = log_path(&state.logs_dir, kind);

    let tail = match tokio::task::spawn_blocking(move || tail_log(&path, lines)).await {
        Ok(result) => result,
        Err(join_error) => {
            error!(error = %join_error, "log reader task failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Error reading logs");
        }
    };

    match tail {
        Ok(Some(tail)) => Json(json!({
            "logType": kind.file_name().trim_end_matches(".log"),
            "totalLines": tail.total_lines,
            "displayedLines": tail.lines.len(),
            "logs": tail.lines,
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Log file not found" })),
        )
            .into_response(),
        Err(read_error) => {
            error!(error = %read_error, "error reading logs");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Error reading logs")
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::api::build_router;
    use crate::api::test_support::{body_json, state, Scripted, ScriptedTrigger};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::fs;
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn returns_requested_tail_of_error_log() {
        let temp = TempDir::new().expect("temp dir");
        fs::write(temp.path().join("error.log"), "{\"n\":1}\n{\"n\":2}\n{\"n\":3}\n")
            .expect("write log");
        let app = build_router(state(
            ScriptedTrigger::new(Scripted::Complete),
            None,
            temp.path().to_path_buf(),
        ));

        let response = app
            .oneshot(get("/logs?type=error&lines=2"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["logType"], "error");
        assert_eq!(body["totalLines"], 3);
        assert_eq!(body["displayedLines"], 2);
        assert_eq!(body["logs"][1], "{\"n\":3}");
    }

    #[tokio::test]
    async fn missing_log_file_is_not_found() {
        let temp = TempDir::new().expect("temp dir");
        let app = build_router(state(
            ScriptedTrigger::new(Scripted::Complete),
            None,
            temp.path().to_path_buf(),
        ));

        let response = app.oneshot(get("/logs")).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
