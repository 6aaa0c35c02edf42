use super::AppState;
use crate::application::monitor::MonitorSnapshot;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: i64,
    pub timestamp: DateTime<Utc>,
    pub last_sync: Option<DateTime<Utc>>,
    pub metrics: MonitorSnapshot,
}

/// GET /health. 503 once the failure ratio makes the service unhealthy.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let metrics = state.monitor.snapshot();
    let now = Utc::now();
    let (status_code, status) = if metrics.healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status_code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: (now - state.started_at).num_seconds(),
            timestamp: now,
            last_sync: metrics.last_sync,
            metrics,
        }),
    )
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<MonitorSnapshot> {
    Json(state.monitor.snapshot())
}

#[cfg(test)]
mod tests {
    use crate::api::build_router;
    use crate::api::test_support::{body_json, state, Scripted, ScriptedTrigger};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn health_is_ok_without_failures() {
        let app_state = state(ScriptedTrigger::new(Scripted::Complete), None, "logs".into());
        let response = build_router(app_state)
            .oneshot(get("/health"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["metrics"]["totalSyncs"], 0);
    }

    #[tokio::test]
    async fn health_reports_unavailable_when_failures_dominate() {
        let app_state = state(ScriptedTrigger::new(Scripted::Complete), None, "logs".into());
        app_state
            .monitor
            .record_run(false, Duration::from_millis(10), Utc::now(), None);

        let response = build_router(app_state.clone())
            .oneshot(get("/health"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response.into_body()).await["status"], "unhealthy");

        let stats = build_router(app_state)
            .oneshot(get("/stats"))
            .await
            .expect("response");
        assert_eq!(stats.status(), StatusCode::OK);
        assert_eq!(body_json(stats.into_body()).await["failedSyncs"], 1);
    }
}
