use super::{json_error, AppState};
use crate::application::coordinator::{PassRejection, Trigger};
use crate::application::sync_runner::TriggerOutcome;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tracing::{error, info, warn};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "notion-webhook-signature";
pub const TIMESTAMP_HEADER: &str = "notion-webhook-timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    MissingSecret,
    MissingHeaders,
    Invalid,
}

impl SignatureError {
    fn message(&self) -> &'static str {
        match self {
            SignatureError::MissingSecret => "Webhook secret not configured",
            SignatureError::MissingHeaders => "Missing signature or timestamp",
            SignatureError::Invalid => "Invalid signature",
        }
    }
}

/// Checks the hex HMAC-SHA256 of `timestamp || body` in constant time.
pub fn verify_signature(
    secret: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), SignatureError> {
    let secret = secret.ok_or(SignatureError::MissingSecret)?;
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };
    let (Some(signature), Some(timestamp)) = (header(SIGNATURE_HEADER), header(TIMESTAMP_HEADER))
    else {
        return Err(SignatureError::MissingHeaders);
    };

    let provided = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Invalid)?;
    mac.update(timestamp.as_bytes());
    mac.update(body);
    mac.verify_slice(&provided).map_err(|_| SignatureError::Invalid)
}

/// POST /webhook/notion
pub async fn notion_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    info!(bytes = body.len(), "webhook received from notion");
    if let Err(rejection) = verify_signature(state.webhook_secret.as_deref(), &headers, &body) {
        warn!(reason = rejection.message(), "webhook verification failed");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": rejection.message() })),
        )
            .into_response();
    }

    match state.runner.trigger(Trigger::Webhook).await {
        Ok(TriggerOutcome::Completed(report)) => Json(json!({
            "success": true,
            "message": "Sync completed successfully",
            "stats": report.stats,
            "timestamp": Utc::now(),
        }))
        .into_response(),
        Ok(TriggerOutcome::Rejected(PassRejection::Cooldown { .. })) => {
            info!("sync cooldown active, skipping webhook pass");
            Json(json!({ "message": "Sync cooldown active" })).into_response()
        }
        Ok(TriggerOutcome::Rejected(rejection)) => {
            json_error(StatusCode::CONFLICT, rejection.to_string())
        }
        Err(sync_error) => {
            error!(error = %sync_error, "webhook sync failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, sync_error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_router;
    use crate::api::test_support::{body_json, state, Scripted, ScriptedTrigger};
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::util::ServiceExt;

    const SECRET: &str = "whsec_test";
    const BODY: &str = r#"{"type":"page.updated","entity":{"id":"page-1"}}"#;

    fn sign_payload(secret: &str, timestamp: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
        mac.update(timestamp.as_bytes());
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_request(signature: Option<&str>, timestamp: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/webhook/notion");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        if let Some(timestamp) = timestamp {
            builder = builder.header(TIMESTAMP_HEADER, timestamp);
        }
        builder.body(Body::from(BODY)).expect("request")
    }

    fn valid_request() -> Request<Body> {
        let signature = sign_payload(SECRET, "1735725600", BODY.as_bytes());
        signed_request(Some(&signature), Some("1735725600"))
    }

    #[test]
    fn signature_covers_timestamp_and_body() {
        let mut headers = HeaderMap::new();
        let signature = sign_payload(SECRET, "100", b"payload");
        headers.insert(SIGNATURE_HEADER, signature.parse().expect("header"));
        headers.insert(TIMESTAMP_HEADER, "100".parse().expect("header"));

        assert_eq!(verify_signature(Some(SECRET), &headers, b"payload"), Ok(()));
        assert_eq!(
            verify_signature(Some(SECRET), &headers, b"tampered"),
            Err(SignatureError::Invalid)
        );
        assert_eq!(
            verify_signature(Some("other"), &headers, b"payload"),
            Err(SignatureError::Invalid)
        );
        assert_eq!(
            verify_signature(None, &headers, b"payload"),
            Err(SignatureError::MissingSecret)
        );

        headers.insert(TIMESTAMP_HEADER, "101".parse().expect("header"));
        assert_eq!(
            verify_signature(Some(SECRET), &headers, b"payload"),
            Err(SignatureError::Invalid)
        );
    }

    #[tokio::test]
    async fn valid_webhook_runs_a_webhook_pass() {
        let trigger = ScriptedTrigger::new(Scripted::Complete);
        let response = build_router(state(trigger.clone(), Some(SECRET), "logs".into()))
            .oneshot(valid_request())
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["message"], "Sync completed successfully");
        assert_eq!(body["stats"]["created"], 1);
        assert_eq!(trigger.calls(), vec![Trigger::Webhook]);
    }

    #[tokio::test]
    async fn unsigned_or_forged_webhooks_are_unauthorized() {
        let trigger = ScriptedTrigger::new(Scripted::Complete);
        let app = build_router(state(trigger.clone(), Some(SECRET), "logs".into()));

        let missing = app
            .clone()
            .oneshot(signed_request(None, Some("1735725600")))
            .await
            .expect("response");
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(missing.into_body()).await["error"],
            "Missing signature or timestamp"
        );

        let forged = app
            .oneshot(signed_request(Some("deadbeef"), Some("1735725600")))
            .await
            .expect("response");
        assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
        assert!(trigger.calls().is_empty());
    }

    #[tokio::test]
    async fn webhook_without_configured_secret_is_unauthorized() {
        let trigger = ScriptedTrigger::new(Scripted::Complete);
        let response = build_router(state(trigger.clone(), None, "logs".into()))
            .oneshot(valid_request())
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(trigger.calls().is_empty());
    }

    #[tokio::test]
    async fn cooldown_is_acknowledged_and_in_flight_conflicts() {
        let cooling = ScriptedTrigger::new(Scripted::Reject(PassRejection::Cooldown {
            remaining: Duration::from_secs(12),
        }));
        let response = build_router(state(cooling, Some(SECRET), "logs".into()))
            .oneshot(valid_request())
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response.into_body()).await["message"],
            "Sync cooldown active"
        );

        let busy = ScriptedTrigger::new(Scripted::Reject(PassRejection::InFlight));
        let response = build_router(state(busy, Some(SECRET), "logs".into()))
            .oneshot(valid_request())
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
