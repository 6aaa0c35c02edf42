use crate::domain::models::{format_fingerprint, SyncWindow, Task};
use crate::infrastructure::config::NotionConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notion_mapper::{page_to_task, NotionPage};
use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

const NOTION_VERSION: &str = "2022-06-28";
const QUERY_PAGE_SIZE: u32 = 100;
const SYNCED_STATUSES: [&str; 3] = ["Not started", "In Progress", "Done"];
const LAST_SYNC_PROPERTY: &str = "Last Sync";

/// Source of truth for tasks.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn list_tasks(&self, window: &SyncWindow) -> Result<Vec<Task>, InfraError>;

    /// Stamps the task as synced. Callers treat failures as non-fatal.
    async fn mark_synced(&self, task_id: &str, event_id: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct NotionTaskSource {
    client: Client,
    token: String,
    database_id: String,
    api_base: String,
    time_zone: Tz,
}

#[derive(Debug, serde::Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<NotionPage>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

impl NotionTaskSource {
    pub fn new(config: &NotionConfig, time_zone: Tz) -> Self {
        Self {
            client: Client::new(),
            token: config.token.clone(),
            database_id: config.database_id.clone(),
            api_base: config.api_base.clone(),
            time_zone,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|error| InfraError::Notion(format!("invalid notion api base url: {error}")))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| InfraError::Notion("notion api base URL cannot be a base".to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn query_body(window: &SyncWindow, start_cursor: Option<&str>) -> serde_json::Value {
        let status_filters = SYNCED_STATUSES
            .iter()
            .map(|status| json!({ "property": "Status", "status": { "equals": status } }))
            .collect::<Vec<_>>();
        let mut body = json!({
            "page_size": QUERY_PAGE_SIZE,
            "filter": {
                "and": [
                    { "property": "Due Date", "date": { "on_or_after": window.start_date().to_string() } },
                    { "property": "Due Date", "date": { "on_or_before": window.end_date().to_string() } },
                    { "or": status_filters }
                ]
            }
        });
        if let Some(cursor) = start_cursor {
            body["start_cursor"] = json!(cursor);
        }
        body
    }

    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
        action: &str,
    ) -> Result<String, InfraError> {
        let response = request
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .map_err(|error| InfraError::Notion(format!("network error while {action}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Notion(format!("failed reading response while {action}: {error}")))?;

        if !status.is_success() {
            return Err(InfraError::Notion(format!(
                "notion api error while {action}: http {}; body={body}",
                status.as_u16()
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl TaskSource for NotionTaskSource {
    async fn list_tasks(&self, window: &SyncWindow) -> Result<Vec<Task>, InfraError> {
        let endpoint = self.endpoint(&["databases", self.database_id.as_str(), "query"])?;
        let mut cursor: Option<String> = None;
        let mut tasks = Vec::new();

        loop {
            let body = Self::query_body(window, cursor.as_deref());
            let raw = self
                .send_json(self.client.post(endpoint.clone()).json(&body), "querying tasks")
                .await?;
            let page: QueryResponse = serde_json::from_str(&raw).map_err(|error| {
                InfraError::Notion(format!("invalid query payload: {error}"))
            })?;

            for notion_page in &page.results {
                match page_to_task(notion_page, &self.time_zone) {
                    Ok(task) => tasks.push(task),
                    Err(error) => warn!(page_id = %notion_page.id, error = %error, "skipping notion page"),
                }
            }
            debug!(fetched = page.results.len(), has_more = page.has_more, "notion query page");

            match page.next_cursor {
                Some(next) if page.has_more && !next.trim().is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        info!(count = tasks.len(), "fetched tasks from notion");
        Ok(tasks)
    }

    async fn mark_synced(&self, task_id: &str, event_id: &str) -> Result<(), InfraError> {
        let endpoint = self.endpoint(&["pages", task_id])?;
        let body = json!({
            "properties": {
                LAST_SYNC_PROPERTY: { "date": { "start": format_fingerprint(Utc::now()) } }
            }
        });
        self.send_json(self.client.patch(endpoint).json(&body), "marking task synced")
            .await?;
        debug!(task_id, event_id, "marked task synced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> NotionTaskSource {
        NotionTaskSource::new(
            &NotionConfig {
                token: "secret_abc".to_string(),
                database_id: "db-1".to_string(),
                api_base: format!("{}/v1/", server.uri()),
            },
            "America/Lima".parse().expect("tz"),
        )
    }

    fn window() -> SyncWindow {
        let now = DateTime::parse_from_rfc3339("2025-01-02T12:00:00Z")
            .expect("datetime")
            .with_timezone(&Utc);
        SyncWindow::default_around(now)
    }

    fn page_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "url": format!("https://www.notion.so/{id}"),
            "last_edited_time": "2025-01-01T10:00:00.000Z",
            "properties": {
                "Title": { "type": "title", "title": [{ "plain_text": id }] }
            }
        })
    }

    #[tokio::test]
    async fn list_tasks_filters_window_and_follows_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .and(body_partial_json(serde_json::json!({ "start_cursor": "cursor-2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [page_json("page-2")],
                "has_more": false,
                "next_cursor": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .and(header("Notion-Version", NOTION_VERSION))
            .and(header("authorization", "Bearer secret_abc"))
            .and(body_string_contains(r#""on_or_after":"2025-01-01""#))
            .and(body_string_contains(r#""on_or_before":"2025-01-07""#))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [page_json("page-1"), { "id": "broken", "last_edited_time": "never" }],
                "has_more": true,
                "next_cursor": "cursor-2"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let tasks = source(&server).list_tasks(&window()).await.expect("tasks");
        let titles = tasks.iter().map(|task| task.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["page-1", "page-2"]);
    }

    #[tokio::test]
    async fn list_tasks_fails_on_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let error = source(&server).list_tasks(&window()).await.expect_err("must fail");
        assert!(matches!(error, InfraError::Notion(message) if message.contains("401")));
    }

    #[tokio::test]
    async fn mark_synced_patches_last_sync_property() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/pages/page-1"))
            .and(body_partial_json(serde_json::json!({
                "properties": { "Last Sync": {} }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "page-1" })))
            .expect(1)
            .mount(&server)
            .await;

        source(&server)
            .mark_synced("page-1", "evt-1")
            .await
            .expect("mark synced");
    }
}
