use crate::domain::models::{DueDate, Priority, Task, TaskStatus};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

const PROP_TITLE: &str = "Title";
const PROP_DESCRIPTION: &str = "Description";
const PROP_TAGS: &str = "Tags";
const PROP_PRIORITY: &str = "Priority";
const PROP_STATUS: &str = "Status";
const PROP_START_TIME: &str = "Start Time";
const PROP_END_TIME: &str = "End Time";
const PROP_DUE_DATE: &str = "Due Date";
const PROP_TIME: &str = "Time";

#[derive(Debug, Clone, Deserialize)]
pub struct NotionPage {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub last_edited_time: String,
    #[serde(default)]
    pub properties: HashMap<String, NotionProperty>,
}

/// One page property. Only the field matching the property's type is
/// populated by the API; the rest stay empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotionProperty {
    #[serde(default)]
    pub title: Option<Vec<NotionRichText>>,
    #[serde(default)]
    pub rich_text: Option<Vec<NotionRichText>>,
    #[serde(default)]
    pub multi_select: Option<Vec<NotionOption>>,
    #[serde(default)]
    pub select: Option<NotionOption>,
    #[serde(default)]
    pub status: Option<NotionOption>,
    #[serde(default)]
    pub date: Option<NotionDate>,
    #[serde(default)]
    pub number: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotionRichText {
    #[serde(default)]
    pub plain_text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotionOption {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotionDate {
    pub start: Option<String>,
}

pub fn page_to_task(page: &NotionPage, time_zone: &Tz) -> Result<Task, InfraError> {
    let id = page.id.trim();
    if id.is_empty() {
        return Err(InfraError::Notion("page without id".to_string()));
    }
    let last_edited_time = DateTime::parse_from_rfc3339(page.last_edited_time.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            InfraError::Notion(format!(
                "page {id} has invalid last_edited_time '{}': {error}",
                page.last_edited_time
            ))
        })?;

    let property = |name: &str| page.properties.get(name);

    Ok(Task {
        id: id.to_string(),
        title: property(PROP_TITLE).map(plain_text).unwrap_or_default(),
        description: property(PROP_DESCRIPTION).map(plain_text).unwrap_or_default(),
        tags: property(PROP_TAGS)
            .and_then(|prop| prop.multi_select.as_ref())
            .map(|options| options.iter().map(|option| option.name.clone()).collect())
            .unwrap_or_default(),
        priority: property(PROP_PRIORITY)
            .and_then(|prop| prop.select.as_ref())
            .and_then(|option| Priority::parse(&option.name))
            .unwrap_or_default(),
        status: property(PROP_STATUS)
            .and_then(|prop| prop.status.as_ref())
            .map(|option| TaskStatus::from_label(&option.name))
            .unwrap_or_default(),
        start_time: property(PROP_START_TIME)
            .and_then(date_start)
            .and_then(|raw| parse_date_value(id, PROP_START_TIME, raw))
            .map(|due| due.instant(time_zone)),
        end_time: property(PROP_END_TIME)
            .and_then(date_start)
            .and_then(|raw| parse_date_value(id, PROP_END_TIME, raw))
            .map(|due| due.instant(time_zone)),
        due_date: property(PROP_DUE_DATE)
            .and_then(date_start)
            .and_then(|raw| parse_date_value(id, PROP_DUE_DATE, raw)),
        time_minutes: estimate_minutes(property(PROP_TIME).and_then(|prop| prop.number)),
        last_edited_time,
        url: page
            .url
            .clone()
            .unwrap_or_else(|| format!("https://www.notion.so/{}", id.replace('-', ""))),
    })
}

fn plain_text(prop: &NotionProperty) -> String {
    prop.title
        .as_ref()
        .or(prop.rich_text.as_ref())
        .map(|segments| {
            segments
                .iter()
                .map(|segment| segment.plain_text.as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn date_start(prop: &NotionProperty) -> Option<&str> {
    prop.date
        .as_ref()
        .and_then(|date| date.start.as_deref())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 instant.
pub fn parse_date_value(page_id: &str, property: &str, raw: &str) -> Option<DueDate> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(DueDate::Date(date));
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(value) => Some(DueDate::Instant(value.with_timezone(&Utc))),
        Err(error) => {
            warn!(page_id, property, value = raw, error = %error, "ignoring unparseable date");
            None
        }
    }
}

/// Minutes rounded up; absent, non-positive or non-finite values become 1.
pub fn estimate_minutes(value: Option<f64>) -> u32 {
    match value {
        Some(minutes) if minutes.is_finite() && minutes > 0.0 => {
            minutes.ceil().min(f64::from(u32::MAX)) as u32
        }
        _ => 1,
    }
}
