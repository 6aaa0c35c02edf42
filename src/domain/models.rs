use chrono::{DateTime, Duration, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WINDOW_DAYS_BACK: i64 = 1;
pub const DEFAULT_WINDOW_DAYS_AHEAD: i64 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    A,
    B,
    #[default]
    C,
    D,
}

impl Priority {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Priority::A),
            "B" => Some(Priority::B),
            "C" => Some(Priority::C),
            "D" => Some(Priority::D),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::A => "A",
            Priority::B => "B",
            Priority::C => "C",
            Priority::D => "D",
        }
    }

    /// Google Calendar palette entry used for events of this priority.
    pub fn color_id(&self) -> &'static str {
        match self {
            Priority::A => "11",
            Priority::B => "5",
            Priority::C => "2",
            Priority::D => "8",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Done,
    Other(String),
}

impl TaskStatus {
    /// Maps a source status label onto the closed set, ignoring case and
    /// whitespace differences ("Not started" and "Not  Started" are the same).
    pub fn from_label(label: &str) -> Self {
        let normalized = label
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        match normalized.as_str() {
            "" | "not started" => TaskStatus::NotStarted,
            "in progress" => TaskStatus::InProgress,
            "done" => TaskStatus::Done,
            _ => TaskStatus::Other(label.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            TaskStatus::NotStarted => "Not Started",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Done => "Done",
            TaskStatus::Other(label) => label,
        }
    }
}

/// A due date as stored in the source: either a bare calendar date or a
/// full instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DueDate {
    Date(NaiveDate),
    Instant(DateTime<Utc>),
}

impl DueDate {
    pub fn calendar_date(&self, time_zone: &Tz) -> NaiveDate {
        match self {
            DueDate::Date(date) => *date,
            DueDate::Instant(instant) => instant.with_timezone(time_zone).date_naive(),
        }
    }

    pub fn instant(&self, time_zone: &Tz) -> DateTime<Utc> {
        match self {
            DueDate::Date(date) => local_midnight(*date, time_zone),
            DueDate::Instant(instant) => *instant,
        }
    }
}

/// Midnight of `date` in `time_zone`, falling back to UTC midnight when the
/// local midnight does not exist.
pub fn local_midnight(date: NaiveDate, time_zone: &Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    time_zone
        .from_local_datetime(&naive)
        .earliest()
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub due_date: Option<DueDate>,
    pub time_minutes: u32,
    pub last_edited_time: DateTime<Utc>,
    pub url: String,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        if self.time_minutes == 0 {
            return Err("task.time_minutes must be positive".to_string());
        }
        Ok(())
    }

    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventTiming {
    Timed {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    AllDay {
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
}

impl EventTiming {
    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTiming::AllDay { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventRef {
    pub calendar_id: String,
    pub event_id: String,
}

/// Private metadata that marks an event as belonging to one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnershipMetadata {
    pub task_id: String,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub last_edited_time: DateTime<Utc>,
}

impl OwnershipMetadata {
    pub fn for_task(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            priority: task.priority,
            tags: task.tags.clone(),
            last_edited_time: task.last_edited_time,
        }
    }
}

/// An event payload ready to be written to a calendar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventDraft {
    pub summary: String,
    pub description: String,
    pub timing: EventTiming,
    pub color_id: Option<String>,
    pub metadata: OwnershipMetadata,
}

/// An existing calendar event carrying ownership metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnedEvent {
    pub event_ref: EventRef,
    pub task_id: String,
    pub last_edited_time: Option<DateTime<Utc>>,
    pub priority: Option<String>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SyncStats {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub deleted: u32,
    pub errors: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    pub fn around(now: DateTime<Utc>, days_back: i64, days_ahead: i64) -> Self {
        Self {
            start: now - Duration::days(days_back),
            end: now + Duration::days(days_ahead),
        }
    }

    pub fn default_around(now: DateTime<Utc>) -> Self {
        Self::around(now, DEFAULT_WINDOW_DAYS_BACK, DEFAULT_WINDOW_DAYS_AHEAD)
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
    pub scope: Option<String>,
}

impl OAuthToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expires_at > now + Duration::seconds(leeway_seconds)
            && !self.access_token.trim().is_empty()
    }
}

/// Fingerprint representation written into event metadata.
pub fn format_fingerprint(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
