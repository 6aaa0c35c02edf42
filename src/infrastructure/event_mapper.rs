use crate::domain::models::{
    format_fingerprint, EventDraft, EventRef, EventTiming, OwnedEvent,
};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;

const KEY_TASK_ID: &str = "notionTaskId";
const KEY_PRIORITY: &str = "priority";
const KEY_TAGS: &str = "tags";
const KEY_LAST_EDITED_TIME: &str = "lastEditedTime";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventDateTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventExtendedProperties {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub private: HashMap<String, String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct GoogleCalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "colorId", skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(default)]
    pub start: CalendarEventDateTime,
    #[serde(default)]
    pub end: CalendarEventDateTime,
    #[serde(rename = "extendedProperties", skip_serializing_if = "Option::is_none")]
    pub extended_properties: Option<CalendarEventExtendedProperties>,
}

pub fn encode_task_event(draft: &EventDraft, time_zone: &Tz) -> GoogleCalendarEvent {
    let metadata = &draft.metadata;
    let private = HashMap::from([
        (KEY_TASK_ID.to_string(), metadata.task_id.clone()),
        (KEY_PRIORITY.to_string(), metadata.priority.as_str().to_string()),
        (KEY_TAGS.to_string(), metadata.tags.join(",")),
        (
            KEY_LAST_EDITED_TIME.to_string(),
            format_fingerprint(metadata.last_edited_time),
        ),
    ]);

    let (start, end) = match draft.timing {
        EventTiming::Timed { start, end } => (
            zoned_date_time(start, time_zone),
            zoned_date_time(end, time_zone),
        ),
        // All-day end dates are exclusive on the calendar side.
        EventTiming::AllDay {
            start_date,
            end_date,
        } => (
            CalendarEventDateTime {
                date: Some(start_date.to_string()),
                ..CalendarEventDateTime::default()
            },
            CalendarEventDateTime {
                date: Some((end_date + Duration::days(1)).to_string()),
                ..CalendarEventDateTime::default()
            },
        ),
    };

    GoogleCalendarEvent {
        id: None,
        summary: Some(draft.summary.clone()),
        description: Some(draft.description.clone()),
        status: None,
        color_id: draft.color_id.clone(),
        start,
        end,
        extended_properties: Some(CalendarEventExtendedProperties { private }),
    }
}

/// Returns `None` for events that do not carry a task id; those are never
/// touched by reconciliation.
pub fn decode_owned_event(event: &GoogleCalendarEvent, calendar_id: &str) -> Option<OwnedEvent> {
    let private = &event.extended_properties.as_ref()?.private;
    let task_id = private
        .get(KEY_TASK_ID)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())?;
    let event_id = event
        .id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())?;

    let last_edited_time = private
        .get(KEY_LAST_EDITED_TIME)
        .and_then(|value| DateTime::parse_from_rfc3339(value.trim()).ok())
        .map(|value| value.with_timezone(&Utc));
    let tags = private
        .get(KEY_TAGS)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default();

    Some(OwnedEvent {
        event_ref: EventRef {
            calendar_id: calendar_id.to_string(),
            event_id: event_id.to_string(),
        },
        task_id: task_id.to_string(),
        last_edited_time,
        priority: private.get(KEY_PRIORITY).cloned(),
        tags,
        summary: event.summary.clone(),
    })
}

fn zoned_date_time(value: DateTime<Utc>, time_zone: &Tz) -> CalendarEventDateTime {
    CalendarEventDateTime {
        date_time: Some(value.with_timezone(time_zone).to_rfc3339()),
        date: None,
        time_zone: Some(time_zone.name().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{OwnershipMetadata, Priority};
    use chrono::NaiveDate;

    fn lima() -> Tz {
        "America/Lima".parse().expect("valid tz")
    }

    fn utc(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn draft(timing: EventTiming) -> EventDraft {
        EventDraft {
            summary: "Read paper [A]".to_string(),
            description: "details".to_string(),
            timing,
            color_id: Some(Priority::A.color_id().to_string()),
            metadata: OwnershipMetadata {
                task_id: "task-1".to_string(),
                priority: Priority::A,
                tags: vec!["read".to_string(), "Deep Work".to_string()],
                last_edited_time: utc("2025-01-01T10:00:00Z"),
            },
        }
    }

    #[test]
    fn timed_event_is_rendered_in_configured_zone() {
        let event = encode_task_event(
            &draft(EventTiming::Timed {
                start: utc("2025-01-01T15:00:00Z"),
                end: utc("2025-01-01T15:30:00Z"),
            }),
            &lima(),
        );

        assert_eq!(event.start.date_time.as_deref(), Some("2025-01-01T10:00:00-05:00"));
        assert_eq!(event.end.date_time.as_deref(), Some("2025-01-01T10:30:00-05:00"));
        assert_eq!(event.start.time_zone.as_deref(), Some("America/Lima"));
        assert_eq!(event.start.date, None);
        assert_eq!(event.color_id.as_deref(), Some("11"));
    }

    #[test]
    fn all_day_event_uses_exclusive_end_date() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 4).expect("date");
        let event = encode_task_event(
            &draft(EventTiming::AllDay {
                start_date: day,
                end_date: day,
            }),
            &lima(),
        );

        assert_eq!(event.start.date.as_deref(), Some("2025-01-04"));
        assert_eq!(event.end.date.as_deref(), Some("2025-01-05"));
        assert_eq!(event.start.date_time, None);
    }

    #[test]
    fn metadata_keys_match_the_ownership_schema() {
        let event = encode_task_event(
            &draft(EventTiming::Timed {
                start: utc("2025-01-01T15:00:00Z"),
                end: utc("2025-01-01T15:30:00Z"),
            }),
            &lima(),
        );
        let value = serde_json::to_value(&event).expect("serialize");
        let private = &value["extendedProperties"]["private"];

        assert_eq!(private["notionTaskId"], "task-1");
        assert_eq!(private["priority"], "A");
        assert_eq!(private["tags"], "read,Deep Work");
        assert_eq!(private["lastEditedTime"], "2025-01-01T10:00:00.000Z");
    }

    #[test]
    fn encoded_event_decodes_back_to_owned_event() {
        let mut event = encode_task_event(
            &draft(EventTiming::Timed {
                start: utc("2025-01-01T15:00:00Z"),
                end: utc("2025-01-01T15:30:00Z"),
            }),
            &lima(),
        );
        event.id = Some("evt-9".to_string());

        let owned = decode_owned_event(&event, "primary").expect("owned event");
        assert_eq!(owned.task_id, "task-1");
        assert_eq!(owned.event_ref.event_id, "evt-9");
        assert_eq!(owned.event_ref.calendar_id, "primary");
        assert_eq!(owned.last_edited_time, Some(utc("2025-01-01T10:00:00Z")));
        assert_eq!(owned.tags, vec!["read".to_string(), "Deep Work".to_string()]);
    }

    #[test]
    fn events_without_task_id_are_not_owned() {
        let raw = serde_json::json!({
            "id": "external-event",
            "summary": "Dentist",
            "start": { "dateTime": "2025-01-01T10:00:00-05:00" },
            "end": { "dateTime": "2025-01-01T11:00:00-05:00" },
            "extendedProperties": { "private": { "source": "other-tool" } }
        });
        let event: GoogleCalendarEvent = serde_json::from_value(raw).expect("parse event");
        assert!(decode_owned_event(&event, "primary").is_none());

        let bare: GoogleCalendarEvent =
            serde_json::from_value(serde_json::json!({ "id": "plain" })).expect("parse event");
        assert!(decode_owned_event(&bare, "primary").is_none());
    }

    #[test]
    fn unparseable_fingerprint_decodes_as_missing() {
        let raw = serde_json::json!({
            "id": "evt-1",
            "start": { "date": "2025-01-04" },
            "end": { "date": "2025-01-05" },
            "extendedProperties": { "private": {
                "notionTaskId": "task-1",
                "lastEditedTime": "yesterday"
            } }
        });
        let event: GoogleCalendarEvent = serde_json::from_value(raw).expect("parse event");
        let owned = decode_owned_event(&event, "primary").expect("owned event");
        assert_eq!(owned.last_edited_time, None);
        assert!(owned.tags.is_empty());
    }
}
