use crate::domain::models::{EventDraft, EventRef, OwnedEvent, SyncWindow};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{decode_owned_event, encode_task_event};
use crate::infrastructure::google_calendar_client::{GoogleCalendarClient, ListEventsRequest};
use async_trait::async_trait;
use chrono_tz::Tz;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// Destination calendar as seen by reconciliation. Mutations report failure
/// through their return value and never abort a pass.
#[async_trait]
pub trait CalendarSink: Send + Sync {
    async fn authenticate(&self) -> Result<(), InfraError>;

    async fn list_owned_events(&self, window: &SyncWindow) -> Result<Vec<OwnedEvent>, InfraError>;

    async fn create_event(&self, calendar_id: &str, draft: &EventDraft) -> Option<EventRef>;

    async fn update_event(&self, event_ref: &EventRef, draft: &EventDraft) -> Option<EventRef>;

    async fn delete_event(&self, event_ref: &EventRef) -> bool;
}

#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, InfraError>;
}

pub struct GoogleCalendarSink<C, A>
where
    C: GoogleCalendarClient,
    A: AccessTokenProvider,
{
    client: Arc<C>,
    tokens: Arc<A>,
    calendars: Vec<String>,
    time_zone: Tz,
    access_token: Mutex<Option<String>>,
}

impl<C, A> GoogleCalendarSink<C, A>
where
    C: GoogleCalendarClient,
    A: AccessTokenProvider,
{
    /// `calendars` lists every calendar scanned for owned events.
    pub fn new(
        client: Arc<C>,
        tokens: Arc<A>,
        calendars: impl IntoIterator<Item = String>,
        time_zone: Tz,
    ) -> Self {
        Self {
            client,
            tokens,
            calendars: calendars.into_iter().collect(),
            time_zone,
            access_token: Mutex::new(None),
        }
    }

    fn cached_token(&self) -> Result<Option<String>, InfraError> {
        self.access_token
            .lock()
            .map(|guard| guard.clone())
            .map_err(|error| InfraError::OAuth(format!("access token lock poisoned: {error}")))
    }

    fn store_token(&self, token: String) -> Result<(), InfraError> {
        let mut guard = self
            .access_token
            .lock()
            .map_err(|error| InfraError::OAuth(format!("access token lock poisoned: {error}")))?;
        *guard = Some(token);
        Ok(())
    }

    async fn token(&self) -> Result<String, InfraError> {
        if let Some(token) = self.cached_token()? {
            return Ok(token);
        }
        let token = self.tokens.access_token().await?;
        self.store_token(token.clone())?;
        Ok(token)
    }
}

#[async_trait]
impl<C, A> CalendarSink for GoogleCalendarSink<C, A>
where
    C: GoogleCalendarClient,
    A: AccessTokenProvider,
{
    async fn authenticate(&self) -> Result<(), InfraError> {
        let token = self.tokens.access_token().await?;
        self.store_token(token)?;
        info!("google calendar authenticated");
        Ok(())
    }

    async fn list_owned_events(&self, window: &SyncWindow) -> Result<Vec<OwnedEvent>, InfraError> {
        let token = self.token().await?;
        let request = ListEventsRequest {
            time_min: window.start,
            time_max: window.end,
        };

        let mut owned = Vec::new();
        for calendar_id in &self.calendars {
            let events = self.client.list_events(&token, calendar_id, request).await?;
            let before = owned.len();
            owned.extend(
                events
                    .iter()
                    .filter_map(|event| decode_owned_event(event, calendar_id)),
            );
            debug!(
                calendar_id = %calendar_id,
                listed = events.len(),
                owned = owned.len() - before,
                "listed calendar events"
            );
        }
        Ok(owned)
    }

    async fn create_event(&self, calendar_id: &str, draft: &EventDraft) -> Option<EventRef> {
        let payload = encode_task_event(draft, &self.time_zone);
        let result = match self.token().await {
            Ok(token) => self.client.create_event(&token, calendar_id, &payload).await,
            Err(error) => Err(error),
        };
        match result {
            Ok(event_id) => Some(EventRef {
                calendar_id: calendar_id.to_string(),
                event_id,
            }),
            Err(failure) => {
                error!(
                    task_id = %draft.metadata.task_id,
                    calendar_id = %calendar_id,
                    error = %failure,
                    "failed to create calendar event"
                );
                None
            }
        }
    }

    async fn update_event(&self, event_ref: &EventRef, draft: &EventDraft) -> Option<EventRef> {
        let payload = encode_task_event(draft, &self.time_zone);
        let result = match self.token().await {
            Ok(token) => {
                self.client
                    .update_event(&token, &event_ref.calendar_id, &event_ref.event_id, &payload)
                    .await
            }
            Err(error) => Err(error),
        };
        match result {
            Ok(event_id) => Some(EventRef {
                calendar_id: event_ref.calendar_id.clone(),
                event_id,
            }),
            Err(failure) => {
                error!(
                    task_id = %draft.metadata.task_id,
                    calendar_id = %event_ref.calendar_id,
                    event_id = %event_ref.event_id,
                    error = %failure,
                    "failed to update calendar event"
                );
                None
            }
        }
    }

    async fn delete_event(&self, event_ref: &EventRef) -> bool {
        let result = match self.token().await {
            Ok(token) => {
                self.client
                    .delete_event(&token, &event_ref.calendar_id, &event_ref.event_id)
                    .await
            }
            Err(error) => Err(error),
        };
        match result {
            Ok(()) => true,
            Err(failure) => {
                error!(
                    calendar_id = %event_ref.calendar_id,
                    event_id = %event_ref.event_id,
                    error = %failure,
                    "failed to delete calendar event"
                );
                false
            }
        }
    }
}
