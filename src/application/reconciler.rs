use crate::domain::models::{
    EventDraft, EventRef, EventTiming, OwnedEvent, OwnershipMetadata, SyncStats, SyncWindow, Task,
};
use crate::domain::routing::CalendarRouter;
use crate::domain::timing::TimingResolver;
use crate::infrastructure::calendar_sink::CalendarSink;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notion_client::TaskSource;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_TASK_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Created,
    Updated,
    Skipped,
    Failed,
}

impl TaskOutcome {
    fn apply(self, stats: &mut SyncStats) {
        match self {
            TaskOutcome::Created => stats.created += 1,
            TaskOutcome::Updated => stats.updated += 1,
            TaskOutcome::Skipped => stats.skipped += 1,
            TaskOutcome::Failed => stats.errors += 1,
        }
    }
}

/// Joins tasks to their owned calendar events and applies the difference.
pub struct ReconciliationEngine<S, K>
where
    S: TaskSource,
    K: CalendarSink,
{
    task_source: Arc<S>,
    calendar_sink: Arc<K>,
    router: CalendarRouter,
    resolver: TimingResolver,
    task_delay: Duration,
}

impl<S, K> ReconciliationEngine<S, K>
where
    S: TaskSource,
    K: CalendarSink,
{
    pub fn new(
        task_source: Arc<S>,
        calendar_sink: Arc<K>,
        router: CalendarRouter,
        resolver: TimingResolver,
    ) -> Self {
        Self {
            task_source,
            calendar_sink,
            router,
            resolver,
            task_delay: DEFAULT_TASK_DELAY,
        }
    }

    pub fn with_task_delay(mut self, task_delay: Duration) -> Self {
        self.task_delay = task_delay;
        self
    }

    pub fn router(&self) -> &CalendarRouter {
        &self.router
    }

    /// Full pass: authenticate, fetch both sides, reconcile. Any failure
    /// before reconciliation starts aborts the pass without mutations.
    pub async fn sync(&self, window: &SyncWindow) -> Result<SyncStats, InfraError> {
        self.calendar_sink.authenticate().await?;
        let tasks = self.task_source.list_tasks(window).await?;
        let owned_events = self.calendar_sink.list_owned_events(window).await?;
        info!(
            tasks = tasks.len(),
            owned_events = owned_events.len(),
            "starting reconciliation"
        );
        Ok(self.run_pass(&tasks, owned_events).await)
    }

    pub async fn run_pass(&self, tasks: &[Task], owned_events: Vec<OwnedEvent>) -> SyncStats {
        let mut stats = SyncStats::default();

        // First listed event per task is the one reconciled; the rest are
        // duplicates.
        let mut by_task: HashMap<&str, &OwnedEvent> = HashMap::new();
        let mut extras: Vec<&OwnedEvent> = Vec::new();
        for event in &owned_events {
            if by_task.contains_key(event.task_id.as_str()) {
                extras.push(event);
            } else {
                by_task.insert(event.task_id.as_str(), event);
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for task in tasks {
            if !seen.insert(task.id.as_str()) {
                warn!(task_id = %task.id, "task listed twice in one pass; ignoring repeat");
                stats.skipped += 1;
                continue;
            }

            let (outcome, called_calendar) =
                self.reconcile_task(task, by_task.get(task.id.as_str()).copied()).await;
            outcome.apply(&mut stats);

            if called_calendar && !self.task_delay.is_zero() {
                tokio::time::sleep(self.task_delay).await;
            }
        }

        let stale = owned_events
            .iter()
            .filter(|event| !seen.contains(event.task_id.as_str()))
            .chain(
                extras
                    .into_iter()
                    .filter(|event| seen.contains(event.task_id.as_str())),
            );
        for event in stale {
            if self.calendar_sink.delete_event(&event.event_ref).await {
                debug!(
                    task_id = %event.task_id,
                    event_id = %event.event_ref.event_id,
                    "deleted stale event"
                );
                stats.deleted += 1;
            } else {
                stats.errors += 1;
            }
        }

        info!(
            created = stats.created,
            updated = stats.updated,
            skipped = stats.skipped,
            deleted = stats.deleted,
            errors = stats.errors,
            "reconciliation pass finished"
        );
        stats
    }

    /// Returns the outcome and whether any calendar call was issued.
    async fn reconcile_task(&self, task: &Task, existing: Option<&OwnedEvent>) -> (TaskOutcome, bool) {
        if let Err(message) = task.validate() {
            warn!(task_id = %task.id, error = %message, "invalid task");
            return (TaskOutcome::Failed, false);
        }

        if let Some(event) = existing {
            if event.last_edited_time == Some(task.last_edited_time) {
                return (TaskOutcome::Skipped, false);
            }
        }

        let Some(timing) = self.resolver.resolve(task) else {
            debug!(task_id = %task.id, title = %task.title, "no timing information; skipping");
            return (TaskOutcome::Skipped, false);
        };

        let calendar_id = self.router.route(&task.tags);
        let draft = build_event_draft(task, timing);

        let Some(event) = existing else {
            return match self.calendar_sink.create_event(calendar_id, &draft).await {
                Some(created) => {
                    self.mark_synced(task, &created).await;
                    info!(task_id = %task.short_id(), title = %task.title, calendar_id, "created event");
                    (TaskOutcome::Created, true)
                }
                None => (TaskOutcome::Failed, true),
            };
        };

        let written = if event.event_ref.calendar_id == calendar_id {
            self.calendar_sink.update_event(&event.event_ref, &draft).await
        } else {
            if !self.calendar_sink.delete_event(&event.event_ref).await {
                warn!(task_id = %task.id, "move aborted: old event could not be deleted");
                return (TaskOutcome::Failed, true);
            }
            info!(
                task_id = %task.short_id(),
                from = %event.event_ref.calendar_id,
                to = calendar_id,
                "moving event to new calendar"
            );
            self.calendar_sink.create_event(calendar_id, &draft).await
        };

        match written {
            Some(event_ref) => {
                self.mark_synced(task, &event_ref).await;
                info!(task_id = %task.short_id(), title = %task.title, "updated event");
                (TaskOutcome::Updated, true)
            }
            None => (TaskOutcome::Failed, true),
        }
    }

    async fn mark_synced(&self, task: &Task, event_ref: &EventRef) {
        if let Err(error) = self
            .task_source
            .mark_synced(&task.id, &event_ref.event_id)
            .await
        {
            warn!(task_id = %task.id, error = %error, "failed to mark task synced");
        }
    }
}

pub fn build_event_draft(task: &Task, timing: EventTiming) -> EventDraft {
    EventDraft {
        summary: format!("{} [{}]", task.title, task.priority.as_str()),
        description: build_description(task),
        timing,
        color_id: Some(task.priority.color_id().to_string()),
        metadata: OwnershipMetadata::for_task(task),
    }
}

fn build_description(task: &Task) -> String {
    let tags = if task.tags.is_empty() {
        "None".to_string()
    } else {
        task.tags.join(", ")
    };
    let mut description = String::new();
    if !task.description.trim().is_empty() {
        description.push_str(task.description.trim_end());
        description.push_str("\n\n");
    }
    description.push_str("📋 DETAILS:\n");
    description.push_str(&format!("• Priority: {}\n", task.priority.as_str()));
    description.push_str(&format!("• Status: {}\n", task.status.label()));
    description.push_str(&format!("• Tags: {tags}\n"));
    description.push_str(&format!("• Estimated Time: {} minutes\n", task.time_minutes));
    description.push_str(&format!("\n🔗 View in Notion: {}", task.url));
    description
}
