use crate::domain::models::{EventTiming, Task, TaskStatus};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

/// Turns a task's status and time fields into concrete event bounds.
#[derive(Debug, Clone, Copy)]
pub struct TimingResolver {
    time_zone: Tz,
}

impl TimingResolver {
    pub fn new(time_zone: Tz) -> Self {
        Self { time_zone }
    }

    /// Returns `None` when the task carries no actionable timing.
    pub fn resolve(&self, task: &Task) -> Option<EventTiming> {
        match &task.status {
            TaskStatus::Done => match (task.start_time, task.end_time) {
                (Some(start), Some(end)) => Some(EventTiming::Timed { start, end }),
                _ => None,
            },
            TaskStatus::InProgress => task
                .start_time
                .map(|start| timed_from_estimate(start, task.time_minutes)),
            TaskStatus::NotStarted => {
                if let Some(start) = task.start_time {
                    return Some(timed_from_estimate(start, task.time_minutes));
                }
                task.due_date.map(|due| {
                    let date = due.calendar_date(&self.time_zone);
                    EventTiming::AllDay {
                        start_date: date,
                        end_date: date,
                    }
                })
            }
            TaskStatus::Other(_) => {
                if let (Some(start), Some(end)) = (task.start_time, task.end_time) {
                    return Some(EventTiming::Timed { start, end });
                }
                if let Some(start) = task.start_time {
                    return Some(timed_from_estimate(start, task.time_minutes));
                }
                task.due_date.map(|due| {
                    let end = due.instant(&self.time_zone);
                    EventTiming::Timed {
                        start: end - estimate(task.time_minutes),
                        end,
                    }
                })
            }
        }
    }
}

fn estimate(time_minutes: u32) -> Duration {
    Duration::minutes(i64::from(time_minutes))
}

fn timed_from_estimate(start: DateTime<Utc>, time_minutes: u32) -> EventTiming {
    EventTiming::Timed {
        start,
        end: start + estimate(time_minutes),
    }
}
