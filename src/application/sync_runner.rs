use crate::application::coordinator::{PassCoordinator, PassPermit, PassRejection, Trigger};
use crate::application::monitor::RunMonitor;
use crate::application::oauth::NowProvider;
use crate::application::reconciler::ReconciliationEngine;
use crate::domain::models::{SyncStats, SyncWindow};
use crate::infrastructure::calendar_sink::CalendarSink;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notion_client::TaskSource;
use crate::infrastructure::run_history_repository::{RunHistoryRepository, RunRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stats: SyncStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Completed(SyncReport),
    Rejected(PassRejection),
}

/// Entry point shared by the HTTP layer, the scheduler and the CLI.
#[async_trait]
pub trait SyncTrigger: Send + Sync {
    async fn trigger(&self, trigger: Trigger) -> Result<TriggerOutcome, InfraError>;
}

pub struct SyncRunner<S, K, H>
where
    S: TaskSource,
    K: CalendarSink,
    H: RunHistoryRepository,
{
    engine: Arc<ReconciliationEngine<S, K>>,
    coordinator: PassCoordinator,
    monitor: Arc<RunMonitor>,
    history: Arc<H>,
    now_provider: NowProvider,
}

impl<S, K, H> SyncRunner<S, K, H>
where
    S: TaskSource + 'static,
    K: CalendarSink + 'static,
    H: RunHistoryRepository + 'static,
{
    pub fn new(
        engine: ReconciliationEngine<S, K>,
        coordinator: PassCoordinator,
        monitor: Arc<RunMonitor>,
        history: Arc<H>,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            coordinator,
            monitor,
            history,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn engine(&self) -> &ReconciliationEngine<S, K> {
        &self.engine
    }

    pub fn coordinator(&self) -> &PassCoordinator {
        &self.coordinator
    }

    /// Starts a pass on its own task and waits for it. Dropping the returned
    /// future stops the wait, not the pass.
    pub async fn execute(&self, trigger: Trigger) -> Result<TriggerOutcome, InfraError> {
        let permit = match self.coordinator.try_start_pass(trigger) {
            Ok(permit) => permit,
            Err(rejection) => {
                info!(trigger = trigger.as_str(), reason = %rejection, "sync pass rejected");
                return Ok(TriggerOutcome::Rejected(rejection));
            }
        };

        let job = PassJob {
            engine: Arc::clone(&self.engine),
            monitor: Arc::clone(&self.monitor),
            history: Arc::clone(&self.history),
            now_provider: Arc::clone(&self.now_provider),
        };
        tokio::spawn(job.run(permit)).await?
    }
}

struct PassJob<S, K, H>
where
    S: TaskSource,
    K: CalendarSink,
    H: RunHistoryRepository,
{
    engine: Arc<ReconciliationEngine<S, K>>,
    monitor: Arc<RunMonitor>,
    history: Arc<H>,
    now_provider: NowProvider,
}

impl<S, K, H> PassJob<S, K, H>
where
    S: TaskSource,
    K: CalendarSink,
    H: RunHistoryRepository,
{
    /// The permit is held until history and metrics are written.
    async fn run(self, permit: PassPermit) -> Result<TriggerOutcome, InfraError> {
        let trigger = permit.trigger();
        let started_at = (self.now_provider)();
        let clock = Instant::now();
        info!(trigger = trigger.as_str(), "sync pass started");

        let window = SyncWindow::default_around(started_at);
        let result = self.engine.sync(&window).await;

        let duration = clock.elapsed();
        let finished_at = (self.now_provider)();

        let record = RunRecord {
            trigger: trigger.as_str().to_string(),
            started_at,
            finished_at,
            duration_ms: i64::try_from(duration.as_millis()).unwrap_or(i64::MAX),
            success: result.is_ok(),
            stats: result.as_ref().copied().unwrap_or_default(),
            error: result.as_ref().err().map(ToString::to_string),
        };
        if let Err(history_error) = self.history.record(&record) {
            warn!(kind = history_error.label(), error = %history_error, "failed to record sync run");
        }

        let outcome = match result {
            Ok(stats) => {
                self.monitor.record_run(true, duration, finished_at, Some(stats));
                Ok(TriggerOutcome::Completed(SyncReport {
                    trigger,
                    started_at,
                    finished_at,
                    duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                    stats,
                }))
            }
            Err(sync_error) => {
                self.monitor.record_run(false, duration, finished_at, None);
                self.monitor.record_error(sync_error.to_string());
                Err(sync_error)
            }
        };
        drop(permit);
        outcome
    }
}

#[async_trait]
impl<S, K, H> SyncTrigger for SyncRunner<S, K, H>
where
    S: TaskSource + 'static,
    K: CalendarSink + 'static,
    H: RunHistoryRepository + 'static,
{
    async fn trigger(&self, trigger: Trigger) -> Result<TriggerOutcome, InfraError> {
        self.execute(trigger).await
    }
}

/// Runs a scheduled pass every `period`, starting one period from now.
pub async fn run_scheduler(runner: Arc<dyn SyncTrigger>, period: Duration) {
    let period = period.max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(period_secs = period.as_secs(), "scheduler started");

    loop {
        ticker.tick().await;
        match runner.trigger(Trigger::Scheduled).await {
            Ok(TriggerOutcome::Completed(report)) => {
                info!(duration_ms = report.duration_ms, "scheduled sync completed");
            }
            Ok(TriggerOutcome::Rejected(rejection)) => {
                info!(reason = %rejection, "scheduled sync skipped");
            }
            Err(sync_error) => {
                error!(kind = sync_error.label(), error = %sync_error, "scheduled sync failed")
            }
        }
    }
}
