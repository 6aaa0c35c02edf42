use crate::application::oauth::NowProvider;
use crate::domain::models::SyncStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{error, info};

pub const MAX_RECENT_ERRORS: usize = 10;
const HEALTHY_SUCCESS_RATIO: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedError {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub average_duration_ms: f64,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_stats: Option<SyncStats>,
    pub recent_errors: Vec<RecordedError>,
    /// Percentage with two decimals; `None` before the first run.
    pub success_rate: Option<f64>,
    pub healthy: bool,
}

#[derive(Debug, Default)]
struct Metrics {
    total_syncs: u64,
    successful_syncs: u64,
    failed_syncs: u64,
    average_duration_ms: f64,
    last_sync: Option<DateTime<Utc>>,
    last_stats: Option<SyncStats>,
    recent_errors: VecDeque<RecordedError>,
}

/// Cumulative statistics across passes, shared by the runner and the HTTP layer.
pub struct RunMonitor {
    metrics: Mutex<Metrics>,
    now_provider: NowProvider,
}

impl Default for RunMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMonitor {
    pub fn new() -> Self {
        Self {
            metrics: Mutex::new(Metrics::default()),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Metrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_run(
        &self,
        success: bool,
        duration: Duration,
        finished_at: DateTime<Utc>,
        stats: Option<SyncStats>,
    ) {
        let duration_ms = duration.as_secs_f64() * 1_000.0;
        let mut metrics = self.lock();
        metrics.total_syncs += 1;
        metrics.last_sync = Some(finished_at);
        if success {
            metrics.successful_syncs += 1;
            info!(duration_ms = duration.as_millis() as u64, "sync completed");
        } else {
            metrics.failed_syncs += 1;
            error!(duration_ms = duration.as_millis() as u64, "sync failed");
        }
        if stats.is_some() {
            metrics.last_stats = stats;
        }

        let total = metrics.total_syncs as f64;
        metrics.average_duration_ms =
            (metrics.average_duration_ms * (total - 1.0) + duration_ms) / total;
    }

    pub fn record_error(&self, message: impl Into<String>) {
        let recorded = RecordedError {
            timestamp: (self.now_provider)(),
            message: message.into(),
        };
        error!(error = %recorded.message, "error recorded");

        let mut metrics = self.lock();
        metrics.recent_errors.push_back(recorded);
        while metrics.recent_errors.len() > MAX_RECENT_ERRORS {
            metrics.recent_errors.pop_front();
        }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let metrics = self.lock();
        let success_rate = (metrics.total_syncs > 0).then(|| {
            let percent = metrics.successful_syncs as f64 / metrics.total_syncs as f64 * 100.0;
            (percent * 100.0).round() / 100.0
        });
        let healthy = metrics.failed_syncs == 0
            || metrics.successful_syncs as f64 / metrics.total_syncs as f64 > HEALTHY_SUCCESS_RATIO;

        MonitorSnapshot {
            total_syncs: metrics.total_syncs,
            successful_syncs: metrics.successful_syncs,
            failed_syncs: metrics.failed_syncs,
            average_duration_ms: metrics.average_duration_ms,
            last_sync: metrics.last_sync,
            last_stats: metrics.last_stats,
            recent_errors: metrics.recent_errors.iter().cloned().collect(),
            success_rate,
            healthy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn fresh_monitor_is_healthy_without_success_rate() {
        let snapshot = RunMonitor::new().snapshot();
        assert_eq!(snapshot.total_syncs, 0);
        assert_eq!(snapshot.success_rate, None);
        assert!(snapshot.healthy);
    }

    #[test]
    fn running_mean_and_counters_track_every_run() {
        let monitor = RunMonitor::new();
        let stats = SyncStats {
            created: 1,
            ..SyncStats::default()
        };
        monitor.record_run(true, Duration::from_millis(100), at("2025-01-01T10:00:00Z"), Some(stats));
        monitor.record_run(true, Duration::from_millis(300), at("2025-01-01T11:00:00Z"), None);
        monitor.record_run(false, Duration::from_millis(200), at("2025-01-01T12:00:00Z"), None);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.total_syncs, 3);
        assert_eq!(snapshot.successful_syncs, 2);
        assert_eq!(snapshot.failed_syncs, 1);
        assert!((snapshot.average_duration_ms - 200.0).abs() < 1e-9);
        assert_eq!(snapshot.last_sync, Some(at("2025-01-01T12:00:00Z")));
        assert_eq!(snapshot.last_stats, Some(stats));
        assert_eq!(snapshot.success_rate, Some(66.67));
        assert!(!snapshot.healthy);
    }

    #[test]
    fn mostly_successful_history_stays_healthy() {
        let monitor = RunMonitor::new();
        for _ in 0..9 {
            monitor.record_run(true, Duration::from_millis(10), at("2025-01-01T10:00:00Z"), None);
        }
        monitor.record_run(false, Duration::from_millis(10), at("2025-01-01T10:00:00Z"), None);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.success_rate, Some(90.0));
        assert!(snapshot.healthy);
    }

    #[test]
    fn only_last_ten_errors_are_kept() {
        let monitor = RunMonitor::new()
            .with_now_provider(Arc::new(|| at("2025-01-01T10:00:00Z")));
        for index in 0..12 {
            monitor.record_error(format!("failure {index}"));
        }

        let errors = monitor.snapshot().recent_errors;
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(errors[0].message, "failure 2");
        assert_eq!(errors[9].message, "failure 11");
        assert_eq!(errors[9].timestamp, at("2025-01-01T10:00:00Z"));
    }

    #[test]
    fn snapshot_serializes_with_camel_case_keys() {
        let monitor = RunMonitor::new();
        monitor.record_run(true, Duration::from_millis(5), at("2025-01-01T10:00:00Z"), None);
        let value = serde_json::to_value(monitor.snapshot()).expect("serialize");
        assert_eq!(value["totalSyncs"], 1);
        assert_eq!(value["successRate"], 100.0);
        assert_eq!(value["healthy"], true);
    }
}
