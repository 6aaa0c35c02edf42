use crate::domain::models::SyncStats;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One finished pass, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub trigger: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub success: bool,
    pub stats: SyncStats,
    pub error: Option<String>,
}

pub trait RunHistoryRepository: Send + Sync {
    fn record(&self, run: &RunRecord) -> Result<(), InfraError>;
    /// Most recent first.
    fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteRunHistoryRepository {
    db_path: PathBuf,
}

impl SqliteRunHistoryRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| InfraError::InvalidConfig(format!("invalid sync_runs.{column} '{raw}': {error}")))
}

type RawRun = (String, String, String, i64, bool, [u32; 5], Option<String>);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRun> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        [row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?],
        row.get(10)?,
    ))
}

impl RunHistoryRepository for SqliteRunHistoryRepository {
    fn record(&self, run: &RunRecord) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO sync_runs (
               trigger_kind, started_at, finished_at, duration_ms, success,
               created, updated, skipped, deleted, errors, error_message
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                run.trigger,
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
                run.duration_ms,
                run.success,
                run.stats.created,
                run.stats.updated,
                run.stats.skipped,
                run.stats.deleted,
                run.stats.errors,
                run.error,
            ],
        )?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT trigger_kind, started_at, finished_at, duration_ms, success,
                    created, updated, skipped, deleted, errors, error_message
             FROM sync_runs
             ORDER BY id DESC
             LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = statement
            .query_map(params![limit], read_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(trigger, started_at, finished_at, duration_ms, success, counters, error)| {
                    let [created, updated, skipped, deleted, errors] = counters;
                    Ok(RunRecord {
                        trigger,
                        started_at: parse_timestamp(&started_at, "started_at")?,
                        finished_at: parse_timestamp(&finished_at, "finished_at")?,
                        duration_ms,
                        success,
                        stats: SyncStats {
                            created,
                            updated,
                            skipped,
                            deleted,
                            errors,
                        },
                        error,
                    })
                },
            )
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRunHistoryRepository {
    runs: Mutex<Vec<RunRecord>>,
}

impl RunHistoryRepository for InMemoryRunHistoryRepository {
    fn record(&self, run: &RunRecord) -> Result<(), InfraError> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("run history lock poisoned: {error}")))?;
        runs.push(run.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, InfraError> {
        let runs = self
            .runs
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("run history lock poisoned: {error}")))?;
        Ok(runs.iter().rev().take(limit).cloned().collect())
    }
}
