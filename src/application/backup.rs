use crate::domain::models::{format_fingerprint, OwnedEvent, SyncWindow};
use crate::infrastructure::calendar_sink::CalendarSink;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const BACKUP_PREFIX: &str = "events-backup-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBackup {
    pub timestamp: DateTime<Utc>,
    pub event_count: usize,
    pub events: Vec<OwnedEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupFile {
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
}

pub fn backup_file_name(now: DateTime<Utc>) -> String {
    let stamp = format_fingerprint(now).replace([':', '.'], "-");
    format!("{BACKUP_PREFIX}{stamp}.json")
}

/// Snapshots every owned event in `window` into `backups_dir`.
pub async fn create_backup<K>(
    sink: &K,
    window: &SyncWindow,
    backups_dir: &Path,
    now: DateTime<Utc>,
) -> Result<PathBuf, InfraError>
where
    K: CalendarSink + ?Sized,
{
    sink.authenticate().await?;
    let events = sink.list_owned_events(window).await?;

    fs::create_dir_all(backups_dir)?;
    let path = backups_dir.join(backup_file_name(now));
    let backup = EventBackup {
        timestamp: now,
        event_count: events.len(),
        events,
    };
    fs::write(&path, serde_json::to_string_pretty(&backup)?)?;
    info!(path = %path.display(), events = backup.event_count, "backup created");
    Ok(path)
}

/// Backups in `backups_dir`, newest first.
pub fn list_backups(backups_dir: &Path) -> Result<Vec<BackupFile>, InfraError> {
    if !backups_dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(backups_dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.starts_with(BACKUP_PREFIX) || !file_name.ends_with(".json") {
            continue;
        }
        files.push(BackupFile {
            size: entry.metadata()?.len(),
            path: entry.path(),
            file_name,
        });
    }
    files.sort_by(|left, right| right.file_name.cmp(&left.file_name));
    Ok(files)
}

pub fn read_backup(path: &Path) -> Result<EventBackup, InfraError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
