use crate::infrastructure::config::{
    apply_routing_overrides, ensure_default_configs, RoutingConfig, DEFAULT_CALENDAR_ID,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub backups_dir: PathBuf,
    pub database_path: PathBuf,
}

impl WorkspacePaths {
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            workspace_root: workspace_root.to_path_buf(),
            config_dir: workspace_root.join("config"),
            logs_dir: workspace_root.join("logs"),
            backups_dir: workspace_root.join("backups"),
            database_path: workspace_root.join("state").join("sync.sqlite"),
        }
    }
}

/// Creates the workspace layout, writes default config files and prepares
/// the run-history database. Safe to call on every start.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<WorkspacePaths, InfraError> {
    let paths = WorkspacePaths::new(workspace_root);
    fs::create_dir_all(&paths.config_dir)?;
    fs::create_dir_all(&paths.logs_dir)?;
    fs::create_dir_all(&paths.backups_dir)?;
    if let Some(state_dir) = paths.database_path.parent() {
        fs::create_dir_all(state_dir)?;
    }

    ensure_default_configs(&paths.config_dir)?;
    // Fail early on a malformed calendars.json.
    apply_routing_overrides(
        &paths.config_dir,
        RoutingConfig {
            routes: HashMap::new(),
            default_calendar: DEFAULT_CALENDAR_ID.to_string(),
        },
    )?;
    initialize_database(&paths.database_path)?;

    Ok(paths)
}
