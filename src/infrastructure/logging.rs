use crate::infrastructure::error::InfraError;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    App,
    Error,
}

impl LogKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "app" => Some(LogKind::App),
            "error" => Some(LogKind::Error),
            _ => None,
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            LogKind::App => "app.log",
            LogKind::Error => "error.log",
        }
    }
}

pub fn log_path(logs_dir: &Path, kind: LogKind) -> PathBuf {
    logs_dir.join(kind.file_name())
}

fn open_append(path: &Path) -> Result<Arc<File>, InfraError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Arc::new(file))
}

/// Installs the global subscriber: human-readable stdout, every event as
/// JSON in `app.log`, and ERROR events as JSON in `error.log`.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_logging(logs_dir: &Path) -> Result<(), InfraError> {
    fs::create_dir_all(logs_dir)?;
    let app_log = open_append(&log_path(logs_dir, LogKind::App))?;
    let error_log = open_append(&log_path(logs_dir, LogKind::Error))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().json().with_ansi(false).with_writer(app_log))
        .with(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(error_log)
                .with_filter(LevelFilter::ERROR),
        )
        .try_init()
        .map_err(|error| InfraError::InvalidConfig(format!("failed to install logger: {error}")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTail {
    pub total_lines: usize,
    pub lines: Vec<String>,
}

/// Last `lines` non-empty lines of a log file, or `None` when the file does
/// not exist.
pub fn tail_log(path: &Path, lines: usize) -> Result<Option<LogTail>, InfraError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let all = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>();
    let start = all.len().saturating_sub(lines);
    Ok(Some(LogTail {
        total_lines: all.len(),
        lines: all[start..].iter().map(|line| line.to_string()).collect(),
    }))
}
