use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("OAuth error: {0}")]
    OAuth(String),
    #[error("Credential store error: {0}")]
    Credential(String),
    #[error("Google Calendar error: {0}")]
    Calendar(String),
    #[error("Notion error: {0}")]
    Notion(String),
    #[error("Sync task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl InfraError {
    /// Stable label for the `kind` field of structured log lines.
    pub fn label(&self) -> &'static str {
        match self {
            InfraError::Io(_) => "io",
            InfraError::Json(_) => "json",
            InfraError::Sqlite(_) => "sqlite",
            InfraError::InvalidConfig(_) => "config",
            InfraError::OAuth(_) => "oauth",
            InfraError::Credential(_) => "credential",
            InfraError::Calendar(_) => "calendar",
            InfraError::Notion(_) => "notion",
            InfraError::Task(_) => "task",
        }
    }
}
