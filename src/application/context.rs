use crate::application::bootstrap::{bootstrap_workspace, WorkspacePaths};
use crate::application::coordinator::PassCoordinator;
use crate::application::monitor::RunMonitor;
use crate::application::oauth::{GoogleAuthenticator, OAuthSettings};
use crate::application::reconciler::ReconciliationEngine;
use crate::application::sync_runner::SyncRunner;
use crate::domain::routing::CalendarRouter;
use crate::domain::timing::TimingResolver;
use crate::infrastructure::calendar_sink::GoogleCalendarSink;
use crate::infrastructure::config::{apply_routing_overrides, AppConfig};
use crate::infrastructure::credential_store::KeyringCredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_calendar_client::ReqwestGoogleCalendarClient;
use crate::infrastructure::notion_client::NotionTaskSource;
use crate::infrastructure::oauth_client::ReqwestOAuthClient;
use crate::infrastructure::run_history_repository::SqliteRunHistoryRepository;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub type LiveAuthenticator = GoogleAuthenticator<KeyringCredentialStore, ReqwestOAuthClient>;
pub type LiveCalendarSink = GoogleCalendarSink<ReqwestGoogleCalendarClient, LiveAuthenticator>;
pub type LiveSyncRunner =
    SyncRunner<NotionTaskSource, LiveCalendarSink, SqliteRunHistoryRepository>;

/// Fully wired production services for one workspace.
pub struct SyncContext {
    pub paths: WorkspacePaths,
    pub config: AppConfig,
    pub authenticator: Arc<LiveAuthenticator>,
    pub calendar_sink: Arc<LiveCalendarSink>,
    pub task_source: Arc<NotionTaskSource>,
    pub history: Arc<SqliteRunHistoryRepository>,
    pub monitor: Arc<RunMonitor>,
    pub runner: Arc<LiveSyncRunner>,
}

impl SyncContext {
    pub fn new(workspace_root: &Path, config: AppConfig) -> Result<Self, InfraError> {
        let paths = bootstrap_workspace(workspace_root)?;
        let routing = apply_routing_overrides(&paths.config_dir, config.routing.clone())?;
        let router = CalendarRouter::new(routing.routes, routing.default_calendar);

        let authenticator = Arc::new(GoogleAuthenticator::new(
            OAuthSettings::from_google_config(&config.google),
            Arc::new(KeyringCredentialStore::default()),
            Arc::new(ReqwestOAuthClient::new()),
        ));
        let calendar_sink = Arc::new(GoogleCalendarSink::new(
            Arc::new(ReqwestGoogleCalendarClient::with_api_base(
                config.google.api_base.clone(),
            )),
            Arc::clone(&authenticator),
            router.calendars(),
            config.time_zone,
        ));
        let task_source = Arc::new(NotionTaskSource::new(&config.notion, config.time_zone));
        let history = Arc::new(SqliteRunHistoryRepository::new(&paths.database_path));
        let monitor = Arc::new(RunMonitor::new());

        info!(
            calendars = router.calendars().len(),
            default_calendar = router.default_calendar(),
            time_zone = %config.time_zone,
            "sync services configured"
        );

        let engine = ReconciliationEngine::new(
            Arc::clone(&task_source),
            Arc::clone(&calendar_sink),
            router,
            TimingResolver::new(config.time_zone),
        )
        .with_task_delay(config.sync.task_delay);
        let runner = Arc::new(SyncRunner::new(
            engine,
            PassCoordinator::new(config.sync.cooldown),
            Arc::clone(&monitor),
            Arc::clone(&history),
        ));

        Ok(Self {
            paths,
            config,
            authenticator,
            calendar_sink,
            task_source,
            history,
            monitor,
            runner,
        })
    }

    pub fn router(&self) -> &CalendarRouter {
        self.runner.engine().router()
    }
}
