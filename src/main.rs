use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use notion_calendar_sync::api::{build_router, AppState};
use notion_calendar_sync::application::backup::{create_backup, list_backups};
use notion_calendar_sync::application::bootstrap::{bootstrap_workspace, WorkspacePaths};
use notion_calendar_sync::application::context::SyncContext;
use notion_calendar_sync::application::coordinator::Trigger;
use notion_calendar_sync::application::sync_runner::{run_scheduler, SyncTrigger, TriggerOutcome};
use notion_calendar_sync::domain::models::SyncWindow;
use notion_calendar_sync::infrastructure::calendar_sink::CalendarSink;
use notion_calendar_sync::infrastructure::config::AppConfig;
use notion_calendar_sync::infrastructure::logging::init_logging;
use notion_calendar_sync::infrastructure::notion_client::TaskSource;
use notion_calendar_sync::infrastructure::run_history_repository::{
    RunHistoryRepository, SqliteRunHistoryRepository,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Keeps one Google Calendar event per Notion task.
#[derive(Parser, Debug)]
#[command(name = "notion-calendar-sync")]
#[command(version)]
struct Cli {
    /// Directory holding config/, state/, logs/ and backups/
    #[arg(short, long, default_value = ".", env = "SYNC_WORKSPACE")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one reconciliation pass and print its statistics
    Sync,
    /// Serve the HTTP trigger surface and run scheduled passes
    Serve {
        /// Overrides PORT
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Google OAuth bootstrap
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Verify both APIs and show how sample tags route
    Check,
    /// Save owned events in the sync window to backups/
    Backup {
        /// List existing backups instead of creating one
        #[arg(long)]
        list: bool,
    },
    /// Show recent pass records
    History {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum AuthAction {
    /// Print the consent URL
    Url,
    /// Exchange an authorization code and store the token in the keyring
    Exchange {
        #[arg(long)]
        code: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&WorkspacePaths::new(&cli.workspace).logs_dir)
        .context("failed to initialize logging")?;

    run(cli.command, &cli.workspace).await
}

async fn run(command: Command, workspace: &Path) -> Result<()> {
    match command {
        Command::History { limit } => history(workspace, limit),
        Command::Backup { list: true } => print_backups(&WorkspacePaths::new(workspace)),
        Command::Backup { list: false } => {
            let context = connect(workspace)?;
            let path = create_backup(
                context.calendar_sink.as_ref(),
                &SyncWindow::default_around(Utc::now()),
                &context.paths.backups_dir,
                Utc::now(),
            )
            .await?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Sync => sync_once(&connect(workspace)?).await,
        Command::Serve { port } => serve(connect(workspace)?, port).await,
        Command::Auth { action } => auth(&connect(workspace)?, action).await,
        Command::Check => check(&connect(workspace)?).await,
    }
}

/// Loads configuration and wires the services that talk to Notion and Google.
fn connect(workspace: &Path) -> Result<SyncContext> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    SyncContext::new(workspace, config).context("failed to prepare workspace")
}

async fn sync_once(context: &SyncContext) -> Result<()> {
    match context.runner.execute(Trigger::Manual).await? {
        TriggerOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        TriggerOutcome::Rejected(rejection) => bail!("sync rejected: {rejection}"),
    }
}

async fn serve(context: SyncContext, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(context.config.server.port);
    let runner: Arc<dyn SyncTrigger> = context.runner.clone();

    let scheduler = tokio::spawn(run_scheduler(
        Arc::clone(&runner),
        context.config.sync.interval,
    ));

    let state = AppState::new(
        runner,
        Arc::clone(&context.monitor),
        context.config.server.webhook_secret.clone(),
        context.paths.logs_dir.clone(),
    );
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    scheduler.abort();
    if context.runner.coordinator().is_in_flight() {
        info!("waiting for the running sync pass to finish");
        context.runner.coordinator().wait_until_idle().await;
    }
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(signal_error) = signal::ctrl_c().await {
        error!(error = %signal_error, "failed to listen for shutdown signal");
    }
}

async fn auth(context: &SyncContext, action: AuthAction) -> Result<()> {
    match action {
        AuthAction::Url => {
            let state = format!("ncs-{}", Utc::now().timestamp());
            println!("{}", context.authenticator.build_authorization_url(&state)?);
        }
        AuthAction::Exchange { code } => {
            let token = context.authenticator.authenticate_with_code(&code).await?;
            println!(
                "token stored; expires at {}; refresh token {}",
                token.expires_at,
                if token.refresh_token.is_some() { "present" } else { "missing" }
            );
        }
    }
    Ok(())
}

async fn check(context: &SyncContext) -> Result<()> {
    let window = SyncWindow::default_around(Utc::now());

    let tasks = context
        .task_source
        .list_tasks(&window)
        .await
        .context("notion check failed")?;
    println!("notion: {} tasks in window", tasks.len());

    context
        .calendar_sink
        .authenticate()
        .await
        .context("google authentication failed")?;
    let events = context
        .calendar_sink
        .list_owned_events(&window)
        .await
        .context("google calendar check failed")?;
    println!("google calendar: {} owned events in window", events.len());

    let router = context.router();
    let mut samples = router
        .routes()
        .keys()
        .map(|tag| vec![tag.clone()])
        .collect::<Vec<_>>();
    samples.sort();
    samples.push(vec!["unmapped".to_string()]);
    samples.push(Vec::new());
    for tags in samples {
        let label = if tags.is_empty() { "none".to_string() } else { tags.join(", ") };
        println!("tags [{label}] -> {}", router.route(&tags));
    }
    Ok(())
}

fn print_backups(paths: &WorkspacePaths) -> Result<()> {
    for backup in list_backups(&paths.backups_dir)? {
        println!("{}\t{} bytes", backup.path.display(), backup.size);
    }
    Ok(())
}

fn history(workspace: &Path, limit: usize) -> Result<()> {
    let paths = bootstrap_workspace(workspace)?;
    let runs = SqliteRunHistoryRepository::new(&paths.database_path).recent(limit)?;
    if runs.is_empty() {
        println!("no sync runs recorded");
    }
    for run in runs {
        println!("{}", serde_json::to_string(&run)?);
    }
    Ok(())
}
