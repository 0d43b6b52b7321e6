use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, error, info, warn};
use serde::Deserialize;

use crate::db::{Database, DEFAULT_LOG_RETENTION_DAYS, RECENT_LOGS_LIMIT};
use crate::interaction::InteractionGenerator;
use crate::models::{AppTask, AutomationLogEntry};
use crate::orchestrator::{AutomationManager, AutomationState, ResumePolicy};
use crate::provider::{AdbProvider, ScreenInteractionProvider};
use crate::settings::SettingsStore;
use crate::watchdog::poller::DEFAULT_POLL_INTERVAL_MS;
use crate::watchdog::{FocusGuard, FocusWatchdog, ForegroundPoller};

const DB_FILE: &str = "appdriver.sqlite3";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Parser)]
#[command(name = "appdriver", version, about = "Run apps on a device, one after another, and keep them in front")]
pub struct Cli {
    /// Directory holding settings and the run log
    #[arg(long, global = true, default_value = ".appdriver")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the current batch of selected apps
    Run {
        /// JSON file with the app selection; replaces the stored one
        #[arg(long)]
        tasks: Option<PathBuf>,
        /// adb serial of the device to drive
        #[arg(long)]
        serial: Option<String>,
        /// Run the whole selection instead of the current batch
        #[arg(long)]
        all: bool,
    },
    /// Show the current batch
    Batch,
    /// Show recent run results
    Logs {
        /// Only failed launches
        #[arg(long)]
        failed: bool,
        /// Only entries written by this run id
        #[arg(long, conflicts_with = "failed")]
        run: Option<String>,
        #[arg(long, default_value_t = RECENT_LOGS_LIMIT)]
        limit: usize,
    },
    /// Change stored settings and print them
    Config {
        #[arg(long)]
        batch_size: Option<usize>,
        /// Default run length for apps without their own
        #[arg(long)]
        duration_minutes: Option<u64>,
        #[arg(long)]
        interval_ms: Option<u64>,
        #[arg(long, value_enum)]
        resume: Option<ResumeArg>,
        /// Replaces the disallowed package list (repeatable)
        #[arg(long = "disallow")]
        disallowed: Vec<String>,
    },
    /// Delete run results older than the retention window
    CleanLogs {
        #[arg(long, default_value_t = DEFAULT_LOG_RETENTION_DAYS)]
        days: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResumeArg {
    /// Resume only the interrupted app
    Current,
    /// Resume the interrupted app and everything queued after it
    Queue,
}

impl From<ResumeArg> for ResumePolicy {
    fn from(arg: ResumeArg) -> Self {
        match arg {
            ResumeArg::Current => ResumePolicy::CurrentTaskOnly,
            ResumeArg::Queue => ResumePolicy::RemainingQueue,
        }
    }
}

/// One entry of a `--tasks` file. Missing fields fall back to the package
/// id and the configured default duration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskEntry {
    package_id: String,
    display_name: Option<String>,
    duration_ms: Option<u64>,
}

fn load_task_file(path: &Path, default_duration_ms: u64) -> Result<Vec<AppTask>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read task file {}", path.display()))?;
    let entries: Vec<TaskEntry> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse task file {}", path.display()))?;

    entries
        .into_iter()
        .map(|entry| {
            let display_name = entry.display_name.unwrap_or_else(|| entry.package_id.clone());
            let duration_ms = entry.duration_ms.unwrap_or(default_duration_ms);
            Ok(AppTask::new(entry.package_id, display_name, duration_ms)?)
        })
        .collect()
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub async fn execute(cli: Cli) -> Result<()> {
    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("Failed to create {}", cli.data_dir.display()))?;
    let settings = SettingsStore::new(cli.data_dir.join(SETTINGS_FILE))?;
    let database = Database::new(cli.data_dir.join(DB_FILE))?;

    match cli.command {
        Command::Run { tasks, serial, all } => {
            run_tasks(&settings, database, tasks.as_deref(), serial, all).await
        }
        Command::Batch => show_batch(&settings),
        Command::Logs { failed, run, limit } => {
            show_logs(&database, failed, run.as_deref(), limit).await
        }
        Command::Config {
            batch_size,
            duration_minutes,
            interval_ms,
            resume,
            disallowed,
        } => {
            if let Some(size) = batch_size {
                settings.set_batch_size(size)?;
            }
            if let Some(minutes) = duration_minutes {
                settings.set_default_duration_minutes(minutes)?;
            }
            if let Some(ms) = interval_ms {
                settings.set_interaction_interval_ms(ms)?;
            }
            if let Some(resume) = resume {
                settings.set_resume_policy(resume.into())?;
            }
            if !disallowed.is_empty() {
                settings.set_disallowed_packages(disallowed)?;
            }
            println!("{}", serde_json::to_string_pretty(&settings.settings())?);
            Ok(())
        }
        Command::CleanLogs { days } => {
            let deleted = database.clean_old_logs(days).await?;
            println!("Deleted {deleted} log entries older than {days} days");
            Ok(())
        }
    }
}

fn show_batch(settings: &SettingsStore) -> Result<()> {
    let batch = settings.current_batch()?;
    let untested = settings.filter_untested(batch.tasks().to_vec(), today());

    println!(
        "Batch {}/{} ({} per batch)",
        batch.batch_index + 1,
        batch.total_batches.max(1),
        batch.batch_size
    );
    for task in batch.tasks() {
        let marker = if untested.contains(task) { " " } else { "x" };
        println!(
            "[{marker}] {} ({}) {}s",
            task.display_name,
            task.package_id,
            task.duration_ms / 1000
        );
    }
    Ok(())
}

fn print_entry(entry: &AutomationLogEntry) {
    let outcome = if entry.succeeded { "ok  " } else { "FAIL" };
    println!(
        "{} {outcome} {} ({}) {}s{}",
        entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        entry.display_name,
        entry.package_id,
        entry.duration_ms / 1000,
        entry
            .error_message
            .as_deref()
            .map(|msg| format!(" - {msg}"))
            .unwrap_or_default()
    );
}

async fn show_logs(
    database: &Database,
    failed: bool,
    run: Option<&str>,
    limit: usize,
) -> Result<()> {
    let entries = match (failed, run) {
        (_, Some(run_id)) => database.logs_for_run(run_id).await?,
        (true, None) => database.failed_logs().await?,
        (false, None) => database.recent_logs(limit).await?,
    };
    if entries.is_empty() {
        println!("No automation logs");
    }
    entries.iter().take(limit).for_each(print_entry);
    Ok(())
}

/// Remembers what ran today and moves the batch cursor on.
fn record_completion(settings: &SettingsStore, tasks: &[AppTask], all: bool) -> Result<()> {
    settings.mark_tested(tasks.iter().map(|t| t.package_id.as_str()), today())?;
    if !all {
        let next = settings.advance_batch()?;
        info!("Next batch index is {next}");
    }
    Ok(())
}

async fn run_tasks(
    settings: &SettingsStore,
    database: Database,
    task_file: Option<&Path>,
    serial: Option<String>,
    all: bool,
) -> Result<()> {
    if let Some(path) = task_file {
        let tasks = load_task_file(path, settings.settings().default_duration_ms)?;
        info!("Loaded {} apps from {}", tasks.len(), path.display());
        settings.set_selected_tasks(tasks)?;
    }

    match database.clean_old_logs(DEFAULT_LOG_RETENTION_DAYS).await {
        Ok(0) => {}
        Ok(deleted) => info!("Removed {deleted} expired log entries"),
        Err(err) => warn!("Failed to clean old logs: {err:#}"),
    }

    let config = settings.settings();
    let candidates = if all {
        config.selected_tasks.clone()
    } else {
        settings.current_batch()?.into_tasks()
    };
    let tasks = settings.filter_untested(candidates, today());

    let provider: Arc<dyn ScreenInteractionProvider> = Arc::new(AdbProvider::new(serial));
    let guard = Arc::new(FocusGuard::new());
    let watchdog = Arc::new(FocusWatchdog::spawn(
        provider.clone(),
        guard.clone(),
        settings.disallowed_surfaces(),
    ));
    let generator = Arc::new(
        InteractionGenerator::new(provider.clone(), guard, config.interaction_interval_ms)
            .with_focus_events(watchdog.sender()),
    );
    let manager = AutomationManager::new(
        provider.clone(),
        watchdog.clone(),
        generator,
        Arc::new(database),
    )
    .with_resume_policy(config.resume_policy);

    let mut poller = ForegroundPoller::new(DEFAULT_POLL_INTERVAL_MS);
    let mut states = manager.subscribe();

    manager
        .start(tasks.clone())
        .await
        .context("Failed to start automation")?;
    poller.start(provider.clone(), watchdog.sender())?;

    let mut current: Option<String> = None;
    let outcome = loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = states.borrow_and_update().clone();
                let progress = state.progress();
                match state {
                    AutomationState::Running { current_task, completed_count, total_count, .. } => {
                        if let Some(progress) = progress {
                            debug!("{} {:.0}%", current_task.package_id, progress * 100.0);
                        }
                        if current.as_deref() != Some(current_task.package_id.as_str()) {
                            println!(
                                "[{}/{}] {} for {}s",
                                completed_count + 1,
                                total_count,
                                current_task.display_name,
                                current_task.duration_ms / 1000
                            );
                            current = Some(current_task.package_id);
                        }
                    }
                    AutomationState::Completed { completed_count } => {
                        println!("Completed {completed_count} apps");
                        break record_completion(settings, &tasks, all);
                    }
                    AutomationState::Error { message } => {
                        error!("Automation failed: {message}");
                        break Err(anyhow::anyhow!(message));
                    }
                    AutomationState::Idle => break Ok(()),
                    AutomationState::Paused { .. } => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping");
                manager.stop().await;
            }
        }
    };

    if let Err(err) = poller.stop().await {
        warn!("{err:#}");
    }
    manager.stop().await;
    watchdog.shutdown().await;
    // Leave the device on the launcher rather than in the last app.
    if !provider.dispatch_home().await {
        warn!("Failed to return to the home screen");
    }
    outcome
}
