use std::fmt;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use error_stack::{IntoReport, Report, ResultExt};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

use spoti_sync::config::{AppConfig, SettingsStore};
use spoti_sync::dialoguer::Dialoguer;
use spoti_sync::events::{EventSink, SyncEvent};
use spoti_sync::removal::{PromptGate, RemovalGate};
use spoti_sync::sync::PlaylistStatus;
use spoti_sync::{RunOptions, Suggestion, SyncEngine, SyncPlan};

#[derive(Debug)]
pub struct SpotiSyncError;
impl fmt::Display for SpotiSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Spoti-Sync error")
    }
}
impl std::error::Error for SpotiSyncError {}

pub type SpotiSyncResult<T> = error_stack::Result<T, SpotiSyncError>;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Keeps local folders in sync with your Spotify playlists")]
struct Cli {
    /// Settings document to use instead of the one in the config directory
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,
    /// Legacy KEY=VALUE file to migrate when no settings document exists yet
    #[arg(long, global = true, value_name = "PATH", default_value = AppConfig::LEGACY_ENV_FILE_NAME)]
    env_file: PathBuf,
    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: SpotiSyncCommands,
}

#[derive(Subcommand, Debug, PartialEq, Clone)]
enum SpotiSyncCommands {
    /// Sync every playlist of the configured user
    Sync {
        /// Offer to delete folders of playlists that no longer exist, overriding REMOVE
        #[clap(long, conflicts_with = "no_remove")]
        remove: bool,
        /// Never delete anything this run, overriding REMOVE
        #[clap(long)]
        no_remove: bool,
        /// Only sync this playlist, by name or folder name. Repeatable
        #[clap(long = "playlist", value_name = "NAME")]
        playlists: Vec<String>,
        /// Choose the playlists to sync from a list
        #[clap(long, conflicts_with = "playlists")]
        pick: bool,
    },
    /// Show what a sync would do without touching anything
    Plan,
    /// Print the current settings
    Config,
    /// Store the Spotify credentials, sync folder and download options
    Setup,
    /// Convert the legacy KEY=VALUE file into the settings document
    Migrate,
}

impl SpotiSyncCommands {
    pub async fn execute(&self, store: &SettingsStore, env_file: &Path) -> SpotiSyncResult<()> {
        match self {
            SpotiSyncCommands::Sync {
                remove,
                no_remove,
                playlists,
                pick,
            } => {
                let remove = match (remove, no_remove) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                };
                let options = RunOptions {
                    remove,
                    only: playlists.clone(),
                };
                sync(store, &options, *pick).await
            }
            SpotiSyncCommands::Plan => {
                let settings = store.load().change_context(SpotiSyncError)?;
                let engine = SyncEngine::from_settings(settings);
                let plan = engine
                    .plan(&RunOptions::default())
                    .await
                    .change_context(SpotiSyncError)?;
                print_plan(&plan);
                Ok(())
            }
            SpotiSyncCommands::Config => {
                let settings = store.load().change_context(SpotiSyncError)?;
                println!(
                    "Settings file: {}",
                    store.settings_path().display().to_string().cyan()
                );
                println!("Current config:\n{:#?}", settings.masked());
                let missing = settings.missing_fields();
                if !missing.is_empty() {
                    println!(
                        "{}",
                        format!(
                            "Missing {}, run `spoti-sync setup` to fill them in",
                            missing.join(", ")
                        )
                        .red()
                    );
                }
                Ok(())
            }
            SpotiSyncCommands::Setup => setup(store),
            SpotiSyncCommands::Migrate => {
                if store.settings_file_exists() {
                    println!(
                        "Settings already exist at {}, nothing to migrate",
                        store.settings_path().display().to_string().cyan()
                    );
                    return Ok(());
                }
                if store.migrate_from_env().change_context(SpotiSyncError)? {
                    println!(
                        "Settings migrated from {} to {}",
                        env_file.display().to_string().cyan(),
                        store.settings_path().display().to_string().cyan()
                    );
                } else {
                    println!(
                        "No legacy settings found at {}",
                        env_file.display().to_string().yellow()
                    );
                }
                Ok(())
            }
        }
    }
}

async fn sync(store: &SettingsStore, options: &RunOptions, pick: bool) -> SpotiSyncResult<()> {
    let settings = store.load().change_context(SpotiSyncError)?;

    let progress = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden());
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.white/blue}] {pos}/{len}")
            .into_report()
            .change_context(SpotiSyncError)?
            .progress_chars("█  "),
    );
    let prompt_bar = progress.clone();
    let gate = move |name: &str| -> bool {
        prompt_bar.suspend(|| PromptGate.confirm_removal(name))
    };

    let (sender, receiver) = mpsc::unbounded_channel();
    let engine = SyncEngine::from_settings(settings)
        .with_gate(gate)
        .with_events(EventSink::new(sender));
    tokio::spawn(cancel_on_ctrl_c(engine.cancellation_token()));
    let listener = tokio::spawn(show_progress(progress.clone(), receiver));

    let mut plan = engine.plan(options).await.change_context(SpotiSyncError)?;
    if pick {
        let chosen = pick_playlists(&plan)?;
        plan.restrict_to(&chosen);
    }
    let report = engine.execute(plan).await;
    drop(engine);
    if let Err(err) = listener.await {
        log::debug!("Progress listener stopped: {err}");
    }
    progress.finish_and_clear();

    report.print();
    if report.has_failures() {
        let failures = report.failed.len() + report.invalid.len() + report.removal_failed.len();
        return Err(Report::new(SpotiSyncError)
            .attach_printable(format!("{failures} playlists could not be synced or removed")));
    }
    Ok(())
}

fn pick_playlists(plan: &SyncPlan) -> SpotiSyncResult<Vec<String>> {
    let names: Vec<String> = plan
        .to_sync
        .iter()
        .map(|playlist| playlist.raw_name.clone())
        .collect();
    if names.is_empty() {
        return Ok(vec![]);
    }
    let prompt_text = "Select the playlists to sync".to_string();
    let selection =
        Dialoguer::multiselect(prompt_text, names.clone(), true).change_context(SpotiSyncError)?;
    Ok(selection
        .into_iter()
        .filter_map(|index| names.get(index).cloned())
        .collect())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    println!(
        "{}",
        "Stopping after the current playlist, press Ctrl-C again to quit now".yellow()
    );
    cancel.cancel();
    if tokio::signal::ctrl_c().await.is_ok() {
        std::process::exit(130);
    }
}

async fn show_progress(progress: ProgressBar, mut receiver: UnboundedReceiver<SyncEvent>) {
    while let Some(event) = receiver.recv().await {
        match event {
            SyncEvent::Planned { to_sync, .. } => {
                progress.set_length(to_sync as u64);
                progress.set_draw_target(ProgressDrawTarget::stderr());
            }
            SyncEvent::Removed { name } => {
                progress.println(format!("{} {}", "removed".magenta(), name));
            }
            SyncEvent::Started { name, .. } => {
                progress.set_message(format!("Syncing {}", name.cyan()));
            }
            SyncEvent::RateLimited { name, wait } => {
                progress.set_message(format!(
                    "{} is rate limited, retrying in {}s",
                    name.yellow(),
                    wait.as_secs()
                ));
            }
            SyncEvent::Waiting { wait } => {
                progress.set_message(format!("Waiting {}s before the next playlist", wait.as_secs()));
            }
            SyncEvent::Finished { name, status } => {
                let line = match &status {
                    PlaylistStatus::Failed { .. } => format!("{} {}", "✗".red(), name),
                    _ => format!("{} {} ({status})", "✓".green(), name),
                };
                progress.println(line);
                progress.inc(1);
            }
            SyncEvent::Cancelled => {
                progress.set_message("Cancelled".yellow().to_string());
            }
        }
    }
}

fn print_plan(plan: &SyncPlan) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Playlist", "Folder", "Action"]);
    for playlist in &plan.to_sync {
        let created = plan
            .reconciliation
            .to_create
            .iter()
            .any(|new| new.sanitized_name == playlist.sanitized_name);
        let action = if created {
            Cell::new("create and sync").fg(Color::Cyan)
        } else {
            Cell::new("sync").fg(Color::Green)
        };
        table.add_row(vec![
            Cell::new(&playlist.raw_name),
            Cell::new(&playlist.sanitized_name),
            action,
        ]);
    }
    for name in &plan.reconciliation.to_remove {
        let action = if plan.remove_enabled {
            Cell::new("remove (asks first)").fg(Color::Magenta)
        } else {
            Cell::new("stale, removal disabled")
        };
        table.add_row(vec![Cell::new(""), Cell::new(name), action]);
    }
    for invalid in &plan.catalog.invalid {
        table.add_row(vec![
            Cell::new(invalid.raw_names().join(", ")),
            Cell::new(""),
            Cell::new(format!("skip: {invalid}")).fg(Color::Red),
        ]);
    }
    println!(
        "Sync folder: {}",
        plan.sync_root.display().to_string().cyan()
    );
    println!("{table}");
    println!(
        "{} to sync, {} new, {} without a playlist, {} invalid",
        plan.to_sync.len().to_string().green(),
        plan.reconciliation.to_create.len().to_string().cyan(),
        plan.reconciliation.to_remove.len().to_string().magenta(),
        plan.catalog.invalid.len().to_string().red()
    );
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn read_seconds(prompt_text: &str, current: u64) -> SpotiSyncResult<u64> {
    let answer = Dialoguer::input(prompt_text.to_string(), Some(current.to_string()))
        .change_context(SpotiSyncError)?;
    answer
        .trim()
        .parse::<u64>()
        .into_report()
        .attach_printable(format!("{answer} is not a number of seconds"))
        .change_context(SpotiSyncError)
}

fn setup(store: &SettingsStore) -> SpotiSyncResult<()> {
    let mut settings = store.load().change_context(SpotiSyncError)?;

    settings.client_id = Dialoguer::input(
        "Spotify client id".to_string(),
        non_empty(&settings.client_id),
    )
    .change_context(SpotiSyncError)?;
    let has_secret = !settings.client_secret.trim().is_empty();
    let prompt_text = if has_secret {
        "Spotify client secret (empty keeps the current one)"
    } else {
        "Spotify client secret"
    };
    let secret =
        Dialoguer::password(prompt_text.to_string(), has_secret).change_context(SpotiSyncError)?;
    if !secret.trim().is_empty() {
        settings.client_secret = secret.trim().to_string();
    }
    settings.user = Dialoguer::input(
        "Spotify user whose playlists are synced".to_string(),
        non_empty(&settings.user),
    )
    .change_context(SpotiSyncError)?;
    let folder = Dialoguer::input(
        "Sync folder".to_string(),
        Some(settings.sync_folder.display().to_string()),
    )
    .change_context(SpotiSyncError)?;
    settings.sync_folder = PathBuf::from(folder.trim());

    settings.yt_premium_enabled = Dialoguer::confirm(
        "Download premium quality audio with YouTube Music cookies?".to_string(),
        settings.yt_premium_enabled,
    )
    .change_context(SpotiSyncError)?;
    if settings.yt_premium_enabled {
        settings.yt_cookies_file = Dialoguer::input(
            "Cookies file".to_string(),
            non_empty(&settings.yt_cookies_file),
        )
        .change_context(SpotiSyncError)?;
    }
    settings.playlist_delay = read_seconds("Seconds to wait between playlists", settings.playlist_delay)?;
    settings.rate_limit_wait = read_seconds(
        "Seconds to wait before retrying a rate limited playlist",
        settings.rate_limit_wait,
    )?;
    settings.remove = Dialoguer::confirm(
        "Offer to delete folders of playlists removed from Spotify?".to_string(),
        settings.remove,
    )
    .change_context(SpotiSyncError)?;

    store.save(&settings).change_context(SpotiSyncError)?;
    println!(
        "Settings successfully stored at {}:\n{:#?}",
        store.settings_path().display().to_string().cyan(),
        settings.masked()
    );
    Ok(())
}

fn init_logger(verbose: bool) {
    let default_filter = if verbose { "spoti_sync=debug,info" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

async fn run() -> SpotiSyncResult<()> {
    let cli = Cli::parse();

    init_logger(cli.verbose);
    Suggestion::set_report();

    let settings_path = match &cli.settings {
        Some(path) => path.clone(),
        None => SettingsStore::default_settings_path().change_context(SpotiSyncError)?,
    };
    let store = SettingsStore::new(settings_path, cli.env_file.clone());
    cli.command.execute(&store, &cli.env_file).await
}

#[tokio::main]
async fn main() -> SpotiSyncResult<()> {
    run().await
}
