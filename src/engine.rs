use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::errors::{SyncEngineError, SyncEngineResult};
use crate::events::{EventSink, SyncEvent};
use crate::local::list_local_entries;
use crate::reconcile::{reconcile, select, Catalog, PlaylistRef, ReconciliationResult};
use crate::removal::{remove_confirmed, PromptGate, RemovalGate};
use crate::spotify::{CatalogError, PlaylistCatalog, RemotePlaylist, SpotifyApi};
use crate::sync::{sync_with_retry, wait_or_cancel, Downloader, RunReport, Spotdl, SyncOptions};
use crate::Suggestion;

/// Per-run choices made by the caller on top of the settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Overrides `REMOVE` for this run.
    pub remove: Option<bool>,
    /// Raw or sanitized playlist names to sync. Empty means every playlist.
    pub only: Vec<String>,
}

/// What a run is about to do. Computing it has no side effects.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub sync_root: PathBuf,
    pub catalog: Catalog,
    pub reconciliation: ReconciliationResult,
    /// `reconciliation.to_sync` after playlist selection.
    pub to_sync: Vec<PlaylistRef>,
    pub unmatched_selection: Vec<String>,
    pub remove_enabled: bool,
}

impl SyncPlan {
    /// Narrows the playlists to sync. Removal still looks at the whole catalog.
    pub fn restrict_to(&mut self, only: &[String]) {
        let (selected, unmatched) = select(self.reconciliation.to_sync.clone(), only);
        for name in &unmatched {
            log::warn!("No Spotify playlist is called {name}, ignoring it");
        }
        self.to_sync = selected;
        self.unmatched_selection = unmatched;
    }

    /// Folders that will be offered for removal this run.
    pub fn removal_candidates(&self) -> Option<&BTreeSet<String>> {
        self.remove_enabled.then_some(&self.reconciliation.to_remove)
    }
}

/// Bounded retry for the catalog fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogRetry {
    pub attempts: u32,
    pub base_delay: Duration,
    /// Upper bound for any single wait, `Retry-After` included.
    pub max_wait: Duration,
}

impl Default for CatalogRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            max_wait: Duration::from_secs(60),
        }
    }
}

impl CatalogRetry {
    fn delay_for(&self, attempt: u32, error: &CatalogError) -> Duration {
        let delay = match error {
            CatalogError::RateLimited {
                retry_after: Some(wait),
            } => *wait,
            _ => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1))),
        };
        delay.min(self.max_wait)
    }
}

fn catalog_failure(report: Report<CatalogError>) -> Report<SyncEngineError> {
    match report.current_context().clone() {
        CatalogError::Auth => report
            .change_context(SyncEngineError::Auth)
            .attach(Suggestion(
                "check CLIENT_ID and CLIENT_SECRET with `spoti-sync setup`".to_string(),
            )),
        CatalogError::UnknownUser(user) => report
            .change_context(SyncEngineError::Config(format!(
                "Spotify user \"{user}\" does not exist"
            )))
            .attach(Suggestion("check USER with `spoti-sync setup`".to_string())),
        _ => report.change_context(SyncEngineError::Catalog),
    }
}

/// Reconciles a Spotify account against the sync folder and drives the
/// downloader over every playlist, one at a time.
pub struct SyncEngine<C, D, G> {
    settings: Settings,
    catalog: C,
    downloader: D,
    gate: G,
    events: EventSink,
    cancel: CancellationToken,
    catalog_retry: CatalogRetry,
}

impl SyncEngine<SpotifyApi, Spotdl, PromptGate> {
    /// Engine wired to the Spotify Web API, spotdl and terminal prompts.
    pub fn from_settings(settings: Settings) -> Self {
        let catalog = SpotifyApi::new(settings.client_id.trim(), settings.client_secret.trim());
        let downloader = Spotdl::new(settings.spotdl_command.clone());
        Self::new(settings, catalog, downloader, PromptGate)
    }
}

impl<C, D, G> SyncEngine<C, D, G>
where
    C: PlaylistCatalog,
    D: Downloader,
    G: RemovalGate,
{
    pub fn new(settings: Settings, catalog: C, downloader: D, gate: G) -> Self {
        Self {
            settings,
            catalog,
            downloader,
            gate,
            events: EventSink::default(),
            cancel: CancellationToken::new(),
            catalog_retry: CatalogRetry::default(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_catalog_retry(mut self, catalog_retry: CatalogRetry) -> Self {
        self.catalog_retry = catalog_retry;
        self
    }

    /// Swaps the removal gate, keeping everything else.
    pub fn with_gate<H: RemovalGate>(self, gate: H) -> SyncEngine<C, D, H> {
        SyncEngine {
            settings: self.settings,
            catalog: self.catalog,
            downloader: self.downloader,
            gate,
            events: self.events,
            cancel: self.cancel,
            catalog_retry: self.catalog_retry,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn validate(&self) -> SyncEngineResult<()> {
        let missing = self.settings.missing_fields();
        if missing.is_empty() {
            return Ok(());
        }
        Err(Report::new(SyncEngineError::Config(format!(
            "missing {}",
            missing.join(", ")
        )))
        .attach(Suggestion("run `spoti-sync setup`".to_string())))
    }

    async fn fetch_catalog(&self) -> SyncEngineResult<Vec<RemotePlaylist>> {
        let user = self.settings.user.trim();
        let attempts = self.catalog_retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            let report = match self.catalog.fetch_playlists(user).await {
                Ok(playlists) => return Ok(playlists),
                Err(report) => report,
            };
            if !report.current_context().is_retryable() || attempt >= attempts {
                log::error!("Could not fetch the playlists of {user}: {report:?}");
                return Err(catalog_failure(report));
            }
            let wait = self.catalog_retry.delay_for(attempt, report.current_context());
            log::warn!(
                "Fetching the playlists of {user} failed ({}), attempt {attempt}/{attempts}, retrying in {}s",
                report.current_context(),
                wait.as_secs()
            );
            if !wait_or_cancel(&self.cancel, wait).await {
                return Err(catalog_failure(report)
                    .attach_printable("Run cancelled before the catalog could be fetched"));
            }
            attempt += 1;
        }
    }

    /// Fetches the catalog, snapshots the sync folder and diffs them.
    ///
    /// Configuration is checked before any request is made.
    pub async fn plan(&self, options: &RunOptions) -> SyncEngineResult<SyncPlan> {
        self.validate()?;
        let sync_root = self.settings.sync_root();

        let remote = self.fetch_catalog().await?;
        log::info!(
            "Found {} playlists for {}",
            remote.len(),
            self.settings.user.trim()
        );
        let local = list_local_entries(&sync_root)
            .change_context(SyncEngineError::LocalState)
            .attach_printable_lazy(|| format!("Sync folder: {}", sync_root.display()))?;

        let catalog = Catalog::from_remote(remote);
        let reconciliation = reconcile(&catalog, &local);
        log::info!(
            "{} playlists to sync ({} new), {} local folders without a playlist",
            reconciliation.to_sync.len(),
            reconciliation.to_create.len(),
            reconciliation.to_remove.len()
        );

        let mut plan = SyncPlan {
            sync_root,
            to_sync: reconciliation.to_sync.clone(),
            catalog,
            reconciliation,
            unmatched_selection: vec![],
            remove_enabled: options.remove.unwrap_or(self.settings.remove),
        };
        if !options.only.is_empty() {
            plan.restrict_to(&options.only);
        }
        Ok(plan)
    }

    /// Runs a plan: confirmed removals first, then every selected playlist in order.
    ///
    /// Single playlist failures are recorded and the run moves on.
    pub async fn execute(&self, plan: SyncPlan) -> RunReport {
        let mut report = RunReport::new();
        report.invalid = plan.catalog.invalid.clone();

        let to_remove = plan.removal_candidates().map_or(0, BTreeSet::len);
        self.events.emit(SyncEvent::Planned {
            to_sync: plan.to_sync.len(),
            to_remove,
        });

        match plan.removal_candidates() {
            Some(candidates) => {
                let remove = || {
                    remove_confirmed(
                        &plan.sync_root,
                        candidates,
                        &self.gate,
                        &self.cancel,
                        &self.events,
                    )
                };
                // The gate may block on a terminal prompt.
                let summary = match Handle::try_current().map(|handle| handle.runtime_flavor()) {
                    Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(remove),
                    _ => remove(),
                };
                report.record_removals(summary);
            }
            None if !plan.reconciliation.to_remove.is_empty() => {
                log::info!(
                    "Removal is disabled, keeping folders without a playlist: {}",
                    plan.reconciliation
                        .to_remove
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            None => {}
        }

        let new_folders: BTreeSet<&str> = plan
            .reconciliation
            .to_create
            .iter()
            .map(|playlist| playlist.sanitized_name.as_str())
            .collect();
        let options = SyncOptions::from_settings(&self.settings);
        let total = plan.to_sync.len();
        for (index, playlist) in plan.to_sync.iter().enumerate() {
            let mut proceed = !self.cancel.is_cancelled();
            if proceed && index > 0 && !options.playlist_delay.is_zero() {
                log::debug!(
                    "Waiting {}s before the next playlist",
                    options.playlist_delay.as_secs()
                );
                self.events.emit(SyncEvent::Waiting {
                    wait: options.playlist_delay,
                });
                proceed = wait_or_cancel(&self.cancel, options.playlist_delay).await;
            }
            if !proceed {
                report.not_attempted = plan.to_sync[index..]
                    .iter()
                    .map(|playlist| playlist.raw_name.clone())
                    .collect();
                break;
            }

            if new_folders.contains(playlist.sanitized_name.as_str()) {
                report.created.push(playlist.raw_name.clone());
            }
            log::info!("[{}/{total}] Syncing {}", index + 1, playlist.raw_name);
            self.events.emit(SyncEvent::Started {
                name: playlist.raw_name.clone(),
                index,
                total,
            });
            let status = sync_with_retry(
                &self.downloader,
                playlist,
                &plan.sync_root,
                &options,
                &self.cancel,
                &self.events,
            )
            .await;
            log::info!("{}: {status}", playlist.raw_name);
            report.record(&playlist.raw_name, &status);
            self.events.emit(SyncEvent::Finished {
                name: playlist.raw_name.clone(),
                status,
            });
        }

        if self.cancel.is_cancelled() {
            report.cancelled = true;
            log::warn!(
                "Run cancelled, {} playlists not attempted",
                report.not_attempted.len()
            );
            self.events.emit(SyncEvent::Cancelled);
        }
        for invalid in &report.invalid {
            log::error!("Skipped: {invalid}");
        }
        report.finish();
        log::info!(
            "Run finished: {} synced, {} failed, {} invalid, {} removed",
            report.synced_count(),
            report.failed.len(),
            report.invalid.len(),
            report.removed.len()
        );
        report
    }

    /// Plans and executes one full run.
    pub async fn run_sync(&self, options: &RunOptions) -> SyncEngineResult<RunReport> {
        let plan = self.plan(options).await?;
        Ok(self.execute(plan).await)
    }
}
