use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::events::{EventSink, SyncEvent};
use crate::reconcile::PlaylistRef;
use crate::sync::downloader::Downloader;
use crate::sync::{describe_report, wait_or_cancel, SyncOptions, SyncOutcome};

/// Final result for one playlist after the retry policy ran.
#[derive(Debug, Clone, PartialEq, Eq, strum_macros::Display)]
pub enum PlaylistStatus {
    #[strum(serialize = "synced")]
    Succeeded,
    #[strum(serialize = "synced after rate limit")]
    Recovered,
    #[strum(serialize = "failed")]
    Failed { reason: String },
}

impl PlaylistStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, PlaylistStatus::Failed { .. })
    }
}

fn describe(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Success => "synced".to_string(),
        SyncOutcome::RateLimited { diagnostics } => format!("rate limited: {diagnostics}"),
        SyncOutcome::Failed {
            exit_code: Some(code),
            diagnostics,
        } => format!("spotdl exited with code {code}: {diagnostics}"),
        SyncOutcome::Failed {
            exit_code: None,
            diagnostics,
        } => format!("spotdl was terminated: {diagnostics}"),
    }
}

/// Syncs one playlist, retrying exactly once when the first attempt is rate
/// limited. Any other failure, or a failed retry, is final.
pub async fn sync_with_retry<D>(
    downloader: &D,
    playlist: &PlaylistRef,
    dest_root: &Path,
    options: &SyncOptions,
    cancel: &CancellationToken,
    events: &EventSink,
) -> PlaylistStatus
where
    D: Downloader + ?Sized,
{
    let name = &playlist.raw_name;
    let first = match downloader.sync_one(playlist, dest_root, options).await {
        Ok(outcome) => outcome,
        Err(report) => {
            log::error!("Could not sync {name}: {report:?}");
            return PlaylistStatus::Failed {
                reason: describe_report(&report),
            };
        }
    };

    match first {
        SyncOutcome::Success => return PlaylistStatus::Succeeded,
        SyncOutcome::Failed { .. } => {
            let reason = describe(&first);
            log::error!("Failed to sync {name}: {reason}");
            return PlaylistStatus::Failed { reason };
        }
        SyncOutcome::RateLimited { .. } => {}
    }

    let wait = options.rate_limit_wait;
    if wait.is_zero() {
        log::warn!("Rate limit hit for {name}, retrying immediately");
    } else {
        log::warn!("Rate limit hit for {name}, waiting {}s before retrying", wait.as_secs());
    }
    events.emit(SyncEvent::RateLimited {
        name: name.clone(),
        wait,
    });
    if !wait_or_cancel(cancel, wait).await {
        log::warn!("Run cancelled while waiting to retry {name}");
        return PlaylistStatus::Failed {
            reason: format!("{}; cancelled before retrying", describe(&first)),
        };
    }

    log::info!("Retrying {name}");
    match downloader.sync_one(playlist, dest_root, options).await {
        Ok(SyncOutcome::Success) => PlaylistStatus::Recovered,
        Ok(second) => {
            let reason = format!("retry failed, {}", describe(&second));
            log::error!("Failed to sync {name}: {reason}");
            PlaylistStatus::Failed { reason }
        }
        Err(report) => {
            log::error!("Could not retry {name}: {report:?}");
            PlaylistStatus::Failed {
                reason: format!("retry failed, {}", describe_report(&report)),
            }
        }
    }
}
