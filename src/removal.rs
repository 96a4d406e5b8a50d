use std::collections::BTreeSet;
use std::path::Path;

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::dialoguer::Dialoguer;
use crate::events::{EventSink, SyncEvent};
use crate::sanitize::is_sanitized;
use crate::sync::FailedPlaylist;

/// Asks whether a local folder that no longer matches any playlist may be deleted.
pub trait RemovalGate: Send + Sync {
    fn confirm_removal(&self, name: &str) -> bool;
}

impl<F> RemovalGate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm_removal(&self, name: &str) -> bool {
        self(name)
    }
}

/// Interactive gate; every folder needs an explicit yes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptGate;

impl RemovalGate for PromptGate {
    fn confirm_removal(&self, name: &str) -> bool {
        let prompt = format!(
            "Playlist {} is no longer on Spotify, delete its local folder?",
            name.yellow()
        );
        match Dialoguer::confirm(prompt, false) {
            Ok(answer) => answer,
            Err(report) => {
                log::warn!("Could not read an answer for {name}, keeping it: {report:?}");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    pub removed: Vec<String>,
    pub kept: Vec<String>,
    pub failed: Vec<FailedPlaylist>,
}

/// Deletes each folder in `to_remove` the gate approves, one at a time.
///
/// Nothing is deleted without a yes from the gate. Once `cancel` fires the
/// remaining folders are kept without asking.
pub fn remove_confirmed<G>(
    sync_root: &Path,
    to_remove: &BTreeSet<String>,
    gate: &G,
    cancel: &CancellationToken,
    events: &EventSink,
) -> RemovalSummary
where
    G: RemovalGate + ?Sized,
{
    let mut summary = RemovalSummary::default();
    for name in to_remove {
        if cancel.is_cancelled() || !is_sanitized(name) {
            summary.kept.push(name.clone());
            continue;
        }
        if !gate.confirm_removal(name) {
            log::info!("Keeping {name}");
            summary.kept.push(name.clone());
            continue;
        }
        let path = sync_root.join(name);
        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                log::info!("Removed {}", path.display());
                events.emit(SyncEvent::Removed { name: name.clone() });
                summary.removed.push(name.clone());
            }
            Err(err) => {
                log::error!("Could not remove {}: {err}", path.display());
                summary.failed.push(FailedPlaylist {
                    name: name.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn declined_folders_survive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Old")).unwrap();
        fs::write(dir.path().join("Old").join("song.mp3"), b"x").unwrap();

        let summary = remove_confirmed(
            dir.path(),
            &names(&["Old"]),
            &|_: &str| false,
            &CancellationToken::new(),
            &EventSink::default(),
        );

        assert!(dir.path().join("Old").join("song.mp3").exists());
        assert_eq!(summary.kept, vec!["Old"]);
        assert!(summary.removed.is_empty());
    }

    #[test]
    fn confirmed_folders_are_deleted_with_their_contents() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Old").join("nested")).unwrap();
        fs::create_dir(dir.path().join("Keep")).unwrap();

        let summary = remove_confirmed(
            dir.path(),
            &names(&["Keep", "Old"]),
            &|name: &str| name == "Old",
            &CancellationToken::new(),
            &EventSink::default(),
        );

        assert!(!dir.path().join("Old").exists());
        assert!(dir.path().join("Keep").exists());
        assert_eq!(summary.removed, vec!["Old"]);
        assert_eq!(summary.kept, vec!["Keep"]);
    }

    #[test]
    fn a_missing_folder_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let summary = remove_confirmed(
            dir.path(),
            &names(&["Gone"]),
            &|_: &str| true,
            &CancellationToken::new(),
            &EventSink::default(),
        );
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].name, "Gone");
    }

    #[test]
    fn unsanitized_names_and_cancelled_runs_never_ask() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Old")).unwrap();
        let asked = |_: &str| -> bool { panic!("gate must not be asked") };

        let summary = remove_confirmed(
            dir.path(),
            &names(&["../etc"]),
            &asked,
            &CancellationToken::new(),
            &EventSink::default(),
        );
        assert_eq!(summary.kept, vec!["../etc"]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = remove_confirmed(
            dir.path(),
            &names(&["Old"]),
            &asked,
            &cancel,
            &EventSink::default(),
        );
        assert_eq!(summary.kept, vec!["Old"]);
        assert!(dir.path().join("Old").exists());
    }
}
