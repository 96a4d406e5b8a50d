use chrono::{DateTime, Utc};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};

use crate::removal::RemovalSummary;
use crate::sanitize::InvalidName;
use crate::sync::PlaylistStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPlaylist {
    pub name: String,
    pub reason: String,
}

/// Everything a run did, in the order it happened.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Playlists with no local folder before the run.
    pub created: Vec<String>,
    pub succeeded: Vec<String>,
    /// Succeeded on the retry after a rate limit.
    pub recovered: Vec<String>,
    pub failed: Vec<FailedPlaylist>,
    pub invalid: Vec<InvalidName>,
    pub removed: Vec<String>,
    pub kept: Vec<String>,
    pub removal_failed: Vec<FailedPlaylist>,
    /// Selected but never started because the run was cancelled.
    pub not_attempted: Vec<String>,
    pub cancelled: bool,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            created: vec![],
            succeeded: vec![],
            recovered: vec![],
            failed: vec![],
            invalid: vec![],
            removed: vec![],
            kept: vec![],
            removal_failed: vec![],
            not_attempted: vec![],
            cancelled: false,
        }
    }

    pub fn record(&mut self, name: &str, status: &PlaylistStatus) {
        match status {
            PlaylistStatus::Succeeded => self.succeeded.push(name.to_string()),
            PlaylistStatus::Recovered => self.recovered.push(name.to_string()),
            PlaylistStatus::Failed { reason } => self.failed.push(FailedPlaylist {
                name: name.to_string(),
                reason: reason.clone(),
            }),
        }
    }

    pub fn record_removals(&mut self, summary: RemovalSummary) {
        self.removed = summary.removed;
        self.kept = summary.kept;
        self.removal_failed = summary.failed;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn synced_count(&self) -> usize {
        self.succeeded.len() + self.recovered.len()
    }

    /// True when any playlist failed, was skipped as invalid, or could not be removed.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty() || !self.invalid.is_empty() || !self.removal_failed.is_empty()
    }

    fn table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Playlist", "Status", "Details"]);
        for name in &self.succeeded {
            table.add_row(vec![
                Cell::new(name),
                Cell::new(PlaylistStatus::Succeeded).fg(Color::Green),
                Cell::new(""),
            ]);
        }
        for name in &self.recovered {
            table.add_row(vec![
                Cell::new(name),
                Cell::new(PlaylistStatus::Recovered).fg(Color::Yellow),
                Cell::new(""),
            ]);
        }
        for failed in &self.failed {
            table.add_row(vec![
                Cell::new(&failed.name),
                Cell::new("failed").fg(Color::Red),
                Cell::new(&failed.reason),
            ]);
        }
        for invalid in &self.invalid {
            for raw in invalid.raw_names() {
                table.add_row(vec![
                    Cell::new(raw),
                    Cell::new("invalid name").fg(Color::Red),
                    Cell::new(invalid),
                ]);
            }
        }
        for name in &self.not_attempted {
            table.add_row(vec![
                Cell::new(name),
                Cell::new("not attempted").fg(Color::DarkGrey),
                Cell::new("run cancelled"),
            ]);
        }
        for name in &self.removed {
            table.add_row(vec![
                Cell::new(name),
                Cell::new("removed").fg(Color::Magenta),
                Cell::new(""),
            ]);
        }
        for name in &self.kept {
            table.add_row(vec![
                Cell::new(name),
                Cell::new("kept"),
                Cell::new("not on Spotify anymore"),
            ]);
        }
        for failed in &self.removal_failed {
            table.add_row(vec![
                Cell::new(&failed.name),
                Cell::new("removal failed").fg(Color::Red),
                Cell::new(&failed.reason),
            ]);
        }
        table
    }

    pub fn print(&self) {
        let table = self.table();
        if table.row_iter().next().is_some() {
            println!("{table}");
        }
        let elapsed = self
            .finished_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.started_at)
            .num_seconds();
        println!(
            "{} synced ({} new, {} after a rate limit), {} failed, {} invalid, {} removed in {}s",
            self.synced_count().to_string().green(),
            self.created.len().to_string().cyan(),
            self.recovered.len().to_string().yellow(),
            self.failed.len().to_string().red(),
            self.invalid.len().to_string().red(),
            self.removed.len().to_string().magenta(),
            elapsed
        );
        if self.cancelled {
            println!(
                "{}",
                format!(
                    "Run cancelled, {} playlists were not attempted",
                    self.not_attempted.len()
                )
                .yellow()
            );
        }
    }
}
