use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use error_stack::{AttachmentKind, FrameKind, Report};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;

pub mod downloader;
pub mod report;
pub mod retry;

pub use downloader::{Downloader, Spotdl};
pub use report::{FailedPlaylist, RunReport};
pub use retry::{sync_with_retry, PlaylistStatus};

#[derive(Debug)]
pub struct SyncError;

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Sync error")
    }
}

impl std::error::Error for SyncError {}

pub type SyncResult<T> = error_stack::Result<T, SyncError>;

/// Per-run knobs for the downloader and the retry controller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncOptions {
    pub use_high_quality: bool,
    pub cookies_file: Option<PathBuf>,
    pub playlist_delay: Duration,
    pub rate_limit_wait: Duration,
}

impl SyncOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            use_high_quality: settings.yt_premium_enabled,
            cookies_file: settings.cookies_file(),
            playlist_delay: Duration::from_secs(settings.playlist_delay),
            rate_limit_wait: Duration::from_secs(settings.rate_limit_wait),
        }
    }
}

/// What a single downloader invocation reported.
#[derive(Debug, Clone, PartialEq, Eq, strum_macros::Display)]
pub enum SyncOutcome {
    Success,
    RateLimited { diagnostics: String },
    Failed {
        exit_code: Option<i32>,
        diagnostics: String,
    },
}

/// One line summary of a report: every context and printable attachment,
/// outermost first.
pub(crate) fn describe_report(report: &Report<SyncError>) -> String {
    report
        .frames()
        .filter_map(|frame| match frame.kind() {
            FrameKind::Context(context) => Some(context.to_string()),
            FrameKind::Attachment(AttachmentKind::Printable(printable)) => {
                Some(printable.to_string())
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(": ")
}

/// Sleeps for `duration` unless `cancel` fires first. Returns false when cancelled.
pub(crate) async fn wait_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_settings() {
        let settings = Settings {
            yt_premium_enabled: true,
            yt_cookies_file: "/tmp/cookies.txt".to_string(),
            playlist_delay: 3,
            rate_limit_wait: 60,
            ..Settings::default()
        };
        let options = SyncOptions::from_settings(&settings);
        assert!(options.use_high_quality);
        assert_eq!(options.cookies_file, Some(PathBuf::from("/tmp/cookies.txt")));
        assert_eq!(options.playlist_delay, Duration::from_secs(3));
        assert_eq!(options.rate_limit_wait, Duration::from_secs(60));
    }

    #[test]
    fn describes_every_frame() {
        let report = Report::new(SyncError).attach_printable("spotdl was not found");
        assert_eq!(describe_report(&report), "spotdl was not found: Sync error");
    }

    #[tokio::test]
    async fn waiting_stops_on_cancel() {
        let cancel = CancellationToken::new();
        assert!(wait_or_cancel(&cancel, Duration::ZERO).await);
        cancel.cancel();
        assert!(!wait_or_cancel(&cancel, Duration::from_secs(3600)).await);
        assert!(!wait_or_cancel(&cancel, Duration::ZERO).await);
    }
}
