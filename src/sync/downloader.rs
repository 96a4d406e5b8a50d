use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use error_stack::{IntoReport, Report, ResultExt};
use lazy_regex::regex;
use tokio::process::Command;

use crate::reconcile::PlaylistRef;
use crate::sync::{SyncError, SyncOptions, SyncOutcome, SyncResult};

/// Characters of downloader output kept in reports and logs.
const DIAGNOSTICS_TAIL: usize = 600;

/// Runs one synchronization of one playlist into `dest_root/<sanitized name>`.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn sync_one(
        &self,
        playlist: &PlaylistRef,
        dest_root: &Path,
        options: &SyncOptions,
    ) -> SyncResult<SyncOutcome>;
}

/// Drives the `spotdl` command line tool.
#[derive(Debug, Clone)]
pub struct Spotdl {
    command: Vec<String>,
}

impl Spotdl {
    /// `command` is the program followed by any leading arguments,
    /// e.g. `["python3", "-m", "spotdl"]`.
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn save_file_name(playlist: &PlaylistRef) -> String {
        format!("{}.sync.spotdl", playlist.sanitized_name)
    }

    /// Arguments after the program: `sync <url> --save-file <name>.sync.spotdl`,
    /// plus the premium audio flags when a cookies file is given.
    pub fn build_args(playlist: &PlaylistRef, cookies_file: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "sync".into(),
            playlist.url.clone().into(),
            "--save-file".into(),
            Self::save_file_name(playlist).into(),
        ];
        if let Some(cookies_file) = cookies_file {
            args.push("--cookie-file".into());
            args.push(cookies_file.as_os_str().to_os_string());
            args.extend(["--format", "m4a", "--bitrate", "disable"].map(OsString::from));
        }
        args
    }
}

#[async_trait]
impl Downloader for Spotdl {
    async fn sync_one(
        &self,
        playlist: &PlaylistRef,
        dest_root: &Path,
        options: &SyncOptions,
    ) -> SyncResult<SyncOutcome> {
        let playlist_dir = dest_root.join(&playlist.sanitized_name);
        tokio::fs::create_dir_all(&playlist_dir)
            .await
            .into_report()
            .attach_printable(format!("Failed to create {}", playlist_dir.display()))
            .change_context(SyncError)?;

        let cookies_file = match (&options.cookies_file, options.use_high_quality) {
            (Some(cookies_file), true) if cookies_file.exists() => Some(cookies_file.as_path()),
            (Some(cookies_file), true) => {
                log::warn!(
                    "Cookies file {} does not exist, downloading {} in standard quality",
                    cookies_file.display(),
                    playlist.raw_name
                );
                None
            }
            _ => None,
        };

        let (program, leading_args) = self.command.split_first().ok_or_else(|| {
            Report::new(SyncError).attach_printable("The downloader command is empty")
        })?;
        let mut cmd = Command::new(program);
        cmd.args(leading_args)
            .args(Self::build_args(playlist, cookies_file))
            .current_dir(&playlist_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group: a Ctrl-C in the terminal stops the run between
        // playlists instead of killing spotdl mid-write.
        #[cfg(unix)]
        cmd.process_group(0);

        log::debug!(
            "Running {} in {}",
            self.command.join(" "),
            playlist_dir.display()
        );
        let output = match cmd.output().await {
            Ok(output) => output,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(err)
                    .into_report()
                    .attach_printable(format!(
                        "{program} was not found, is spotdl installed and on the PATH?"
                    ))
                    .change_context(SyncError);
            }
            Err(err) => {
                return Err(err)
                    .into_report()
                    .attach_printable(format!("Failed to run {program}"))
                    .change_context(SyncError);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
            log::debug!("[spotdl] {line}");
        }
        Ok(classify(output.status.success(), output.status.code(), &stdout, &stderr))
    }
}

/// True when downloader output mentions throttling.
pub fn is_rate_limited(text: &str) -> bool {
    regex!(r"(?i)\b429\b|rate[\s_-]?limit|too many requests").is_match(text)
}

/// Classifies a finished downloader process.
pub fn classify(success: bool, exit_code: Option<i32>, stdout: &str, stderr: &str) -> SyncOutcome {
    if success {
        return SyncOutcome::Success;
    }
    let diagnostics = tail(if stderr.trim().is_empty() { stdout } else { stderr });
    if is_rate_limited(stderr) || is_rate_limited(stdout) {
        return SyncOutcome::RateLimited { diagnostics };
    }
    SyncOutcome::Failed {
        exit_code,
        diagnostics,
    }
}

fn tail(text: &str) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    trimmed
        .chars()
        .skip(count.saturating_sub(DIAGNOSTICS_TAIL))
        .collect()
}
