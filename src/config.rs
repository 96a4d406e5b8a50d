use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use error_stack::{IntoReport, ResultExt};
use serde::{Deserialize, Serialize};

/// `AppConfig` holds static values shared by the engine and the CLI.
pub struct AppConfig;

impl AppConfig {
    /// Folder under `~/Music` used when no sync folder is configured.
    pub const APP_NAME: &'static str = "Spoti-Sync";
    /// Folder under the platform config directory holding the settings document.
    pub const CONFIG_DIR_NAME: &'static str = "spoti-sync";
    pub const SETTINGS_FILE_NAME: &'static str = "settings.json";
    /// Line based `KEY=VALUE` file used before the JSON document existed.
    pub const LEGACY_ENV_FILE_NAME: &'static str = ".env";
    pub const DEFAULT_DOWNLOADER: &'static str = "spotdl";
}

#[derive(Debug)]
pub struct SettingsError;

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Settings error")
    }
}

impl std::error::Error for SettingsError {}

pub type SettingsResult<T> = error_stack::Result<T, SettingsError>;

/// The persisted configuration document.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub user: String,
    pub sync_folder: PathBuf,
    pub yt_premium_enabled: bool,
    pub yt_cookies_file: String,
    /// Seconds to wait between two playlists.
    pub playlist_delay: u64,
    /// Seconds to wait before the single retry of a rate limited playlist.
    pub rate_limit_wait: u64,
    pub remove: bool,
    /// Program and leading arguments used to run spotdl.
    pub spotdl_command: Vec<String>,
}

/// Credential keys written by older setups. Only used when the primary key is empty.
#[derive(Debug, Default, Deserialize)]
struct LegacyCredentialKeys {
    #[serde(rename = "SPOTIPY_CLIENT_ID", default)]
    client_id: String,
    #[serde(rename = "SPOTIPY_CLIENT_SECRET", default)]
    client_secret: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_id: "".to_string(),
            client_secret: "".to_string(),
            user: "".to_string(),
            sync_folder: default_sync_folder(),
            yt_premium_enabled: false,
            yt_cookies_file: "".to_string(),
            playlist_delay: 0,
            rate_limit_wait: 0,
            remove: false,
            spotdl_command: vec![AppConfig::DEFAULT_DOWNLOADER.to_string()],
        }
    }
}

fn default_sync_folder() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("Music"))
        .unwrap_or_default()
        .join(AppConfig::APP_NAME)
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return "".to_string();
    }
    let visible: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{visible}")
}

impl Settings {
    /// Required keys that are still empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = vec![];
        if self.client_id.trim().is_empty() {
            missing.push("CLIENT_ID");
        }
        if self.client_secret.trim().is_empty() {
            missing.push("CLIENT_SECRET");
        }
        if self.user.trim().is_empty() {
            missing.push("USER");
        }
        missing
    }

    /// The sync folder with a leading `~` expanded.
    pub fn sync_root(&self) -> PathBuf {
        if self.sync_folder.as_os_str().is_empty() {
            return default_sync_folder();
        }
        match (self.sync_folder.strip_prefix("~"), dirs::home_dir()) {
            (Ok(rest), Some(home)) => home.join(rest),
            _ => self.sync_folder.clone(),
        }
    }

    /// Cookies file to pass to spotdl, when premium downloads are enabled.
    pub fn cookies_file(&self) -> Option<PathBuf> {
        if !self.yt_premium_enabled || self.yt_cookies_file.trim().is_empty() {
            return None;
        }
        Some(PathBuf::from(self.yt_cookies_file.trim()))
    }

    /// Copy safe to print: secrets keep only their last characters.
    pub fn masked(&self) -> Self {
        Self {
            client_secret: mask(&self.client_secret),
            ..self.clone()
        }
    }

    fn with_legacy_credentials(mut self, legacy: LegacyCredentialKeys) -> Self {
        if self.client_id.trim().is_empty() {
            self.client_id = legacy.client_id.trim().to_string();
        }
        if self.client_secret.trim().is_empty() {
            self.client_secret = legacy.client_secret.trim().to_string();
        }
        self
    }

    fn from_legacy_env(values: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            values
                .get(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let flag = |key: &str| get(key).map_or(false, |value| value.eq_ignore_ascii_case("true"));
        let seconds = |key: &str| {
            get(key)
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(0)
        };
        let defaults = Self::default();
        Self {
            client_id: get("CLIENT_ID")
                .or_else(|| get("SPOTIPY_CLIENT_ID"))
                .unwrap_or_default(),
            client_secret: get("CLIENT_SECRET")
                .or_else(|| get("SPOTIPY_CLIENT_SECRET"))
                .unwrap_or_default(),
            user: get("USER").unwrap_or_default(),
            sync_folder: get("SYNC_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.sync_folder),
            yt_premium_enabled: flag("YT_PREMIUM_ENABLED"),
            yt_cookies_file: get("YT_COOKIES_FILE").unwrap_or_default(),
            playlist_delay: seconds("PLAYLIST_DELAY"),
            rate_limit_wait: seconds("RATE_LIMIT_WAIT"),
            remove: flag("REMOVE"),
            spotdl_command: defaults.spotdl_command,
        }
    }
}

/// Where the settings document (and the legacy file it may migrate from) live.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    settings_path: PathBuf,
    legacy_env_path: PathBuf,
}

impl SettingsStore {
    pub fn new(settings_path: PathBuf, legacy_env_path: PathBuf) -> Self {
        Self {
            settings_path,
            legacy_env_path,
        }
    }

    /// `<config dir>/spoti-sync/settings.json`, migrating from `./.env`.
    pub fn default_settings_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .ok_or(SettingsError)
            .into_report()
            .attach_printable("Failed to resolve the configuration directory")
            .map(|config_dir| {
                config_dir
                    .join(AppConfig::CONFIG_DIR_NAME)
                    .join(AppConfig::SETTINGS_FILE_NAME)
            })
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    pub fn settings_file_exists(&self) -> bool {
        self.settings_path.exists()
    }

    /// Reads the document, migrating the legacy file first if needed.
    /// Returns defaults when neither exists.
    pub fn load(&self) -> SettingsResult<Settings> {
        self.migrate_from_env()?;
        if !self.settings_file_exists() {
            log::debug!(
                "No settings at {}, using defaults",
                self.settings_path.display()
            );
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(&self.settings_path)
            .into_report()
            .attach_printable(format!(
                "Failed to read settings file at {}",
                self.settings_path.display()
            ))
            .change_context(SettingsError)?;
        let parse_error = || {
            format!(
                "Failed to parse {}. Ensure it is valid JSON.",
                self.settings_path.display()
            )
        };
        let settings: Settings = serde_json::from_str(&content)
            .into_report()
            .attach_printable_lazy(parse_error)
            .change_context(SettingsError)?;
        let legacy: LegacyCredentialKeys = serde_json::from_str(&content)
            .into_report()
            .attach_printable_lazy(parse_error)
            .change_context(SettingsError)?;
        Ok(settings.with_legacy_credentials(legacy))
    }

    pub fn save(&self, settings: &Settings) -> SettingsResult<()> {
        let serialized = serde_json::to_string_pretty(settings)
            .into_report()
            .attach_printable("Failed to serialize the settings to JSON")
            .change_context(SettingsError)?;
        if let Some(folder_path) = self.settings_path.parent() {
            if !folder_path.as_os_str().is_empty() && !folder_path.exists() {
                fs::create_dir_all(folder_path)
                    .into_report()
                    .attach_printable(format!(
                        "Failed to create directory at {}",
                        folder_path.display()
                    ))
                    .change_context(SettingsError)?;
            }
        }
        fs::write(&self.settings_path, serialized)
            .into_report()
            .attach_printable(format!(
                "Failed to write settings file at {}",
                self.settings_path.display()
            ))
            .change_context(SettingsError)?;
        Ok(())
    }

    /// Converts the legacy `KEY=VALUE` file into the settings document.
    ///
    /// Only runs when the document does not exist yet. Returns whether a
    /// migration happened.
    pub fn migrate_from_env(&self) -> SettingsResult<bool> {
        if self.settings_file_exists() || !self.legacy_env_path.exists() {
            return Ok(false);
        }
        let mut values = HashMap::new();
        let entries = dotenvy::from_path_iter(&self.legacy_env_path)
            .into_report()
            .attach_printable(format!(
                "Failed to open legacy settings at {}",
                self.legacy_env_path.display()
            ))
            .change_context(SettingsError)?;
        for entry in entries {
            let (key, value) = entry
                .into_report()
                .attach_printable(format!(
                    "Failed to parse legacy settings at {}",
                    self.legacy_env_path.display()
                ))
                .change_context(SettingsError)?;
            values.insert(key, value);
        }
        if values.is_empty() {
            log::warn!(
                "Legacy settings at {} are empty, nothing to migrate",
                self.legacy_env_path.display()
            );
            return Ok(false);
        }
        let settings = Settings::from_legacy_env(&values);
        self.save(&settings)?;
        log::info!(
            "Migrated settings from {} to {}",
            self.legacy_env_path.display(),
            self.settings_path.display()
        );
        Ok(true)
    }
}
