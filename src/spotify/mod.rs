use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod api;
pub mod playlist;

pub use api::SpotifyApi;
pub use playlist::RemotePlaylist;

/// Why the playlist catalog could not be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Spotify rejected the credentials")]
    Auth,

    #[error("Spotify user \"{0}\" was not found")]
    UnknownUser(String),

    #[error("Spotify is rate limiting requests")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Network error while talking to Spotify")]
    TransientNetwork,

    #[error("Unexpected response from Spotify")]
    Decode,
}

impl CatalogError {
    /// Whether a later attempt of the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::RateLimited { .. } | CatalogError::TransientNetwork
        )
    }
}

pub type CatalogResult<T> = error_stack::Result<T, CatalogError>;

/// Source of truth for which playlists exist remotely.
#[async_trait]
pub trait PlaylistCatalog: Send + Sync {
    /// Every playlist owned by `user`, in the order the service lists them.
    async fn fetch_playlists(&self, user: &str) -> CatalogResult<Vec<RemotePlaylist>>;
}
