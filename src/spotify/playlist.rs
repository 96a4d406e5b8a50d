use serde::{Deserialize, Serialize};

/// A playlist as listed by Spotify.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RemotePlaylist {
    pub spotify_playlist_id: String,
    pub name: String,
    pub url: String,
}

impl RemotePlaylist {
    pub fn new(spotify_playlist_id: &str, name: &str, url: &str) -> Self {
        Self {
            spotify_playlist_id: spotify_playlist_id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct TokenResponse {
    pub access_token: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub(crate) struct ExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct ApiPlaylist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct PlaylistPage {
    #[serde(default)]
    pub items: Vec<Option<ApiPlaylist>>,
    pub next: Option<String>,
}

impl From<ApiPlaylist> for RemotePlaylist {
    fn from(api_playlist: ApiPlaylist) -> Self {
        let url = api_playlist
            .external_urls
            .spotify
            .unwrap_or_else(|| format!("https://open.spotify.com/playlist/{}", api_playlist.id));
        Self {
            spotify_playlist_id: api_playlist.id,
            name: api_playlist.name,
            url,
        }
    }
}
