use std::collections::{BTreeMap, BTreeSet};

use crate::sanitize::{sanitize, InvalidName};
use crate::spotify::RemotePlaylist;

/// A remote playlist with the folder name it syncs into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRef {
    pub raw_name: String,
    pub sanitized_name: String,
    pub url: String,
    pub spotify_playlist_id: String,
}

/// Remote playlists keyed by sanitized name.
///
/// Playlists whose names sanitize to nothing, or to the same folder as another
/// playlist, are kept out of `playlists` and listed in `invalid`. Folder names
/// claimed by a collision are still reserved so the local folder is never
/// treated as stale.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub playlists: BTreeMap<String, PlaylistRef>,
    pub invalid: Vec<InvalidName>,
    reserved: BTreeSet<String>,
}

impl Catalog {
    pub fn from_remote(remote: Vec<RemotePlaylist>) -> Self {
        let mut by_name: BTreeMap<String, Vec<RemotePlaylist>> = BTreeMap::new();
        let mut invalid = vec![];
        for playlist in remote {
            match sanitize(&playlist.name) {
                Ok(sanitized_name) => by_name.entry(sanitized_name).or_default().push(playlist),
                Err(err) => {
                    log::warn!("Skipping playlist: {err}");
                    invalid.push(err);
                }
            }
        }

        let mut playlists = BTreeMap::new();
        let mut reserved = BTreeSet::new();
        for (sanitized_name, mut group) in by_name {
            if group.len() > 1 {
                let err = InvalidName::Collision {
                    sanitized_name: sanitized_name.clone(),
                    raw_names: group.into_iter().map(|playlist| playlist.name).collect(),
                };
                log::warn!("Skipping playlists: {err}");
                invalid.push(err);
                reserved.insert(sanitized_name);
                continue;
            }
            if let Some(playlist) = group.pop() {
                playlists.insert(
                    sanitized_name.clone(),
                    PlaylistRef {
                        raw_name: playlist.name,
                        sanitized_name,
                        url: playlist.url,
                        spotify_playlist_id: playlist.spotify_playlist_id,
                    },
                );
            }
        }

        Self {
            playlists,
            invalid,
            reserved,
        }
    }

    /// True when `name` belongs to some remote playlist, valid or not.
    pub fn claims(&self, name: &str) -> bool {
        self.playlists.contains_key(name) || self.reserved.contains(name)
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconciliationResult {
    /// Remote playlists with no local folder yet.
    pub to_create: Vec<PlaylistRef>,
    /// Every remote playlist; the downloader is incremental so all of them are resynced.
    pub to_sync: Vec<PlaylistRef>,
    /// Local folders no remote playlist claims.
    pub to_remove: BTreeSet<String>,
}

/// Diffs the remote catalog against the local folder snapshot.
pub fn reconcile(remote: &Catalog, local: &BTreeSet<String>) -> ReconciliationResult {
    let to_sync: Vec<PlaylistRef> = remote.playlists.values().cloned().collect();
    let to_create = to_sync
        .iter()
        .filter(|playlist| !local.contains(&playlist.sanitized_name))
        .cloned()
        .collect();
    let to_remove = local
        .iter()
        .filter(|name| !remote.claims(name))
        .cloned()
        .collect();
    ReconciliationResult {
        to_create,
        to_sync,
        to_remove,
    }
}

/// Keeps the playlists named in `only`, matching raw or sanitized names.
/// Returns the kept playlists and the selections that matched nothing.
pub fn select(to_sync: Vec<PlaylistRef>, only: &[String]) -> (Vec<PlaylistRef>, Vec<String>) {
    let unmatched = only
        .iter()
        .filter(|wanted| {
            !to_sync
                .iter()
                .any(|playlist| playlist.raw_name == **wanted || playlist.sanitized_name == **wanted)
        })
        .cloned()
        .collect();
    let selected = to_sync
        .into_iter()
        .filter(|playlist| {
            only.iter()
                .any(|wanted| playlist.raw_name == *wanted || playlist.sanitized_name == *wanted)
        })
        .collect();
    (selected, unmatched)
}
