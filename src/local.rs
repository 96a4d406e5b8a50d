use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use error_stack::{IntoReport, ResultExt};
use unicode_normalization::UnicodeNormalization;

use crate::sanitize::is_sanitized;

#[derive(Debug)]
pub struct LocalStateError;

impl fmt::Display for LocalStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Local state error")
    }
}

impl std::error::Error for LocalStateError {}

pub type LocalStateResult<T> = error_stack::Result<T, LocalStateError>;

/// Snapshot of the playlist folders under `sync_root`.
///
/// Only immediate subdirectories whose names could be sanitized playlist names
/// are returned; files, symlinks, hidden folders and anything else are ignored.
/// A missing `sync_root` is a first run and yields an empty set.
pub fn list_local_entries(sync_root: &Path) -> LocalStateResult<BTreeSet<String>> {
    let read_dir = match fs::read_dir(sync_root) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            log::info!(
                "Sync folder {} does not exist yet, nothing is synced locally",
                sync_root.display()
            );
            return Ok(BTreeSet::new());
        }
        Err(err) => {
            return Err(err)
                .into_report()
                .attach_printable(format!("Failed to list {}", sync_root.display()))
                .change_context(LocalStateError);
        }
    };

    let mut entries = BTreeSet::new();
    for entry in read_dir {
        let entry = entry
            .into_report()
            .attach_printable(format!("Failed to read an entry of {}", sync_root.display()))
            .change_context(LocalStateError)?;
        let file_type = entry
            .file_type()
            .into_report()
            .change_context(LocalStateError)?;
        if !file_type.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(on_disk) => {
                let name: String = on_disk.nfc().collect();
                if !is_sanitized(&name) {
                    if on_disk.starts_with('.') {
                        log::debug!("Ignoring hidden folder {on_disk:?}");
                    } else {
                        log::info!("Ignoring folder {on_disk:?}, it is not a playlist folder");
                    }
                    continue;
                }
                if name != on_disk {
                    log::info!("Folder {on_disk:?} is stored decomposed, reading it as {name:?}");
                }
                entries.insert(name);
            }
            Err(name) => log::debug!("Ignoring folder {name:?}, its name is not valid UTF-8"),
        }
    }
    Ok(entries)
}
