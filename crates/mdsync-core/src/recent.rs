//! Most-recently-used file list, persisted as TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::disk_io::atomic_write_utf8;
use crate::error::PersistenceError;

pub const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecentFile {
    #[serde(default)]
    files: Vec<PathBuf>,
}

/// Move `path` to the front of `list`, dropping duplicates and anything past
/// `limit`.
pub fn push_recent(list: &mut Vec<PathBuf>, path: PathBuf, limit: usize) {
    list.retain(|existing| *existing != path);
    list.insert(0, path);
    list.truncate(limit);
}

#[derive(Clone, Debug)]
pub struct RecentFiles {
    store: PathBuf,
    limit: usize,
}

impl RecentFiles {
    pub fn new(store: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            store: store.into(),
            limit,
        }
    }

    /// `<config_dir>/mdsync/recent_files.toml`.
    pub fn default_location() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mdsync").join("recent_files.toml"))
    }

    pub fn store_path(&self) -> &Path {
        &self.store
    }

    /// The saved list, most recent first. A missing store is an empty list.
    pub fn load(&self) -> Result<Vec<PathBuf>, PersistenceError> {
        let contents = match fs::read_to_string(&self.store) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(PersistenceError::io("read", &self.store, err)),
        };
        let parsed: RecentFile =
            toml::from_str(&contents).map_err(|err| PersistenceError::Recent(err.to_string()))?;

        let mut files = parsed.files;
        files.truncate(self.limit);
        Ok(files)
    }

    /// Put `path` at the front of the saved list and return the new list.
    pub fn record(&self, path: &Path) -> Result<Vec<PathBuf>, PersistenceError> {
        let mut files = self.load().unwrap_or_default();
        push_recent(&mut files, path.to_path_buf(), self.limit);

        if let Some(parent) = self.store.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| PersistenceError::io("create", parent, err))?;
        }
        let contents = toml::to_string_pretty(&RecentFile {
            files: files.clone(),
        })
        .map_err(|err| PersistenceError::Recent(err.to_string()))?;
        atomic_write_utf8(&self.store, &contents)
            .map_err(|err| PersistenceError::io("write", &self.store, err))?;

        Ok(files)
    }
}
