//! File operations as the session sees them: pick, read, write, remember.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::disk_io::{self, atomic_write_utf8, read_document, resolve_path};
use crate::error::PersistenceError;
use crate::recent::RecentFiles;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileContent {
    pub path: PathBuf,
    pub content: String,
}

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Let the user pick a file and read it. `None` when the pick was
    /// cancelled.
    async fn open(&self) -> Result<Option<FileContent>, PersistenceError>;

    async fn open_path(&self, path: &Path) -> Result<FileContent, PersistenceError>;

    async fn save(&self, path: &Path, content: &str) -> Result<(), PersistenceError>;

    /// Let the user pick a destination and write to it. `None` when the pick
    /// was cancelled.
    async fn save_as(&self, content: &str) -> Result<Option<PathBuf>, PersistenceError>;

    async fn recent_files(&self) -> Result<Vec<PathBuf>, PersistenceError>;
}

/// Platform open/save dialogs.
#[async_trait]
pub trait FilePicker: Send + Sync {
    async fn pick_open(&self) -> Option<PathBuf>;
    async fn pick_save(&self) -> Option<PathBuf>;
}

/// Picker for headless use: every pick is cancelled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPicker;

#[async_trait]
impl FilePicker for NoPicker {
    async fn pick_open(&self) -> Option<PathBuf> {
        None
    }

    async fn pick_save(&self) -> Option<PathBuf> {
        None
    }
}

/// [`Persistence`] on the local filesystem.
#[derive(Debug)]
pub struct FsPersistence<P> {
    picker: P,
    recent: Option<RecentFiles>,
}

impl<P: FilePicker> FsPersistence<P> {
    pub const fn new(picker: P) -> Self {
        Self {
            picker,
            recent: None,
        }
    }

    /// Record opened and saved-as paths in `recent`.
    #[must_use]
    pub fn with_recent(mut self, recent: RecentFiles) -> Self {
        self.recent = Some(recent);
        self
    }

    async fn remember(&self, path: &Path) {
        let Some(recent) = self.recent.clone() else {
            return;
        };
        let path = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || recent.record(&path)).await;
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => warn!("failed to update recent files: {err}"),
            Err(err) => warn!("recent files task failed: {err}"),
        }
    }
}

async fn blocking<T, F>(action: &'static str, path: &Path, task: F) -> Result<T, PersistenceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PersistenceError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| PersistenceError::io(action, path, std::io::Error::other(err)))?
}

#[async_trait]
impl<P: FilePicker> Persistence for FsPersistence<P> {
    async fn open(&self) -> Result<Option<FileContent>, PersistenceError> {
        let Some(path) = self.picker.pick_open().await else {
            return Ok(None);
        };
        self.open_path(&path).await.map(Some)
    }

    async fn open_path(&self, path: &Path) -> Result<FileContent, PersistenceError> {
        let path = resolve_path(path).map_err(|err| PersistenceError::io("resolve", path, err))?;

        let read_path = path.clone();
        let content = blocking("read", &path, move || read_document(&read_path)).await?;

        info!(path = %path.display(), bytes = content.len(), "opened file");
        self.remember(&path).await;
        Ok(FileContent { path, content })
    }

    async fn save(&self, path: &Path, content: &str) -> Result<(), PersistenceError> {
        let write_path = path.to_path_buf();
        let contents = content.to_owned();
        blocking("write", path, move || {
            atomic_write_utf8(&write_path, &contents)
                .map_err(|err| PersistenceError::io("write", &write_path, err))
        })
        .await?;

        info!(path = %path.display(), bytes = content.len(), "saved file");
        Ok(())
    }

    async fn save_as(&self, content: &str) -> Result<Option<PathBuf>, PersistenceError> {
        let Some(path) = self.picker.pick_save().await else {
            return Ok(None);
        };
        let path = if disk_io::is_markdown_file(&path) {
            path
        } else {
            path.with_extension("md")
        };

        self.save(&path, content).await?;
        self.remember(&path).await;
        Ok(Some(path))
    }

    async fn recent_files(&self) -> Result<Vec<PathBuf>, PersistenceError> {
        let Some(recent) = self.recent.clone() else {
            return Ok(Vec::new());
        };
        let store = recent.store_path().to_path_buf();
        blocking("read", &store, move || recent.load()).await
    }
}
