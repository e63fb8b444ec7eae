#![forbid(unsafe_code)]

//! Synchronization and save-coordination engine for `mdsync`.
//!
//! The markdown held by [`DocumentStore`] is the single source of truth. A
//! rich editing surface is kept in step with it by [`SyncCoordinator`], saves
//! go through [`FlushBus`] so pending surface edits land first, and
//! destructive file operations on [`EditorSession`] are guarded by the
//! [`UnsavedChangesGate`] and the [`ExclusiveActionGuard`].

pub mod config;
pub mod convert;
pub mod disk_io;
pub mod error;
pub mod flush;
pub mod gate;
pub mod guard;
pub mod launch;
mod listeners;
pub mod outline;
pub mod persistence;
pub mod recent;
pub mod schedule;
pub mod session;
pub mod stats;
pub mod store;
pub mod surface;
pub mod sync;

pub use config::EditorConfig;
pub use convert::{HtmlConverter, MarkupConverter};
pub use error::{ConfigError, PersistenceError};
pub use flush::{FlushAck, FlushBus, FlushOutcome};
pub use gate::{Decision, DecisionHandle, Prompt, UnsavedChangesGate};
pub use guard::ExclusiveActionGuard;
pub use launch::{LaunchOptions, parse_launch_options};
pub use listeners::Subscription;
pub use outline::{Heading, extract_headings};
pub use persistence::{FileContent, FilePicker, FsPersistence, NoPicker, Persistence};
pub use recent::RecentFiles;
pub use session::{DroppedFile, EditorSession};
pub use stats::{DocumentStats, compute_stats};
pub use store::{DocumentState, DocumentStore, ViewMode};
pub use surface::{EditingSurface, MemorySurface, SurfaceEvent};
pub use sync::{SyncCoordinator, SyncTimings};

/// Hard cap on file sizes we will load into memory.
pub const MAX_FILE_BYTES: u64 = 64 * 1024 * 1024;
