use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::disk_io::atomic_write_utf8;
use crate::error::ConfigError;
use crate::recent::DEFAULT_RECENT_LIMIT;
use crate::store::ViewMode;
use crate::sync::SyncTimings;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub autosave: AutosaveConfig,

    #[serde(default)]
    pub view: ViewConfig,

    #[serde(default)]
    pub recent: RecentConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiet period before a surface edit is committed
    #[serde(default = "default_commit_debounce_ms")]
    pub commit_debounce_ms: u64,

    /// Commit delay after the surface loses focus (0 = immediately)
    #[serde(default)]
    pub focus_loss_debounce_ms: u64,

    /// How long a save waits for pending edits to be flushed
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            commit_debounce_ms: default_commit_debounce_ms(),
            focus_loss_debounce_ms: 0,
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

impl SyncConfig {
    pub const fn timings(&self) -> SyncTimings {
        SyncTimings {
            commit_debounce: Duration::from_millis(self.commit_debounce_ms),
            focus_loss_debounce: Duration::from_millis(self.focus_loss_debounce_ms),
        }
    }

    pub const fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

fn default_commit_debounce_ms() -> u64 {
    450
}

fn default_flush_timeout_ms() -> u64 {
    180
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_stats_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_stats_debounce_ms(),
        }
    }
}

fn default_stats_debounce_ms() -> u64 {
    120
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutosaveConfig {
    #[serde(default = "default_autosave_enabled")]
    pub enabled: bool,

    #[serde(default = "default_autosave_interval_secs")]
    pub interval_secs: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: default_autosave_enabled(),
            interval_secs: default_autosave_interval_secs(),
        }
    }
}

impl AutosaveConfig {
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_autosave_enabled() -> bool {
    true
}

fn default_autosave_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(default)]
    pub default_mode: ViewMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentConfig {
    #[serde(default = "default_recent_limit")]
    pub limit: usize,
}

impl Default for RecentConfig {
    fn default() -> Self {
        Self {
            limit: default_recent_limit(),
        }
    }
}

fn default_recent_limit() -> usize {
    DEFAULT_RECENT_LIMIT
}

impl EditorConfig {
    /// Get the platform-specific config file path
    /// - macOS: ~/Library/Application Support/mdsync/config.toml
    /// - Linux: ~/.config/mdsync/config.toml
    /// - Windows: %APPDATA%/mdsync/config.toml
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mdsync").join("config.toml"))
    }

    /// Load the user's config, or defaults if there is none yet.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let contents = toml::to_string_pretty(self)?;
        atomic_write_utf8(path, &contents).map_err(write_err)
    }

    pub fn stats_debounce(&self) -> Duration {
        Duration::from_millis(self.stats.debounce_ms)
    }
}
