pub mod paths;

use crate::models::DxsConfig;
use crate::services::detection::InstallationDetector;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use paths::HomeLayout;
use regex::Regex;
use serde_yaml_ng::Value;
use std::fs;
use std::sync::LazyLock;
use thiserror::Error;

/// Number of configuration-document backups kept after each save.
pub const DOCUMENT_BACKUP_RETENTION: usize = 5;

/// Timestamp format shared by document backups and snapshot directories.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

const DOCUMENT_BACKUP_PREFIX: &str = "tui_config_";
const SNAPSHOT_PREFIX: &str = "shell_config_";

static DOCUMENT_BACKUP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^tui_config_\d{8}_\d{6}(_\d{6})?(_\d+)?\.yaml$").expect("Invalid backup regex")
});

static SNAPSHOT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^shell_config_\d{8}_\d{6}(_\d{6})?(_\d+)?$").expect("Invalid snapshot regex")
});

/// Errors raised by the configuration store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        source: serde_yaml_ng::Error,
    },

    #[error("Configuration document is empty: {0}")]
    EmptyDocument(Utf8PathBuf),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] serde_yaml_ng::Error),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to back up {path}: {source}")]
    Backup {
        path: Utf8PathBuf,
        source: std::io::Error,
    },
}

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from the persisted document.
    Document,
    /// No document existed; detected and persisted as the new baseline.
    Detected { persisted: bool },
    /// The document could not be used; detected instead.
    Recovered { reason: String },
}

/// Result of [`ConfigManager::load`].
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub config: DxsConfig,
    pub source: ConfigSource,
}

/// Configuration store: the single load/save point for `tui-config.yaml`.
///
/// Owns the document location and its backup history. It holds no model;
/// whoever calls [`load`](Self::load) owns the result and hands it back to
/// [`save`](Self::save).
#[derive(Debug, Clone)]
pub struct ConfigManager {
    layout: HomeLayout,
    config_dir: Utf8PathBuf,
    config_file: Utf8PathBuf,
    backup_dir: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a store for `layout`, creating the state and backup directories.
    ///
    /// # Errors
    /// Failing to create either directory is fatal for the session.
    pub fn new(layout: HomeLayout) -> Result<Self, StoreError> {
        let manager = Self {
            config_dir: layout.state_dir(),
            config_file: layout.config_file(),
            backup_dir: layout.backup_dir(),
            layout,
        };

        for dir in [&manager.config_dir, &manager.backup_dir] {
            fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }

        Ok(manager)
    }

    pub fn layout(&self) -> &HomeLayout {
        &self.layout
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    pub fn backup_dir(&self) -> &Utf8Path {
        &self.backup_dir
    }

    pub fn document_exists(&self) -> bool {
        self.config_file.exists()
    }

    /// Load the configuration, falling back to detection.
    ///
    /// Never fails: an unreadable or corrupt document is logged and replaced by
    /// a detected configuration. When no document exists the detected
    /// configuration is saved right away so later loads read it back.
    pub fn load(&self, detector: &InstallationDetector) -> LoadReport {
        if !self.document_exists() {
            tracing::info!(
                "No configuration at {}, detecting from installation",
                self.config_file
            );
            let config = detector.detect_config(&self.layout);
            let persisted = match self.save(&config) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Failed to save initial config: {}", e);
                    false
                }
            };
            return LoadReport {
                config,
                source: ConfigSource::Detected { persisted },
            };
        }

        match self.read_document() {
            Ok(config) => {
                tracing::info!("Loaded config from {}", self.config_file);
                LoadReport {
                    config,
                    source: ConfigSource::Document,
                }
            }
            Err(e) => {
                tracing::warn!("Failed to load config file: {}", e);
                LoadReport {
                    config: detector.detect_config(&self.layout),
                    source: ConfigSource::Recovered {
                        reason: e.to_string(),
                    },
                }
            }
        }
    }

    /// Read and parse the persisted document without any fallback.
    pub fn read_document(&self) -> Result<DxsConfig, StoreError> {
        let contents = fs::read_to_string(&self.config_file).map_err(|source| StoreError::Read {
            path: self.config_file.clone(),
            source,
        })?;

        let value: Value = serde_yaml_ng::from_str(&contents).map_err(|source| StoreError::Parse {
            path: self.config_file.clone(),
            source,
        })?;

        if value.is_null() {
            return Err(StoreError::EmptyDocument(self.config_file.clone()));
        }

        Ok(DxsConfig::from_value(&value, DxsConfig::for_layout(&self.layout)))
    }

    /// Persist `config`, backing up the previous document first.
    ///
    /// After writing, document backups are pruned to the
    /// [`DOCUMENT_BACKUP_RETENTION`] most recent.
    pub fn save(&self, config: &DxsConfig) -> Result<(), StoreError> {
        let yaml_string = config.to_document()?;

        if self.document_exists() {
            match self.backup_document() {
                Ok(backup) => tracing::debug!("Backed up previous config to {}", backup),
                Err(e) => tracing::warn!("Config backup failed, saving anyway: {}", e),
            }
        }

        fs::write(&self.config_file, yaml_string).map_err(|source| StoreError::Write {
            path: self.config_file.clone(),
            source,
        })?;

        tracing::info!("Saved config to {}", self.config_file);

        let removed = self.prune_document_backups(DOCUMENT_BACKUP_RETENTION);
        if removed > 0 {
            tracing::debug!("Pruned {} old config backups", removed);
        }

        Ok(())
    }

    /// Copy the current document into a timestamped backup file.
    pub fn backup_document(&self) -> Result<Utf8PathBuf, StoreError> {
        let backup = unique_backup_path(&self.backup_dir, DOCUMENT_BACKUP_PREFIX, ".yaml");
        fs::copy(&self.config_file, &backup).map_err(|source| StoreError::Backup {
            path: self.config_file.clone(),
            source,
        })?;
        Ok(backup)
    }

    /// Document backups, oldest first.
    pub fn list_document_backups(&self) -> Vec<Utf8PathBuf> {
        self.list_backup_entries(&DOCUMENT_BACKUP_PATTERN)
    }

    /// Snapshot directories written by apply or explicit backups, oldest first.
    pub fn list_snapshots(&self) -> Vec<Utf8PathBuf> {
        self.list_backup_entries(&SNAPSHOT_PATTERN)
    }

    /// Create a fresh, empty snapshot directory.
    pub fn create_snapshot_dir(&self) -> Result<Utf8PathBuf, StoreError> {
        let dir = unique_backup_path(&self.backup_dir, SNAPSHOT_PREFIX, "");
        fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    /// Delete all but the `keep` most recent document backups.
    ///
    /// Returns how many were removed. Individual failures are logged and skipped.
    pub fn prune_document_backups(&self, keep: usize) -> usize {
        prune_oldest(self.list_document_backups(), keep)
    }

    /// Delete all but the `keep` most recent snapshot directories.
    pub fn prune_snapshots(&self, keep: usize) -> usize {
        prune_oldest(self.list_snapshots(), keep)
    }

    fn list_backup_entries(&self, pattern: &Regex) -> Vec<Utf8PathBuf> {
        let entries = match self.backup_dir.read_dir_utf8() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to read backup directory {}: {}", self.backup_dir, e);
                return Vec::new();
            }
        };

        let mut found: Vec<Utf8PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| pattern.is_match(entry.file_name()))
            .map(|entry| entry.into_path())
            .collect();

        // Timestamps are zero padded, so name order is age order
        found.sort();
        found
    }
}

/// A backup path under `dir` that does not exist yet.
fn unique_backup_path(dir: &Utf8Path, prefix: &str, suffix: &str) -> Utf8PathBuf {
    let stamp = Local::now().format(BACKUP_TIMESTAMP_FORMAT).to_string();
    let candidate = dir.join(format!("{prefix}{stamp}{suffix}"));
    if !candidate.exists() {
        return candidate;
    }

    (1..)
        .map(|n| dir.join(format!("{prefix}{stamp}_{n}{suffix}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

fn prune_oldest(entries: Vec<Utf8PathBuf>, keep: usize) -> usize {
    if entries.len() <= keep {
        return 0;
    }

    let excess = entries.len() - keep;
    entries
        .into_iter()
        .take(excess)
        .filter(|old| {
            let result = if old.is_dir() {
                fs::remove_dir_all(old)
            } else {
                fs::remove_file(old)
            };
            match result {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Failed to remove old backup {}: {}", old, e);
                    false
                }
            }
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShellType;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let home = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(HomeLayout::new(home)).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_create_config_manager() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert!(manager.config_dir().is_dir());
        assert!(manager.backup_dir().is_dir());
        assert!(!manager.document_exists());
    }

    #[test]
    fn test_save_then_read_document() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut config = DxsConfig::for_layout(manager.layout());
        config.active_shell = ShellType::Zsh;
        manager.save(&config).unwrap();

        let loaded = manager.read_document().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_first_save_makes_no_backup() {
        let (manager, _temp_dir) = create_test_config_manager();
        let config = DxsConfig::for_layout(manager.layout());

        manager.save(&config).unwrap();
        assert!(manager.list_document_backups().is_empty());

        manager.save(&config).unwrap();
        assert_eq!(manager.list_document_backups().len(), 1);
    }

    #[test]
    fn test_empty_document_is_an_error() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.config_file(), "").unwrap();
        assert!(matches!(
            manager.read_document(),
            Err(StoreError::EmptyDocument(_))
        ));
    }

    #[test]
    fn test_backup_names_match_pattern() {
        let (manager, _temp_dir) = create_test_config_manager();
        let dir = manager.create_snapshot_dir().unwrap();
        assert!(SNAPSHOT_PATTERN.is_match(dir.file_name().unwrap()));

        assert!(DOCUMENT_BACKUP_PATTERN.is_match("tui_config_20250101_120000.yaml"));
        assert!(DOCUMENT_BACKUP_PATTERN.is_match("tui_config_20250101_120000_000123_2.yaml"));
        assert!(!DOCUMENT_BACKUP_PATTERN.is_match("tui-config.yaml"));
    }

    #[test]
    fn test_unique_backup_path_avoids_collisions() {
        let (manager, _temp_dir) = create_test_config_manager();
        let first = unique_backup_path(manager.backup_dir(), "x_", "");
        fs::create_dir(&first).unwrap();
        let second = unique_backup_path(manager.backup_dir(), "x_", "");
        assert_ne!(first, second);
    }

    #[test]
    fn test_prune_snapshots() {
        let (manager, _temp_dir) = create_test_config_manager();
        for _ in 0..4 {
            manager.create_snapshot_dir().unwrap();
        }
        let before = manager.list_snapshots();
        assert_eq!(manager.prune_snapshots(2), 2);

        let after = manager.list_snapshots();
        assert_eq!(after, before[2..].to_vec());
    }
}
