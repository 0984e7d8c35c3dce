//! Installation detection: rebuild a plausible configuration from the live system.
//!
//! Used when no configuration document exists yet, or when the persisted one
//! cannot be read. Evidence is taken from:
//! - symlinks in the well-known startup file locations that point into the
//!   dotfiles repository
//! - the `SHELL` environment variable, as a fallback
//! - the executable search path, for feature availability
//!
//! # Examples
//!
//! ```ignore
//! use dxsbash_config::config::paths::HomeLayout;
//! use dxsbash_config::services::detection::InstallationDetector;
//!
//! let layout = HomeLayout::current();
//! let detector = InstallationDetector::new(layout.default_repository_root());
//! let shell = detector.detect_active_shell(&layout);
//! ```

use crate::config::paths::{HomeLayout, PROJECT_MARKER, repo};
use crate::models::{DxsConfig, FEATURE_CATALOGUE, FeatureStatus, ShellType};
use crate::services::probe::{self, CommandLocator, SystemPath};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;
use std::sync::Arc;

/// Scan order for symlink evidence. The first match wins.
pub const SHELL_DETECTION_ORDER: [ShellType; 3] = [ShellType::Fish, ShellType::Zsh, ShellType::Bash];

/// Shells reported by [`InstallationDetector::installed_shells`].
pub const KNOWN_SHELLS: &[&str] = &["bash", "zsh", "fish", "dash", "ksh"];

/// Reconstructs a [`DxsConfig`] purely by probing the environment.
#[derive(Clone)]
pub struct InstallationDetector {
    repository_root: Utf8PathBuf,
    locator: Arc<dyn CommandLocator>,
    shell_env: Option<String>,
}

impl std::fmt::Debug for InstallationDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationDetector")
            .field("repository_root", &self.repository_root)
            .field("shell_env", &self.shell_env)
            .finish_non_exhaustive()
    }
}

impl InstallationDetector {
    /// Detector for `repository_root` using the real `PATH` and the current
    /// value of `SHELL`.
    pub fn new<P: Into<Utf8PathBuf>>(repository_root: P) -> Self {
        Self {
            repository_root: repository_root.into(),
            locator: Arc::new(SystemPath),
            shell_env: std::env::var("SHELL").ok(),
        }
    }

    /// Replace the command locator.
    pub fn with_locator(mut self, locator: Arc<dyn CommandLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Replace the captured `SHELL` value.
    pub fn with_shell_env(mut self, shell: Option<String>) -> Self {
        self.shell_env = shell;
        self
    }

    pub fn repository_root(&self) -> &Utf8Path {
        &self.repository_root
    }

    pub fn locator(&self) -> &dyn CommandLocator {
        self.locator.as_ref()
    }

    /// Build a configuration from defaults plus everything detectable.
    ///
    /// Prior persisted state is never consulted.
    pub fn detect_config(&self, layout: &HomeLayout) -> DxsConfig {
        let mut config = DxsConfig::for_layout(layout);
        config.active_shell = self.detect_active_shell(layout);
        config.features.extend(self.detect_features());
        config.dxsbash_path = self.repository_root.clone();

        tracing::info!(
            "Detected configuration: shell={}, enabled features={}",
            config.active_shell,
            config.enabled_features().len()
        );
        config
    }

    /// Work out which shell is currently wired to the dotfiles.
    ///
    /// Symlink evidence outranks `SHELL`; among symlinks Fish beats Zsh beats
    /// Bash.
    pub fn detect_active_shell(&self, layout: &HomeLayout) -> ShellType {
        for shell in SHELL_DETECTION_ORDER {
            let startup = layout.startup_file(shell);
            if self.links_into_repository(&startup) {
                tracing::info!("Detected active shell from symlink {}: {}", startup, shell);
                return shell;
            }
        }

        let shell = shell_from_env(self.shell_env.as_deref());
        tracing::debug!(
            "No startup file links into the repository, using SHELL={:?} -> {}",
            self.shell_env,
            shell
        );
        shell
    }

    /// Availability of every catalogue feature.
    ///
    /// A feature is `Enabled` when at least one of its commands is on the search
    /// path and `Unavailable` otherwise. Never yields `Disabled`.
    pub fn detect_features(&self) -> IndexMap<String, FeatureStatus> {
        FEATURE_CATALOGUE
            .iter()
            .map(|feature| {
                let available = feature
                    .commands
                    .iter()
                    .any(|cmd| probe::command_exists(self.locator.as_ref(), cmd));
                let status = if available {
                    FeatureStatus::Enabled
                } else {
                    FeatureStatus::Unavailable
                };
                tracing::debug!("Feature {}: {}", feature.key, status);
                (feature.key.to_string(), status)
            })
            .collect()
    }

    /// Shells from [`KNOWN_SHELLS`] that resolve on the search path.
    pub fn installed_shells(&self) -> Vec<&'static str> {
        KNOWN_SHELLS
            .iter()
            .copied()
            .filter(|shell| probe::command_exists(self.locator.as_ref(), shell))
            .collect()
    }

    /// True if `path` is a symlink whose target lies in the repository.
    fn links_into_repository(&self, path: &Utf8Path) -> bool {
        let Some(target) = probe::resolve_link(path) else {
            return false;
        };

        let target = target.as_str();
        if target.contains(PROJECT_MARKER) {
            return true;
        }
        if self.repository_root.as_str().is_empty() {
            return false;
        }
        if target.contains(self.repository_root.as_str()) {
            return true;
        }

        // The root itself may sit behind a symlink (e.g. /tmp -> /private/tmp)
        self.repository_root
            .canonicalize_utf8()
            .is_ok_and(|root| target.contains(root.as_str()))
    }
}

/// Map a `SHELL` value onto a supported shell. Anything unrecognized is Bash.
pub fn shell_from_env(shell: Option<&str>) -> ShellType {
    match shell {
        Some(s) if s.contains("zsh") => ShellType::Zsh,
        Some(s) if s.contains("fish") => ShellType::Fish,
        _ => ShellType::Bash,
    }
}

/// Presence checks for a dotfiles repository checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallationReport {
    pub root: Utf8PathBuf,
    pub directory_exists: bool,
    pub bashrc_exists: bool,
    pub zshrc_exists: bool,
    pub fish_config_exists: bool,
    pub starship_config_exists: bool,
    pub setup_script_exists: bool,
    pub updater_script_exists: bool,
}

impl InstallationReport {
    /// The directory exists and carries all four essential files.
    pub fn is_valid(&self) -> bool {
        self.directory_exists
            && self.bashrc_exists
            && self.zshrc_exists
            && self.fish_config_exists
            && self.starship_config_exists
    }

    /// Names of missing essential files.
    pub fn missing_essentials(&self) -> Vec<&'static str> {
        [
            (self.bashrc_exists, repo::startup_file(ShellType::Bash)),
            (self.zshrc_exists, repo::startup_file(ShellType::Zsh)),
            (self.fish_config_exists, repo::startup_file(ShellType::Fish)),
            (self.starship_config_exists, repo::STARSHIP),
        ]
        .into_iter()
        .filter(|(present, _)| !present)
        .map(|(_, name)| name)
        .collect()
    }
}

/// Inspect a repository checkout.
pub fn validate_installation(root: &Utf8Path) -> InstallationReport {
    let has = |name: &str| root.join(name).exists();
    InstallationReport {
        root: root.to_path_buf(),
        directory_exists: root.is_dir(),
        bashrc_exists: has(repo::startup_file(ShellType::Bash)),
        zshrc_exists: has(repo::startup_file(ShellType::Zsh)),
        fish_config_exists: has(repo::startup_file(ShellType::Fish)),
        starship_config_exists: has(repo::STARSHIP),
        setup_script_exists: has(repo::SETUP_SCRIPT),
        updater_script_exists: has(repo::UPDATER_SCRIPT),
    }
}

/// Repository version from `version.txt`, if present.
pub fn repository_version(root: &Utf8Path) -> Option<String> {
    let contents = fs::read_to_string(root.join(repo::VERSION)).ok()?;
    let version = contents.trim();
    (!version.is_empty()).then(|| version.to_string())
}
