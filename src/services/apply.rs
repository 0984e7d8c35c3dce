use crate::config::paths::{HomeLayout, repo};
use crate::config::{ConfigManager, StoreError};
use crate::models::{DxsConfig, ShellType};
use crate::services::probe;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::fs;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;

/// Top-level steps of an apply, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyStep {
    Backup,
    ShellSwitch,
    Theme,
    Banner,
    Persist,
}

impl ApplyStep {
    pub const ALL: [ApplyStep; 5] = [
        ApplyStep::Backup,
        ApplyStep::ShellSwitch,
        ApplyStep::Theme,
        ApplyStep::Banner,
        ApplyStep::Persist,
    ];
}

impl fmt::Display for ApplyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApplyStep::Backup => "backup",
            ApplyStep::ShellSwitch => "shell switch",
            ApplyStep::Theme => "prompt theme",
            ApplyStep::Banner => "system banner",
            ApplyStep::Persist => "save",
        })
    }
}

/// How a single step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Skipped(String),
    Failed(String),
}

impl StepStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepStatus::Failed(_))
    }
}

/// Result of one apply step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: ApplyStep,
    pub status: StepStatus,
    pub duration: Duration,
}

/// Aggregate result of [`ApplyService::apply`].
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub steps: Vec<StepOutcome>,
    /// Snapshot directory written by the backup step.
    pub snapshot: Option<Utf8PathBuf>,
    /// Stopped early on request, between two steps.
    pub cancelled: bool,
    pub duration: Duration,
}

impl ApplyReport {
    pub fn outcome(&self, step: ApplyStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|o| o.step == step)
    }

    /// The live environment was switched and the configuration persisted.
    ///
    /// Backup, theme and banner failures do not count against success. A
    /// shell switch skipped because the startup file already is the
    /// repository file counts as switched.
    pub fn is_success(&self) -> bool {
        !self.cancelled
            && self
                .outcome(ApplyStep::ShellSwitch)
                .is_some_and(|o| !o.status.is_failure())
            && self
                .outcome(ApplyStep::Persist)
                .is_some_and(|o| o.status == StepStatus::Succeeded)
    }

    /// Steps that ended in failure.
    pub fn failures(&self) -> Vec<&StepOutcome> {
        self.steps.iter().filter(|o| o.status.is_failure()).collect()
    }

    /// One line per step.
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .steps
            .iter()
            .map(|o| match &o.status {
                StepStatus::Succeeded => format!("{}: ok", o.step),
                StepStatus::Skipped(why) => format!("{}: skipped ({})", o.step, why),
                StepStatus::Failed(why) => format!("{}: FAILED ({})", o.step, why),
            })
            .collect();
        if self.cancelled {
            lines.push("cancelled before completion".to_string());
        }
        lines.join("\n")
    }
}

/// Files copied by a backup pass.
#[derive(Debug, Clone, Default)]
pub struct BackupReport {
    pub dir: Option<Utf8PathBuf>,
    pub copied: Vec<Utf8PathBuf>,
    pub failed: Vec<(Utf8PathBuf, String)>,
}

impl BackupReport {
    pub fn status(&self) -> StepStatus {
        match (&self.dir, self.failed.len()) {
            (None, _) => StepStatus::Failed("could not create backup directory".to_string()),
            (Some(_), 0) => StepStatus::Succeeded,
            (Some(_), n) => StepStatus::Failed(format!("{n} file(s) could not be backed up")),
        }
    }
}

/// Result of [`ApplyService::replace_with_symlink`] when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    /// The source does not exist; nothing was touched.
    SourceMissing,
    /// Source and target are the same file; nothing was touched.
    SameFile,
}

/// Errors that can occur while relinking files
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("Source file does not exist: {0}")]
    SourceMissing(Utf8PathBuf),

    #[error("Cannot resolve repository root {path}: {error}")]
    ResolveRoot {
        path: Utf8PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Link source must be an absolute path: {0}")]
    RelativeSource(Utf8PathBuf),

    #[error("Failed to remove existing {path}: {error}")]
    Remove {
        path: Utf8PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to create directory {path}: {error}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to link {link} -> {original}: {error}")]
    Link {
        link: Utf8PathBuf,
        original: Utf8PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Service that makes the live environment match a [`DxsConfig`].
///
/// Every destructive change is preceded by a snapshot of the files it may
/// replace. Relinking is remove-then-create, so a crash in between leaves the
/// target missing; the snapshot is the recovery path.
#[derive(Debug, Clone)]
pub struct ApplyService {
    layout: HomeLayout,
}

impl ApplyService {
    pub fn new(layout: HomeLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &HomeLayout {
        &self.layout
    }

    /// Apply `config` and persist it through `store`.
    pub fn apply(&self, config: &DxsConfig, store: &ConfigManager) -> ApplyReport {
        self.apply_with(config, store, None, &mut |_| {})
    }

    /// Apply with an optional cancellation signal and a per-step observer.
    ///
    /// Cancellation is only honoured between steps. A failed shell switch stops
    /// the run before anything else changes and the configuration is not saved.
    pub fn apply_with(
        &self,
        config: &DxsConfig,
        store: &ConfigManager,
        cancel: Option<&watch::Receiver<bool>>,
        on_step: &mut dyn FnMut(&StepOutcome),
    ) -> ApplyReport {
        let start = Instant::now();
        let root = config.repository_root();
        let mut report = ApplyReport::default();

        tracing::info!(
            "Applying configuration: shell={}, theme={}, fastfetch={}, root={}",
            config.active_shell,
            config.starship_theme,
            config.fastfetch_enabled,
            root
        );

        for step in ApplyStep::ALL {
            if cancel.is_some_and(|rx| *rx.borrow()) {
                tracing::warn!("Apply cancelled before {}", step);
                report.cancelled = true;
                break;
            }

            let step_start = Instant::now();
            let status = match step {
                ApplyStep::Backup => {
                    let backup = self.backup_live_files(store);
                    report.snapshot = backup.dir.clone();
                    if config.auto_backup {
                        store.prune_snapshots(config.effective_backup_count());
                    }
                    backup.status()
                }
                ApplyStep::ShellSwitch => self.switch_shell(root, config.active_shell),
                ApplyStep::Theme => self.update_theme(root),
                ApplyStep::Banner => self.update_banner(root, config.fastfetch_enabled),
                ApplyStep::Persist => match store.save(config) {
                    Ok(()) => StepStatus::Succeeded,
                    Err(e) => StepStatus::Failed(e.to_string()),
                },
            };

            match &status {
                StepStatus::Failed(why) => tracing::warn!("Apply step {} failed: {}", step, why),
                StepStatus::Skipped(why) => tracing::info!("Apply step {} skipped: {}", step, why),
                StepStatus::Succeeded => tracing::debug!("Apply step {} done", step),
            }

            let outcome = StepOutcome {
                step,
                status,
                duration: step_start.elapsed(),
            };
            on_step(&outcome);
            let abort = step == ApplyStep::ShellSwitch && outcome.status.is_failure();
            report.steps.push(outcome);

            if abort {
                tracing::error!("Shell switch failed, leaving remaining steps and config untouched");
                break;
            }
        }

        report.duration = start.elapsed();
        tracing::info!(
            "Apply finished in {:.2}s: success={}",
            report.duration.as_secs_f32(),
            report.is_success()
        );
        report
    }

    /// Copy every live shell, helper, theme and banner file into a new
    /// snapshot directory, keeping each file's path below home. Files that do
    /// not exist are skipped; copy failures are recorded and do not stop the
    /// pass.
    pub fn backup_live_files(&self, store: &ConfigManager) -> BackupReport {
        let mut report = BackupReport::default();

        let dir = match store.create_snapshot_dir() {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!("Backup creation failed: {}", e);
                return report;
            }
        };

        for file in self.layout.live_files() {
            if !file.exists() {
                continue;
            }
            // Keep the path below home so same-named files cannot collide
            let Ok(relative) = file.strip_prefix(self.layout.home()) else {
                continue;
            };
            let destination = dir.join(relative);
            let copied = match destination.parent() {
                Some(parent) => fs::create_dir_all(parent).and_then(|()| fs::copy(&file, &destination)),
                None => fs::copy(&file, &destination),
            };
            match copied {
                Ok(_) => report.copied.push(file),
                Err(e) => {
                    tracing::warn!("Failed to backup {}: {}", file, e);
                    report.failed.push((file, e.to_string()));
                }
            }
        }

        tracing::info!("Backed up {} file(s) to {}", report.copied.len(), dir);
        report.dir = Some(dir);
        report
    }

    /// Point the startup file of `shell` (and its helpers) into `root`.
    ///
    /// Other shells' files are left alone.
    pub fn switch_shell(&self, root: &Utf8Path, shell: ShellType) -> StepStatus {
        let root = match absolute_root(root) {
            Ok(root) => root,
            Err(e) => return StepStatus::Failed(e.to_string()),
        };
        let source = root.join(repo::startup_file(shell));
        let target = self.layout.startup_file(shell);

        match self.replace_with_symlink(&source, &target) {
            Ok(LinkOutcome::Linked) => {}
            Ok(LinkOutcome::SourceMissing) => {
                return StepStatus::Failed(ApplyError::SourceMissing(source).to_string());
            }
            Ok(LinkOutcome::SameFile) => {
                return StepStatus::Skipped(format!("{target} already is the repository file"));
            }
            Err(e) => return StepStatus::Failed(e.to_string()),
        }

        let mut helpers = vec![(
            root.join(repo::help_file(shell)),
            self.layout.help_file(shell),
        )];
        if shell == ShellType::Bash {
            helpers.push((root.join(repo::BASH_ALIASES), self.layout.bash_aliases()));
        }

        for (source, target) in helpers.into_iter().filter(|(source, _)| source.exists()) {
            if let Err(e) = self.replace_with_symlink(&source, &target) {
                tracing::warn!("Failed to link helper file: {}", e);
            }
        }

        tracing::info!("Switched active shell to {}", shell);
        StepStatus::Succeeded
    }

    /// Link the prompt theme file from `root`, if the repository has one.
    ///
    /// Only the file is linked; the theme name in the configuration is not
    /// written into it.
    pub fn update_theme(&self, root: &Utf8Path) -> StepStatus {
        let root = match absolute_root(root) {
            Ok(root) => root,
            Err(e) => return StepStatus::Failed(e.to_string()),
        };
        let source = root.join(repo::STARSHIP);
        if !source.exists() {
            return StepStatus::Skipped(format!("{} not found in repository", repo::STARSHIP));
        }
        link_status(self.replace_with_symlink(&source, &self.layout.starship_config()))
    }

    /// Link or unlink the system banner configuration.
    ///
    /// When disabled only a symlink is removed; a real file is kept.
    pub fn update_banner(&self, root: &Utf8Path, enabled: bool) -> StepStatus {
        let target = self.layout.fastfetch_config();

        if enabled {
            let root = match absolute_root(root) {
                Ok(root) => root,
                Err(e) => return StepStatus::Failed(e.to_string()),
            };
            let source = root.join(repo::FASTFETCH);
            if !source.exists() {
                return StepStatus::Skipped(format!("{} not found in repository", repo::FASTFETCH));
            }
            return link_status(self.replace_with_symlink(&source, &target));
        }

        if !probe::is_symlink(&target) {
            if probe::entry_exists(&target) {
                return StepStatus::Skipped("user file left in place".to_string());
            }
            return StepStatus::Skipped("nothing linked".to_string());
        }

        match fs::remove_file(&target) {
            Ok(()) => {
                tracing::info!("Removed banner link {}", target);
                StepStatus::Succeeded
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StepStatus::Succeeded,
            Err(e) => StepStatus::Failed(
                ApplyError::Remove {
                    path: target,
                    error: e,
                }
                .to_string(),
            ),
        }
    }

    /// Replace `target` with a symlink to `source`.
    ///
    /// `source` must be absolute, since the link text is resolved from the
    /// link's own directory. A missing source leaves `target` untouched so no
    /// dangling link is ever created, and so does a target that is the source
    /// itself. Otherwise whatever occupies `target` is removed first and its
    /// parent directory is created when needed.
    pub fn replace_with_symlink(
        &self,
        source: &Utf8Path,
        target: &Utf8Path,
    ) -> Result<LinkOutcome, ApplyError> {
        if !source.is_absolute() {
            return Err(ApplyError::RelativeSource(source.to_path_buf()));
        }
        if !source.exists() {
            tracing::warn!("Source file doesn't exist: {}", source);
            return Ok(LinkOutcome::SourceMissing);
        }
        if removing_target_loses_source(source, target) {
            tracing::warn!("{} and {} are the same file, leaving it in place", source, target);
            return Ok(LinkOutcome::SameFile);
        }

        if probe::entry_exists(target) {
            probe::remove_entry(target).map_err(|error| ApplyError::Remove {
                path: target.to_path_buf(),
                error,
            })?;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|error| ApplyError::CreateDir {
                path: parent.to_path_buf(),
                error,
            })?;
        }

        probe::create_symlink(source, target).map_err(|error| ApplyError::Link {
            link: target.to_path_buf(),
            original: source.to_path_buf(),
            error,
        })?;

        tracing::debug!("Linked {} -> {}", target, source);
        Ok(LinkOutcome::Linked)
    }
}

/// `root` joined onto the working directory when relative.
fn absolute_root(root: &Utf8Path) -> Result<Utf8PathBuf, ApplyError> {
    if root.is_absolute() {
        return Ok(root.to_path_buf());
    }
    let resolve_error = |error: std::io::Error| ApplyError::ResolveRoot {
        path: root.to_path_buf(),
        error,
    };
    let absolute = std::path::absolute(root).map_err(resolve_error)?;
    let absolute = Utf8PathBuf::try_from(absolute).map_err(|e| resolve_error(e.into_io_error()))?;
    tracing::debug!("Resolved relative repository root {} to {}", root, absolute);
    Ok(absolute)
}

/// True when `target` and `source` resolve to the same file and `source`
/// would not survive removing `target`.
///
/// A target that is a symlink onto a regular source is the normal
/// already-applied state and is safe to relink.
fn removing_target_loses_source(source: &Utf8Path, target: &Utf8Path) -> bool {
    if probe::is_symlink(target) && !probe::is_symlink(source) {
        return false;
    }
    match (source.canonicalize_utf8(), target.canonicalize_utf8()) {
        (Ok(source), Ok(target)) => source == target,
        _ => false,
    }
}

fn link_status(result: Result<LinkOutcome, ApplyError>) -> StepStatus {
    match result {
        Ok(LinkOutcome::Linked) => StepStatus::Succeeded,
        Ok(LinkOutcome::SourceMissing) => StepStatus::Skipped("source missing".to_string()),
        Ok(LinkOutcome::SameFile) => {
            StepStatus::Skipped("already the repository file".to_string())
        }
        Err(e) => StepStatus::Failed(e.to_string()),
    }
}
