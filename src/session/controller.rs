// Session Controller - Bridges a front end with state, store and apply engine
//
// This module contains the SessionController which coordinates between:
// - StateManager (the session's working model and apply progress)
// - ConfigManager (the persisted document and backups)
// - ApplyService (relinking the live environment)
// - InstallationDetector (fallback when no usable document exists)
//
// Apply runs on a blocking worker so a front end stays responsive. Only one
// apply may be in flight; a second request is rejected, not queued.

use crate::config::{ConfigManager, ConfigSource, LoadReport, StoreError};
use crate::models::{DxsConfig, MAX_CONCURRENT_APPLIES};
use crate::services::apply::{ApplyReport, ApplyService, BackupReport};
use crate::services::detection::{InstallationDetector, InstallationReport, validate_installation};
use crate::state::StateManager;
use camino::Utf8PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;

/// Errors a front end has to surface to the user
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("An apply is already in progress")]
    ApplyInProgress,

    #[error("Apply worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Controller that wires a front end to the session's state and services
///
/// # Example
/// ```ignore
/// let layout = HomeLayout::current();
/// let runtime = tokio::runtime::Runtime::new()?;
/// let session = SessionController::new(
///     Arc::new(StateManager::default()),
///     Arc::new(ConfigManager::new(layout.clone())?),
///     Arc::new(ApplyService::new(layout.clone())),
///     Arc::new(InstallationDetector::new(layout.default_repository_root())),
///     runtime.handle().clone(),
/// );
/// session.load();
/// let report = runtime.block_on(session.apply())?;
/// ```
pub struct SessionController {
    state_manager: Arc<StateManager>,
    config_manager: Arc<ConfigManager>,
    apply_service: Arc<ApplyService>,
    detector: Arc<InstallationDetector>,

    /// One permit: a second apply cannot start while the first holds it
    apply_permits: Arc<Semaphore>,

    /// Send `true` to stop an apply at the next step boundary
    cancel_tx: watch::Sender<bool>,

    tokio_handle: tokio::runtime::Handle,
}

impl SessionController {
    pub fn new(
        state_manager: Arc<StateManager>,
        config_manager: Arc<ConfigManager>,
        apply_service: Arc<ApplyService>,
        detector: Arc<InstallationDetector>,
        tokio_handle: tokio::runtime::Handle,
    ) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        tracing::debug!("Session controller initialized");

        Self {
            state_manager,
            config_manager,
            apply_service,
            detector,
            apply_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_APPLIES)),
            cancel_tx,
            tokio_handle,
        }
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state_manager
    }

    pub fn store(&self) -> &ConfigManager {
        &self.config_manager
    }

    pub fn detector(&self) -> &InstallationDetector {
        &self.detector
    }

    /// Load the persisted configuration (or detect one) into the working model.
    pub fn load(&self) -> LoadReport {
        let report = self.config_manager.load(&self.detector);

        let message = match &report.source {
            ConfigSource::Document => "Configuration loaded".to_string(),
            ConfigSource::Detected { persisted: true } => {
                "No configuration found, detected settings were saved".to_string()
            }
            ConfigSource::Detected { persisted: false } => {
                "No configuration found, detected settings could not be saved".to_string()
            }
            ConfigSource::Recovered { reason } => {
                format!("Configuration unreadable ({reason}), using detected settings")
            }
        };

        self.state_manager.load_config(report.clone());
        self.state_manager.set_status(message);
        report
    }

    /// Reload the persisted document, discarding unsaved edits.
    pub fn refresh(&self) -> LoadReport {
        tracing::info!("Refreshing configuration from disk");
        self.load()
    }

    /// Point the working model at another repository checkout.
    pub fn set_repository_root(&self, root: Utf8PathBuf) {
        tracing::info!("Using repository root {}", root);
        self.state_manager.edit_config(|c| c.dxsbash_path = root);
    }

    /// Persist the working model.
    pub fn save(&self) -> Result<(), SessionError> {
        let config = self.state_manager.config();
        if let Err(e) = self.config_manager.save(&config) {
            tracing::error!("Save failed: {}", e);
            self.state_manager.set_status(format!("Save failed: {e}"));
            return Err(e.into());
        }
        self.state_manager.mark_saved();
        self.state_manager.set_status("Configuration saved");
        Ok(())
    }

    /// Replace the working model with defaults. Nothing is written until saved.
    ///
    /// The repository root stays the one this session was started with.
    pub fn reset(&self) {
        let mut defaults = DxsConfig::for_layout(self.config_manager.layout());
        defaults.dxsbash_path = self.detector.repository_root().to_path_buf();
        self.state_manager.reset_config(defaults);
        self.state_manager
            .set_status("Configuration reset to defaults (not saved)");
    }

    /// Snapshot the live shell, theme and banner files without relinking anything.
    pub fn backup_now(&self) -> BackupReport {
        let report = self.apply_service.backup_live_files(&self.config_manager);

        let config = self.state_manager.config();
        if config.auto_backup {
            self.config_manager
                .prune_snapshots(config.effective_backup_count());
        }

        let message = match &report.dir {
            Some(dir) => format!("Backed up {} file(s) to {}", report.copied.len(), dir),
            None => "Backup failed".to_string(),
        };
        self.state_manager.set_status(message);
        report
    }

    /// Validation issues of the working model.
    pub fn validate(&self) -> Vec<String> {
        self.state_manager.read(|s| s.config.validate())
    }

    /// Presence checks for the working model's repository.
    pub fn installation(&self) -> InstallationReport {
        self.state_manager
            .read(|s| validate_installation(s.config.repository_root()))
    }

    /// Start applying the working model on a blocking worker.
    ///
    /// # Errors
    /// [`SessionError::ApplyInProgress`] if another apply holds the permit.
    pub fn request_apply(&self) -> Result<JoinHandle<ApplyReport>, SessionError> {
        let permit = Arc::clone(&self.apply_permits)
            .try_acquire_owned()
            .map_err(|_| SessionError::ApplyInProgress)?;

        if !self.state_manager.try_start_apply() {
            return Err(SessionError::ApplyInProgress);
        }

        // A cancel left over from an earlier run must not stop this one
        self.cancel_tx.send_replace(false);
        let cancel_rx = self.cancel_tx.subscribe();

        let config = self.state_manager.config();
        for issue in config.validate() {
            tracing::warn!("Applying with validation issue: {}", issue);
        }
        self.state_manager.set_status("Applying configuration...");

        let state = Arc::clone(&self.state_manager);
        let store = Arc::clone(&self.config_manager);
        let service = Arc::clone(&self.apply_service);

        let handle = self.tokio_handle.spawn_blocking(move || {
            let _permit = permit;

            let report = service.apply_with(&config, &store, Some(&cancel_rx), &mut |outcome| {
                state.record_step(outcome);
            });

            let message = if report.cancelled {
                "Apply cancelled".to_string()
            } else if report.is_success() {
                "Configuration applied".to_string()
            } else {
                format!("Apply failed ({} step(s) failed)", report.failures().len())
            };

            state.finish_apply(report.clone(), &config);
            state.set_status(message);
            report
        });

        Ok(handle)
    }

    /// Apply the working model and wait for the result.
    pub async fn apply(&self) -> Result<ApplyReport, SessionError> {
        let handle = self.request_apply()?;
        match handle.await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::error!("Apply worker join error: {}", e);
                self.state_manager.update(|s| s.reset_apply_state());
                Err(e.into())
            }
        }
    }

    /// Ask a running apply to stop before its next step.
    pub fn request_cancel(&self) {
        tracing::info!("Cancellation requested");
        self.cancel_tx.send_replace(true);
        if self.state_manager.read(|s| s.is_applying) {
            self.state_manager.set_status("Cancelling after the current step...");
        }
    }
}
