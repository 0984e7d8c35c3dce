// State management module
//
// StateManager wraps AppState with thread-safe access using Arc<RwLock<T>>
// and emits change events for whatever front end is attached.

use crate::config::{ConfigSource, LoadReport};
use crate::models::{AppState, CustomAlias, DxsConfig, FeatureError, ShellType};
use crate::services::apply::{ApplyReport, ApplyStep, StepOutcome, StepStatus};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These let a front end redraw without polling the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A configuration was loaded, detected or recovered
    ConfigLoaded { source: ConfigSource },

    /// One field of the working model changed
    ConfigChanged { field: &'static str },

    /// The working model was written to disk
    ConfigSaved,

    /// An apply has started
    ApplyStarted,

    /// An apply step finished
    StepCompleted { step: ApplyStep, status: StepStatus },

    /// The apply has finished (or was cancelled)
    ApplyFinished { success: bool },

    /// The status line changed
    StatusChanged { message: String },

    /// The working model was reset to defaults
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Guards the single apply-in-flight flag
///
/// All model mutations of a session go through here, which gives the
/// configuration a single writer even when apply runs on a worker thread.
pub struct StateManager {
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a StateManager around `config`, with a broadcast buffer of 100 events
    pub fn new(config: DxsConfig) -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::with_config(config))),
            state_tx,
        }
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, AppState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, AppState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, change: StateChange) -> StateChange {
        // Nobody listening is fine
        let _ = self.state_tx.send(change.clone());
        change
    }

    /// Clone of the whole state, safe to use without holding locks.
    pub fn snapshot(&self) -> AppState {
        self.read_lock().clone()
    }

    /// Clone of the working model.
    pub fn config(&self) -> DxsConfig {
        self.read_lock().config.clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let shell = state_manager.read(|state| state.config.active_shell);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.read_lock();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed and emits the events
    ///
    /// Returns the events that were emitted.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.write_lock();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = detect_changes(&old_state, &state);
        for change in &changes {
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    // Configuration lifecycle

    /// Install a freshly loaded configuration as the working model.
    pub fn load_config(&self, report: LoadReport) -> Vec<StateChange> {
        {
            let mut state = self.write_lock();
            state.config = report.config;
            state.config_source = Some(report.source.clone());
            state.is_dirty = false;
        }
        tracing::debug!("Working model replaced ({:?})", report.source);
        vec![self.emit(StateChange::ConfigLoaded {
            source: report.source,
        })]
    }

    /// Mutate the working model and mark it dirty if anything changed.
    pub fn edit_config<F>(&self, edit: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut DxsConfig),
    {
        self.update(|state| {
            let before = state.config.clone();
            edit(&mut state.config);
            if state.config != before {
                state.is_dirty = true;
            }
        })
    }

    /// Record that the working model now matches the persisted document.
    pub fn mark_saved(&self) -> Vec<StateChange> {
        self.write_lock().is_dirty = false;
        vec![self.emit(StateChange::ConfigSaved)]
    }

    /// Replace the working model with `defaults`. Not persisted until saved.
    pub fn reset_config(&self, defaults: DxsConfig) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.config = defaults;
            state.is_dirty = true;
        });
        changes.push(self.emit(StateChange::StateReset));
        changes
    }

    // Field-by-field edits

    pub fn set_active_shell(&self, shell: ShellType) -> Vec<StateChange> {
        self.edit_config(|c| c.active_shell = shell)
    }

    /// Toggle a catalogue feature; unknown or unavailable features are refused.
    pub fn set_feature(&self, key: &str, enabled: bool) -> Result<Vec<StateChange>, FeatureError> {
        let mut result = Ok(());
        let changes = self.edit_config(|c| result = c.set_feature(key, enabled));
        result.map(|()| changes)
    }

    pub fn set_starship_theme(&self, theme: String) -> Vec<StateChange> {
        self.edit_config(|c| c.starship_theme = theme)
    }

    pub fn set_terminal_font(&self, font: String) -> Vec<StateChange> {
        self.edit_config(|c| c.terminal_font = font)
    }

    pub fn set_color_scheme(&self, scheme: String) -> Vec<StateChange> {
        self.edit_config(|c| c.color_scheme = scheme)
    }

    pub fn set_fastfetch_enabled(&self, enabled: bool) -> Vec<StateChange> {
        self.edit_config(|c| c.fastfetch_enabled = enabled)
    }

    pub fn set_auto_backup(&self, enabled: bool) -> Vec<StateChange> {
        self.edit_config(|c| c.auto_backup = enabled)
    }

    /// Out-of-range counts are stored as given and reported by validation.
    pub fn set_backup_count(&self, count: i64) -> Vec<StateChange> {
        self.edit_config(|c| c.backup_count = count)
    }

    pub fn add_alias(&self, alias: CustomAlias) -> Vec<StateChange> {
        self.edit_config(|c| c.upsert_alias(alias))
    }

    /// Remove an alias by name. Returns whether one existed.
    pub fn remove_alias(&self, name: &str) -> (bool, Vec<StateChange>) {
        let mut removed = false;
        let changes = self.edit_config(|c| removed = c.remove_alias(name));
        (removed, changes)
    }

    // Apply progress

    /// Claim the apply-in-flight flag. Returns false if an apply is already running.
    pub fn try_start_apply(&self) -> bool {
        {
            let mut state = self.write_lock();
            if state.is_applying {
                return false;
            }
            state.is_applying = true;
            state.current_step = None;
        }
        self.emit(StateChange::ApplyStarted);
        true
    }

    /// Record a finished apply step.
    pub fn record_step(&self, outcome: &StepOutcome) -> Vec<StateChange> {
        self.write_lock().current_step = Some(outcome.step);
        vec![self.emit(StateChange::StepCompleted {
            step: outcome.step,
            status: outcome.status.clone(),
        })]
    }

    /// Release the apply flag and keep the report.
    ///
    /// A successful apply persisted `applied`; the model is clean only if it
    /// was not edited while the apply ran.
    pub fn finish_apply(&self, report: ApplyReport, applied: &DxsConfig) -> Vec<StateChange> {
        self.update(|state| {
            if report.is_success() && state.config == *applied {
                state.is_dirty = false;
            }
            state.last_apply = Some(report);
            state.reset_apply_state();
        })
    }

    pub fn set_status(&self, message: impl Into<String>) -> Vec<StateChange> {
        let message = message.into();
        self.update(|state| state.status_message = message)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new(DxsConfig::default())
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

/// Work out which events an update produced.
fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
    let mut changes: Vec<StateChange> = changed_fields(&old.config, &new.config)
        .into_iter()
        .map(|field| StateChange::ConfigChanged { field })
        .collect();

    if old.is_applying != new.is_applying {
        if new.is_applying {
            changes.push(StateChange::ApplyStarted);
        } else {
            changes.push(StateChange::ApplyFinished {
                success: new.last_apply_succeeded().unwrap_or(false),
            });
        }
    }

    if old.status_message != new.status_message {
        changes.push(StateChange::StatusChanged {
            message: new.status_message.clone(),
        });
    }

    changes
}

/// Names of the model fields that differ, in document order.
fn changed_fields(old: &DxsConfig, new: &DxsConfig) -> Vec<&'static str> {
    let checks = [
        ("active_shell", old.active_shell != new.active_shell),
        ("features", old.features != new.features),
        ("starship_theme", old.starship_theme != new.starship_theme),
        ("terminal_font", old.terminal_font != new.terminal_font),
        ("color_scheme", old.color_scheme != new.color_scheme),
        ("fastfetch_enabled", old.fastfetch_enabled != new.fastfetch_enabled),
        ("custom_aliases", old.custom_aliases != new.custom_aliases),
        ("dxsbash_path", old.dxsbash_path != new.dxsbash_path),
        ("config_path", old.config_path != new.config_path),
        ("auto_backup", old.auto_backup != new.auto_backup),
        ("backup_count", old.backup_count != new.backup_count),
    ];
    checks
        .into_iter()
        .filter(|(_, changed)| *changed)
        .map(|(field, _)| field)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::paths::HomeLayout;
    use crate::models::FeatureStatus;
    use std::time::Duration;

    fn manager() -> StateManager {
        StateManager::new(DxsConfig::for_layout(&HomeLayout::new("/home/u")))
    }

    #[test]
    fn test_new_state_manager() {
        let state = manager().snapshot();
        assert!(!state.is_applying);
        assert!(!state.is_dirty);
        assert!(!state.is_loaded());
    }

    #[test]
    fn test_edit_marks_dirty_and_names_field() {
        let manager = manager();
        let changes = manager.set_active_shell(ShellType::Fish);

        assert_eq!(changes, vec![StateChange::ConfigChanged { field: "active_shell" }]);
        assert!(manager.read(|s| s.is_dirty));
    }

    #[test]
    fn test_noop_edit_emits_nothing() {
        let manager = manager();
        let changes = manager.set_active_shell(ShellType::Bash);
        assert!(changes.is_empty());
        assert!(!manager.read(|s| s.is_dirty));
    }

    #[test]
    fn test_set_feature_refuses_unavailable() {
        let manager = manager();
        manager.edit_config(|c| {
            c.features.insert("docker".to_string(), FeatureStatus::Unavailable);
        });

        assert!(manager.set_feature("docker", true).is_err());
        assert!(manager.set_feature("nope", true).is_err());

        let changes = manager.set_feature("nodejs", true).unwrap();
        assert_eq!(changes, vec![StateChange::ConfigChanged { field: "features" }]);
    }

    #[test]
    fn test_load_config_clears_dirty() {
        let manager = manager();
        manager.set_terminal_font("Hack".to_string());

        let config = DxsConfig::for_layout(&HomeLayout::new("/home/u"));
        let changes = manager.load_config(LoadReport {
            config,
            source: ConfigSource::Document,
        });

        assert_eq!(changes, vec![StateChange::ConfigLoaded { source: ConfigSource::Document }]);
        let state = manager.snapshot();
        assert!(!state.is_dirty);
        assert_eq!(state.config.terminal_font, "FiraCode Nerd Font");
    }

    #[test]
    fn test_apply_flag_is_single_flight() {
        let manager = manager();
        assert!(manager.try_start_apply());
        assert!(!manager.try_start_apply());

        let changes = manager.finish_apply(ApplyReport::default(), &manager.config());
        assert_eq!(changes, vec![StateChange::ApplyFinished { success: false }]);
        assert!(manager.try_start_apply());
    }

    fn successful_report() -> ApplyReport {
        let outcome = |step| StepOutcome {
            step,
            status: StepStatus::Succeeded,
            duration: Duration::ZERO,
        };
        ApplyReport {
            steps: ApplyStep::ALL.into_iter().map(outcome).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_finish_apply_clears_dirty_for_applied_model() {
        let manager = manager();
        manager.set_starship_theme("nord".to_string());
        let applied = manager.config();
        manager.try_start_apply();

        manager.finish_apply(successful_report(), &applied);
        assert!(!manager.read(|s| s.is_dirty));
    }

    #[test]
    fn test_edit_during_apply_stays_dirty() {
        let manager = manager();
        let applied = manager.config();
        manager.try_start_apply();
        manager.set_terminal_font("Hack".to_string());

        manager.finish_apply(successful_report(), &applied);

        let state = manager.snapshot();
        assert!(state.is_dirty);
        assert!(!state.is_applying);
        assert_eq!(state.config.terminal_font, "Hack");
    }

    #[test]
    fn test_record_step() {
        let manager = manager();
        manager.try_start_apply();
        let outcome = StepOutcome {
            step: ApplyStep::Backup,
            status: StepStatus::Succeeded,
            duration: Duration::ZERO,
        };

        manager.record_step(&outcome);
        assert_eq!(manager.read(|s| s.current_step), Some(ApplyStep::Backup));
    }

    #[test]
    fn test_reset_emits_state_reset() {
        let manager = manager();
        manager.set_backup_count(9);

        let changes = manager.reset_config(DxsConfig::for_layout(&HomeLayout::new("/home/u")));
        assert!(changes.contains(&StateChange::ConfigChanged { field: "backup_count" }));
        assert_eq!(changes.last(), Some(&StateChange::StateReset));
        assert_eq!(manager.read(|s| s.config.backup_count), 5);
    }

    #[test]
    fn test_subscribe_to_changes() {
        let manager = manager();
        let mut rx = manager.subscribe();

        manager.set_status("Saved");

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event,
            StateChange::StatusChanged {
                message: "Saved".to_string()
            }
        );
    }

    #[test]
    fn test_clone_shares_state() {
        let manager1 = manager();
        let manager2 = manager1.clone();

        manager1.set_fastfetch_enabled(false);
        assert!(!manager2.config().fastfetch_enabled);
    }
}
