use crate::config::ConfigSource;
use crate::models::DxsConfig;
use crate::services::apply::{ApplyReport, ApplyStep};

/// Maximum number of applies in flight at once.
///
/// Two concurrent applies would interleave remove-then-link sequences on the
/// same files. Enforced by [`crate::session::SessionController`] with a
/// `tokio::sync::Semaphore`.
pub const MAX_CONCURRENT_APPLIES: usize = 1;

/// Everything a running session holds.
///
/// Wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`]; use
/// its [`read()`](crate::state::StateManager::read) and
/// [`update()`](crate::state::StateManager::update) rather than sharing this
/// directly.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The session's working model. Edits land here before Save.
    pub config: DxsConfig,
    pub config_source: Option<ConfigSource>,

    /// The working model differs from what was last loaded or saved.
    pub is_dirty: bool,

    // Apply progress
    pub is_applying: bool,
    pub current_step: Option<ApplyStep>,
    pub last_apply: Option<ApplyReport>,

    pub status_message: String,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            config: DxsConfig::default(),
            config_source: None,
            is_dirty: false,
            is_applying: false,
            current_step: None,
            last_apply: None,
            status_message: String::new(),
        }
    }
}

impl AppState {
    pub fn with_config(config: DxsConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// True once a configuration has been loaded (or detected) this session.
    pub fn is_loaded(&self) -> bool {
        self.config_source.is_some()
    }

    /// Whether the last apply finished successfully. `None` before any apply.
    pub fn last_apply_succeeded(&self) -> Option<bool> {
        self.last_apply.as_ref().map(ApplyReport::is_success)
    }

    /// Clear apply progress without touching the model.
    pub fn reset_apply_state(&mut self) {
        self.is_applying = false;
        self.current_step = None;
    }
}
