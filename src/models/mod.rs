//! Data models for the settings manager.
//!
//! - [`DxsConfig`]: the persisted user configuration (shell, features, appearance, backup policy)
//! - [`AppState`]: what a running session holds around that configuration
//! - [`FEATURE_CATALOGUE`]: the fixed set of optional feature modules and the commands backing them
//!
//! State updates go through [`StateManager`](crate::state::StateManager); the
//! models themselves never touch the filesystem.

pub mod app_state;
pub mod config;

pub use app_state::{AppState, MAX_CONCURRENT_APPLIES};
pub use config::{
    AliasEntry, CustomAlias, DxsConfig, FEATURE_CATALOGUE, FeatureError, FeatureSpec,
    FeatureStatus, MAX_BACKUP_COUNT, MIN_BACKUP_COUNT, ShellType, TagError, default_features,
    feature_spec,
};
