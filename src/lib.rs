// dxsbash-config - Settings manager for the DXSBash shell dotfiles
//
// This is the library crate containing the configuration model, store,
// installation detection and apply engine. The binary crate (main.rs)
// provides the command-line entry point.

pub mod cli;
pub mod config;
pub mod logging;
pub mod models;
pub mod services;
pub mod session;
pub mod state;

// Re-export commonly used types for convenience
pub use config::paths::HomeLayout;
pub use config::{ConfigManager, ConfigSource, LoadReport, StoreError};
pub use models::{AppState, DxsConfig, FeatureStatus, ShellType};
pub use services::{ApplyReport, ApplyService, InstallationDetector};
pub use session::{SessionController, SessionError};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
