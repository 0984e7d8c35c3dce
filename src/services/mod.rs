//! Services module - the filesystem-facing logic behind the configuration.
//!
//! The services have no dependency on any front end and take every location
//! they touch from a [`HomeLayout`](crate::config::paths::HomeLayout) or a
//! [`DxsConfig`](crate::models::DxsConfig), so tests can point them at a
//! temporary home.
//!
//! # Components
//!
//! - [`probe`]: stateless existence / symlink / search-path helpers
//! - [`InstallationDetector`]: rebuilds a configuration from symlinks, `SHELL`
//!   and installed commands when no usable document exists
//! - [`ApplyService`]: backs up the live files, then relinks them into the
//!   repository so the environment matches the configuration
//!
//! # Usage Example
//!
//! ```ignore
//! use dxsbash_config::services::ApplyService;
//!
//! let service = ApplyService::new(layout.clone());
//! let report = service.apply(&config, &store);
//! if !report.is_success() {
//!     eprintln!("{}", report.summary());
//! }
//! ```

pub mod apply;
pub mod detection;
pub mod probe;

pub use apply::{
    ApplyError, ApplyReport, ApplyService, ApplyStep, BackupReport, LinkOutcome, StepOutcome,
    StepStatus,
};
pub use detection::{
    InstallationDetector, InstallationReport, repository_version, shell_from_env,
    validate_installation,
};
pub use probe::{CommandLocator, SystemPath};
