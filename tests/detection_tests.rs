//! Integration tests for installation detection against a fake home
//!
//! These tests verify:
//! - Symlink evidence outranks SHELL, with Fish > Zsh > Bash
//! - Symlinks pointing elsewhere are ignored
//! - Feature availability follows the search path only
//! - Repository validation and version lookup

#![cfg(unix)]

use camino::Utf8PathBuf;
use dxsbash_config::services::detection::{repository_version, validate_installation};
use dxsbash_config::services::{CommandLocator, probe};
use dxsbash_config::{FeatureStatus, HomeLayout, InstallationDetector, ShellType};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

/// Locator that knows a fixed set of commands.
struct FakePath(HashSet<&'static str>);

impl FakePath {
    fn with(commands: &[&'static str]) -> Arc<Self> {
        Arc::new(Self(commands.iter().copied().collect()))
    }
}

impl CommandLocator for FakePath {
    fn locate(&self, command: &str) -> Option<Utf8PathBuf> {
        self.0
            .contains(command)
            .then(|| Utf8PathBuf::from("/usr/bin").join(command))
    }
}

struct Fixture {
    _temp: TempDir,
    layout: HomeLayout,
    repo: Utf8PathBuf,
}

/// A fake home plus a repository checkout outside it whose path does not
/// contain the project marker, so only real root matching can succeed.
fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let base = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
    let home = base.join("home");
    let repo = base.join("checkout");
    fs::create_dir_all(&home).unwrap();
    fs::create_dir_all(&repo).unwrap();
    for name in [".bashrc", ".zshrc", "config.fish", "starship.toml"] {
        fs::write(repo.join(name), format!("# {name}")).unwrap();
    }
    Fixture {
        _temp: temp,
        layout: HomeLayout::new(home),
        repo,
    }
}

fn link(original: &Utf8PathBuf, link: &Utf8PathBuf) {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    probe::create_symlink(original, link).unwrap();
}

#[test]
fn test_fish_wins_over_zsh() {
    let f = fixture();
    link(&f.repo.join(".zshrc"), &f.layout.zshrc());
    link(&f.repo.join("config.fish"), &f.layout.fish_config());

    let detector = InstallationDetector::new(f.repo.clone()).with_shell_env(Some("/bin/bash".into()));
    assert_eq!(detector.detect_active_shell(&f.layout), ShellType::Fish);
}

#[test]
fn test_symlink_outranks_shell_env() {
    let f = fixture();
    link(&f.repo.join(".zshrc"), &f.layout.zshrc());

    let detector = InstallationDetector::new(f.repo.clone()).with_shell_env(Some("/usr/bin/fish".into()));
    assert_eq!(detector.detect_active_shell(&f.layout), ShellType::Zsh);
}

#[test]
fn test_foreign_symlink_falls_back_to_env() {
    let f = fixture();
    let elsewhere = f.layout.home().join("other-dotfiles");
    fs::create_dir_all(&elsewhere).unwrap();
    fs::write(elsewhere.join(".zshrc"), "").unwrap();
    link(&elsewhere.join(".zshrc"), &f.layout.zshrc());

    let detector = InstallationDetector::new(f.repo.clone()).with_shell_env(Some("/usr/bin/fish".into()));
    assert_eq!(detector.detect_active_shell(&f.layout), ShellType::Fish);

    let detector = detector.with_shell_env(None);
    assert_eq!(detector.detect_active_shell(&f.layout), ShellType::Bash);
}

#[test]
fn test_regular_file_is_not_evidence() {
    let f = fixture();
    fs::write(f.layout.zshrc(), "# hand written").unwrap();

    let detector = InstallationDetector::new(f.repo.clone()).with_shell_env(None);
    assert_eq!(detector.detect_active_shell(&f.layout), ShellType::Bash);
}

#[test]
fn test_feature_ceiling_ignores_prior_state() {
    let f = fixture();
    let detector = InstallationDetector::new(f.repo.clone())
        .with_shell_env(None)
        .with_locator(FakePath::with(&["git", "python3", "tar"]));

    let config = detector.detect_config(&f.layout);

    assert_eq!(config.feature_status("git_extended"), Some(FeatureStatus::Enabled));
    assert_eq!(config.feature_status("python"), Some(FeatureStatus::Enabled));
    assert_eq!(config.feature_status("archive_tools"), Some(FeatureStatus::Enabled));
    assert_eq!(config.feature_status("docker"), Some(FeatureStatus::Unavailable));
    assert_eq!(config.feature_status("kubernetes"), Some(FeatureStatus::Unavailable));
    assert!(config.features.values().all(|s| *s != FeatureStatus::Disabled));
    assert_eq!(config.dxsbash_path, f.repo);
}

#[test]
fn test_shell_availability_through_locator() {
    let f = fixture();
    let locator = FakePath::with(&["bash"]);
    let mut config = InstallationDetector::new(f.repo.clone())
        .with_shell_env(None)
        .detect_config(&f.layout);

    assert!(config.is_shell_available(locator.as_ref()));
    config.active_shell = ShellType::Fish;
    assert!(!config.is_shell_available(locator.as_ref()));
    assert_eq!(config.shell_executable(locator.as_ref()), None);
}

#[test]
fn test_validate_installation() {
    let f = fixture();
    let report = validate_installation(&f.repo);
    assert!(report.is_valid());
    assert!(!report.setup_script_exists);

    fs::remove_file(f.repo.join("starship.toml")).unwrap();
    let report = validate_installation(&f.repo);
    assert!(!report.is_valid());
    assert_eq!(report.missing_essentials(), vec!["starship.toml"]);

    assert!(!validate_installation(&f.repo.join("nope")).is_valid());
}

#[test]
fn test_repository_version() {
    let f = fixture();
    assert_eq!(repository_version(&f.repo), None);

    fs::write(f.repo.join("version.txt"), "2.4.1\n").unwrap();
    assert_eq!(repository_version(&f.repo), Some("2.4.1".to_string()));
}
