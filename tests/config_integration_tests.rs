//! Integration tests for ConfigManager and the configuration document
//!
//! These tests verify:
//! - First-run detection and persistence
//! - Document backups and their retention
//! - Permissive parsing of hand-edited documents
//! - Recovery from corrupt documents
//! - Serialize/deserialize round trip for arbitrary valid models

use camino::Utf8PathBuf;
use dxsbash_config::config::DOCUMENT_BACKUP_RETENTION;
use dxsbash_config::models::{CustomAlias, FEATURE_CATALOGUE};
use dxsbash_config::services::CommandLocator;
use dxsbash_config::{
    ConfigManager, ConfigSource, DxsConfig, FeatureStatus, HomeLayout, InstallationDetector,
    ShellType,
};
use proptest::prelude::*;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

/// Locator for a machine with nothing installed.
struct NothingInstalled;

impl CommandLocator for NothingInstalled {
    fn locate(&self, _command: &str) -> Option<Utf8PathBuf> {
        None
    }
}

fn create_test_home() -> (TempDir, HomeLayout) {
    let temp_dir = TempDir::new().unwrap();
    let home = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, HomeLayout::new(home))
}

fn detector_for(layout: &HomeLayout, shell: Option<&str>) -> InstallationDetector {
    InstallationDetector::new(layout.default_repository_root())
        .with_locator(Arc::new(NothingInstalled))
        .with_shell_env(shell.map(str::to_string))
}

#[test]
fn test_fresh_environment_detects_and_persists() {
    let (_temp_dir, layout) = create_test_home();
    let manager = ConfigManager::new(layout.clone()).unwrap();
    let detector = detector_for(&layout, Some("/bin/zsh"));

    let first = manager.load(&detector);
    assert_eq!(first.source, ConfigSource::Detected { persisted: true });
    assert_eq!(first.config.active_shell, ShellType::Zsh);
    assert!(manager.document_exists());

    // A different SHELL must not matter any more: the document wins
    let second = manager.load(&detector_for(&layout, Some("/usr/bin/fish")));
    assert_eq!(second.source, ConfigSource::Document);
    assert_eq!(second.config, first.config);
}

#[test]
fn test_detected_features_are_ceilings() {
    let (_temp_dir, layout) = create_test_home();
    let manager = ConfigManager::new(layout.clone()).unwrap();

    let report = manager.load(&detector_for(&layout, None));

    assert_eq!(report.config.unavailable_features().len(), FEATURE_CATALOGUE.len());
    assert!(report.config.enabled_features().is_empty());
}

#[test]
fn test_backup_retention_keeps_most_recent() {
    let (_temp_dir, layout) = create_test_home();
    let manager = ConfigManager::new(layout.clone()).unwrap();
    let mut config = DxsConfig::for_layout(&layout);

    let mut created = Vec::new();
    for i in 0..9 {
        config.backup_count = i + 1;
        manager.save(&config).unwrap();
        if let Some(newest) = manager.list_document_backups().last() {
            if created.last() != Some(newest) {
                created.push(newest.clone());
            }
        }
    }

    let remaining = manager.list_document_backups();
    assert_eq!(remaining.len(), DOCUMENT_BACKUP_RETENTION);
    assert_eq!(remaining, created[created.len() - DOCUMENT_BACKUP_RETENTION..].to_vec());

    // The newest backup holds the document as it was before the last save
    let newest = fs::read_to_string(remaining.last().unwrap()).unwrap();
    assert!(newest.contains("backup_count: 8"));
}

#[test]
fn test_unknown_keys_do_not_change_result() {
    let (_temp_dir, layout) = create_test_home();
    let manager = ConfigManager::new(layout.clone()).unwrap();

    let plain = "active_shell: fish\nstarship_theme: nord\nbackup_count: 12\n";
    fs::write(manager.config_file(), plain).unwrap();
    let without = manager.read_document().unwrap();

    let extra = format!("{plain}future_setting:\n  nested: true\nui_theme: dark\n");
    fs::write(manager.config_file(), extra).unwrap();
    let with = manager.read_document().unwrap();

    assert_eq!(with, without);
    assert_eq!(with.active_shell, ShellType::Fish);
    assert_eq!(with.starship_theme, "nord");
    assert_eq!(with.backup_count, 12);
}

#[test]
fn test_partial_document_keeps_defaults() {
    let (_temp_dir, layout) = create_test_home();
    let manager = ConfigManager::new(layout.clone()).unwrap();
    fs::write(
        manager.config_file(),
        "active_shell: tcsh\nfeatures:\n  docker: maybe\n  python: enabled\n",
    )
    .unwrap();

    let config = manager.read_document().unwrap();
    let defaults = DxsConfig::for_layout(&layout);

    assert_eq!(config.active_shell, ShellType::Bash);
    assert_eq!(config.feature_status("docker"), Some(FeatureStatus::Disabled));
    assert_eq!(config.feature_status("python"), Some(FeatureStatus::Enabled));
    assert_eq!(config.terminal_font, defaults.terminal_font);
    assert_eq!(config.dxsbash_path, defaults.dxsbash_path);
}

#[test]
fn test_corrupt_document_recovers_without_overwriting() {
    let (_temp_dir, layout) = create_test_home();
    let manager = ConfigManager::new(layout.clone()).unwrap();
    let corrupt = "active_shell: [bash\nfeatures: {";
    fs::write(manager.config_file(), corrupt).unwrap();

    let report = manager.load(&detector_for(&layout, Some("/bin/zsh")));

    assert!(matches!(report.source, ConfigSource::Recovered { .. }));
    assert_eq!(report.config.active_shell, ShellType::Zsh);
    assert_eq!(fs::read_to_string(manager.config_file()).unwrap(), corrupt);
}

#[test]
fn test_empty_document_recovers() {
    let (_temp_dir, layout) = create_test_home();
    let manager = ConfigManager::new(layout.clone()).unwrap();
    fs::write(manager.config_file(), "").unwrap();

    let report = manager.load(&detector_for(&layout, None));
    assert!(matches!(report.source, ConfigSource::Recovered { .. }));
}

#[test]
fn test_document_contains_every_field() {
    let (_temp_dir, layout) = create_test_home();
    let manager = ConfigManager::new(layout.clone()).unwrap();
    let mut config = DxsConfig::for_layout(&layout);
    config.upsert_alias(CustomAlias::new("ll", "ls -la"));

    manager.save(&config).unwrap();
    let document = fs::read_to_string(manager.config_file()).unwrap();

    for key in [
        "active_shell: bash",
        "features:",
        "docker: disabled",
        "starship_theme:",
        "terminal_font:",
        "color_scheme:",
        "fastfetch_enabled: true",
        "custom_aliases:",
        "name: ll",
        "dxsbash_path:",
        "config_path:",
        "auto_backup: true",
        "backup_count: 5",
    ] {
        assert!(document.contains(key), "missing {key:?} in:\n{document}");
    }
}

fn arb_config() -> impl Strategy<Value = DxsConfig> {
    let text = "[A-Za-z][A-Za-z0-9 _.-]{0,20}";
    let path = "/[a-z]{1,10}(/[a-z_.]{1,10}){0,3}";
    let statuses = prop::collection::vec(
        prop_oneof![
            Just(FeatureStatus::Enabled),
            Just(FeatureStatus::Disabled),
            Just(FeatureStatus::Unavailable),
        ],
        FEATURE_CATALOGUE.len(),
    );
    let aliases = prop::collection::vec(("[a-z][a-z0-9_]{0,8}", "[a-z][a-z0-9 |-]{0,24}"), 0..4);

    (
        prop::sample::select(ShellType::ALL.to_vec()),
        statuses,
        (text, text, text),
        (any::<bool>(), any::<bool>(), 1i64..=50),
        aliases,
        (path, path),
    )
        .prop_map(
            |(shell, statuses, (theme, font, scheme), (fastfetch, auto_backup, count), aliases, (repo, state))| {
                let mut config = DxsConfig::for_layout(&HomeLayout::new("/home/prop"));
                config.active_shell = shell;
                for (spec, status) in FEATURE_CATALOGUE.iter().zip(statuses) {
                    config.features.insert(spec.key.to_string(), status);
                }
                config.starship_theme = theme;
                config.terminal_font = font;
                config.color_scheme = scheme;
                config.fastfetch_enabled = fastfetch;
                config.auto_backup = auto_backup;
                config.backup_count = count;
                config.custom_aliases = aliases
                    .into_iter()
                    .map(|(name, command)| CustomAlias::new(name, command).into())
                    .collect();
                config.dxsbash_path = Utf8PathBuf::from(repo);
                config.config_path = Utf8PathBuf::from(state);
                config
            },
        )
}

proptest! {
    #[test]
    fn prop_document_round_trip(config in arb_config()) {
        let document = config.to_document().unwrap();
        let base = DxsConfig::for_layout(&HomeLayout::new("/somewhere/else"));
        let parsed = DxsConfig::from_document_with(&document, base).unwrap();
        prop_assert_eq!(parsed, config);
    }
}
