use crate::config::paths::HomeLayout;
use crate::services::probe::{self, CommandLocator};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::Serialize;
use serde_yaml_ng::{Mapping, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lowest accepted value for [`DxsConfig::backup_count`].
pub const MIN_BACKUP_COUNT: i64 = 1;

/// Highest accepted value for [`DxsConfig::backup_count`].
pub const MAX_BACKUP_COUNT: i64 = 50;

/// A feature module and the commands whose presence makes it usable.
#[derive(Debug, Clone, Copy)]
pub struct FeatureSpec {
    pub key: &'static str,
    pub commands: &'static [&'static str],
    pub default_status: FeatureStatus,
}

/// Fixed catalogue of feature modules, in display order.
pub const FEATURE_CATALOGUE: &[FeatureSpec] = &[
    FeatureSpec {
        key: "docker",
        commands: &["docker"],
        default_status: FeatureStatus::Disabled,
    },
    FeatureSpec {
        key: "kubernetes",
        commands: &["kubectl"],
        default_status: FeatureStatus::Disabled,
    },
    FeatureSpec {
        key: "python",
        commands: &["python3", "pip3"],
        default_status: FeatureStatus::Enabled,
    },
    FeatureSpec {
        key: "nodejs",
        commands: &["node", "npm"],
        default_status: FeatureStatus::Disabled,
    },
    FeatureSpec {
        key: "git_extended",
        commands: &["git"],
        default_status: FeatureStatus::Enabled,
    },
    FeatureSpec {
        key: "network_tools",
        commands: &["netstat", "ss", "curl"],
        default_status: FeatureStatus::Enabled,
    },
    FeatureSpec {
        key: "system_monitoring",
        commands: &["ps", "top", "htop"],
        default_status: FeatureStatus::Enabled,
    },
    FeatureSpec {
        key: "archive_tools",
        commands: &["tar", "unzip"],
        default_status: FeatureStatus::Enabled,
    },
    FeatureSpec {
        key: "development_tools",
        commands: &["vim", "nano", "code"],
        default_status: FeatureStatus::Enabled,
    },
];

/// Look up a catalogue entry by key.
pub fn feature_spec(key: &str) -> Option<&'static FeatureSpec> {
    FEATURE_CATALOGUE.iter().find(|f| f.key == key)
}

/// Raised when a persisted enum tag is not recognized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} tag: {tag:?}")]
pub struct TagError {
    pub kind: &'static str,
    pub tag: String,
}

/// Supported shells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellType {
    #[default]
    Bash,
    Zsh,
    Fish,
}

impl ShellType {
    pub const ALL: [ShellType; 3] = [ShellType::Bash, ShellType::Zsh, ShellType::Fish];

    pub fn tag(self) -> &'static str {
        match self {
            ShellType::Bash => "bash",
            ShellType::Zsh => "zsh",
            ShellType::Fish => "fish",
        }
    }

    /// Executable name looked up on the search path.
    pub fn executable(self) -> &'static str {
        self.tag()
    }
}

impl fmt::Display for ShellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ShellType {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bash" => Ok(ShellType::Bash),
            "zsh" => Ok(ShellType::Zsh),
            "fish" => Ok(ShellType::Fish),
            other => Err(TagError {
                kind: "shell",
                tag: other.to_string(),
            }),
        }
    }
}

/// Feature enablement status.
///
/// `Unavailable` is a ceiling computed from the environment, not something a
/// user can pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureStatus {
    Enabled,
    Disabled,
    Unavailable,
}

impl FeatureStatus {
    pub fn tag(self) -> &'static str {
        match self {
            FeatureStatus::Enabled => "enabled",
            FeatureStatus::Disabled => "disabled",
            FeatureStatus::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for FeatureStatus {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(FeatureStatus::Enabled),
            "disabled" => Ok(FeatureStatus::Disabled),
            "unavailable" => Ok(FeatureStatus::Unavailable),
            other => Err(TagError {
                kind: "feature status",
                tag: other.to_string(),
            }),
        }
    }
}

/// A user-defined alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomAlias {
    pub name: String,
    pub command: String,
}

impl CustomAlias {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

/// One entry of the `custom_aliases` list as found in a document.
///
/// Hand-edited documents may contain entries that are not well formed; those
/// are carried verbatim so that validation can point at them and saving does
/// not silently drop them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AliasEntry {
    Alias(CustomAlias),
    Malformed(Value),
}

impl AliasEntry {
    pub fn as_alias(&self) -> Option<&CustomAlias> {
        match self {
            AliasEntry::Alias(alias) => Some(alias),
            AliasEntry::Malformed(_) => None,
        }
    }

    fn from_value(value: &Value) -> Self {
        match (value.get("name"), value.get("command")) {
            (Some(Value::String(name)), Some(Value::String(command))) => {
                AliasEntry::Alias(CustomAlias::new(name.clone(), command.clone()))
            }
            _ => AliasEntry::Malformed(value.clone()),
        }
    }

    /// Validation message for this entry, if any.
    fn issue(&self, index: usize) -> Option<String> {
        match self {
            AliasEntry::Alias(alias) => {
                if alias.name.trim().is_empty() || alias.command.trim().is_empty() {
                    Some(format!("Custom alias {index} has an empty name or command"))
                } else {
                    None
                }
            }
            AliasEntry::Malformed(Value::Mapping(map)) => {
                if !map.contains_key("name") || !map.contains_key("command") {
                    Some(format!("Custom alias {index} missing 'name' or 'command'"))
                } else {
                    Some(format!("Custom alias {index} name and command must be strings"))
                }
            }
            AliasEntry::Malformed(_) => Some(format!("Custom alias {index} is not a mapping")),
        }
    }
}

impl From<CustomAlias> for AliasEntry {
    fn from(alias: CustomAlias) -> Self {
        AliasEntry::Alias(alias)
    }
}

/// Why a feature toggle was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureError {
    #[error("Unknown feature: {0}")]
    Unknown(String),

    #[error("Feature {0} is unavailable (required tools are not installed)")]
    Unavailable(String),
}

/// Main configuration for DXSBash, persisted as `tui-config.yaml`.
///
/// Field order here is the key order of the written document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DxsConfig {
    pub active_shell: ShellType,
    pub features: IndexMap<String, FeatureStatus>,

    pub starship_theme: String,
    pub terminal_font: String,
    pub color_scheme: String,
    pub fastfetch_enabled: bool,

    pub custom_aliases: Vec<AliasEntry>,

    pub dxsbash_path: Utf8PathBuf,
    pub config_path: Utf8PathBuf,

    pub auto_backup: bool,
    pub backup_count: i64,
}

impl Default for DxsConfig {
    fn default() -> Self {
        Self::for_layout(&HomeLayout::current())
    }
}

impl DxsConfig {
    /// Defaults with paths derived from `layout`.
    pub fn for_layout(layout: &HomeLayout) -> Self {
        Self {
            active_shell: ShellType::Bash,
            features: default_features(),
            starship_theme: "default".to_string(),
            terminal_font: "FiraCode Nerd Font".to_string(),
            color_scheme: "auto".to_string(),
            fastfetch_enabled: true,
            custom_aliases: Vec::new(),
            dxsbash_path: layout.default_repository_root(),
            config_path: layout.state_dir(),
            auto_backup: true,
            backup_count: 5,
        }
    }

    /// Render as a YAML document with every field present.
    pub fn to_document(&self) -> Result<String, serde_yaml_ng::Error> {
        serde_yaml_ng::to_string(self)
    }

    /// Parse a document on top of `base`.
    ///
    /// Only YAML syntax errors fail. Unknown keys are ignored, values of the
    /// wrong type leave the base value in place, an unrecognized shell tag keeps
    /// the base shell, and an unrecognized feature status becomes `Disabled`.
    pub fn from_document_with(document: &str, base: DxsConfig) -> Result<Self, serde_yaml_ng::Error> {
        let value: Value = serde_yaml_ng::from_str(document)?;
        Ok(Self::from_value(&value, base))
    }

    /// Overlay every recognized field of `value` onto `base`.
    pub fn from_value(value: &Value, base: DxsConfig) -> Self {
        let mut config = base;
        let Some(map) = value.as_mapping() else {
            tracing::warn!("Configuration document is not a mapping, using defaults");
            return config;
        };

        if let Some(tag) = str_field(map, "active_shell") {
            match tag.parse() {
                Ok(shell) => config.active_shell = shell,
                Err(e) => tracing::warn!("Ignoring active_shell: {}", e),
            }
        }

        if let Some(Value::Mapping(features)) = map.get("features") {
            config.features = features
                .iter()
                .filter_map(|(k, v)| {
                    let key = k.as_str()?.to_string();
                    let status = v
                        .as_str()
                        .and_then(|tag| tag.parse().ok())
                        .unwrap_or_else(|| {
                            tracing::warn!("Unrecognized status for feature {}, using disabled", key);
                            FeatureStatus::Disabled
                        });
                    Some((key, status))
                })
                .collect();
        }

        if let Some(s) = str_field(map, "starship_theme") {
            config.starship_theme = s.to_string();
        }
        if let Some(s) = str_field(map, "terminal_font") {
            config.terminal_font = s.to_string();
        }
        if let Some(s) = str_field(map, "color_scheme") {
            config.color_scheme = s.to_string();
        }
        if let Some(s) = str_field(map, "dxsbash_path") {
            config.dxsbash_path = Utf8PathBuf::from(s);
        }
        if let Some(s) = str_field(map, "config_path") {
            config.config_path = Utf8PathBuf::from(s);
        }

        if let Some(Value::Bool(b)) = map.get("fastfetch_enabled") {
            config.fastfetch_enabled = *b;
        }
        if let Some(Value::Bool(b)) = map.get("auto_backup") {
            config.auto_backup = *b;
        }
        if let Some(n) = map.get("backup_count").and_then(Value::as_i64) {
            config.backup_count = n;
        }

        if let Some(Value::Sequence(entries)) = map.get("custom_aliases") {
            config.custom_aliases = entries.iter().map(AliasEntry::from_value).collect();
        }

        config
    }

    /// Collect human-readable problems with this configuration.
    ///
    /// An empty list means the configuration is valid. Never mutates.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !self.dxsbash_path.is_absolute() {
            issues.push(format!("DXSBash path is not absolute: {}", self.dxsbash_path));
        } else if !self.dxsbash_path.exists() {
            issues.push(format!("DXSBash path does not exist: {}", self.dxsbash_path));
        } else if !self.dxsbash_path.is_dir() {
            issues.push(format!("DXSBash path is not a directory: {}", self.dxsbash_path));
        }

        if self.config_path.exists() && !self.config_path.is_dir() {
            issues.push(format!(
                "Config path exists but is not a directory: {}",
                self.config_path
            ));
        }

        if self.backup_count < MIN_BACKUP_COUNT {
            issues.push(format!("Backup count must be at least {MIN_BACKUP_COUNT}"));
        } else if self.backup_count > MAX_BACKUP_COUNT {
            issues.push(format!("Backup count should not exceed {MAX_BACKUP_COUNT}"));
        }

        issues.extend(
            self.custom_aliases
                .iter()
                .enumerate()
                .filter_map(|(i, entry)| entry.issue(i)),
        );

        issues
    }

    /// `backup_count` forced into the accepted range.
    pub fn effective_backup_count(&self) -> usize {
        self.backup_count.clamp(MIN_BACKUP_COUNT, MAX_BACKUP_COUNT) as usize
    }

    pub fn repository_root(&self) -> &Utf8Path {
        &self.dxsbash_path
    }

    pub fn feature_status(&self, key: &str) -> Option<FeatureStatus> {
        self.features.get(key).copied()
    }

    /// Turn a catalogue feature on or off.
    ///
    /// Unavailable features cannot be enabled; disabling one is a no-op so the
    /// ceiling is not lost.
    pub fn set_feature(&mut self, key: &str, enabled: bool) -> Result<(), FeatureError> {
        if feature_spec(key).is_none() {
            return Err(FeatureError::Unknown(key.to_string()));
        }

        let current = self.features.get(key).copied();
        if current == Some(FeatureStatus::Unavailable) {
            if enabled {
                return Err(FeatureError::Unavailable(key.to_string()));
            }
            return Ok(());
        }

        let status = if enabled {
            FeatureStatus::Enabled
        } else {
            FeatureStatus::Disabled
        };
        self.features.insert(key.to_string(), status);
        Ok(())
    }

    pub fn enabled_features(&self) -> Vec<&str> {
        self.features_with(FeatureStatus::Enabled)
    }

    pub fn unavailable_features(&self) -> Vec<&str> {
        self.features_with(FeatureStatus::Unavailable)
    }

    fn features_with(&self, wanted: FeatureStatus) -> Vec<&str> {
        self.features
            .iter()
            .filter(|(_, status)| **status == wanted)
            .map(|(key, _)| key.as_str())
            .collect()
    }

    /// Well-formed aliases, skipping malformed document entries.
    pub fn aliases(&self) -> impl Iterator<Item = &CustomAlias> {
        self.custom_aliases.iter().filter_map(AliasEntry::as_alias)
    }

    /// Add an alias, replacing any existing alias of the same name.
    pub fn upsert_alias(&mut self, alias: CustomAlias) {
        if let Some(existing) = self
            .custom_aliases
            .iter_mut()
            .find(|e| e.as_alias().is_some_and(|a| a.name == alias.name))
        {
            *existing = alias.into();
        } else {
            self.custom_aliases.push(alias.into());
        }
    }

    /// Remove an alias by name. Returns true if one was removed.
    pub fn remove_alias(&mut self, name: &str) -> bool {
        let before = self.custom_aliases.len();
        self.custom_aliases
            .retain(|e| e.as_alias().is_none_or(|a| a.name != name));
        self.custom_aliases.len() != before
    }

    /// Path of the active shell's executable, if installed.
    pub fn shell_executable(&self, locator: &dyn CommandLocator) -> Option<Utf8PathBuf> {
        locator.locate(self.active_shell.executable())
    }

    pub fn is_shell_available(&self, locator: &dyn CommandLocator) -> bool {
        probe::command_exists(locator, self.active_shell.executable())
    }
}

/// Catalogue defaults, in catalogue order.
pub fn default_features() -> IndexMap<String, FeatureStatus> {
    FEATURE_CATALOGUE
        .iter()
        .map(|f| (f.key.to_string(), f.default_status))
        .collect()
}

fn str_field<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}
