//! Command-line front end.
//!
//! Every subcommand runs against one [`SessionController`]: the configuration
//! is loaded (or detected) first, edits are saved immediately, and `apply`
//! streams step results as they finish. Ctrl-C during an apply stops it at the
//! next step boundary.

mod print;

use crate::config::ConfigManager;
use crate::config::paths::HomeLayout;
use crate::models::{CustomAlias, DxsConfig, ShellType};
use crate::services::apply::ApplyService;
use crate::services::detection::{InstallationDetector, validate_installation};
use crate::session::SessionController;
use crate::state::{StateChange, StateManager};
use anyhow::{Context, Result, anyhow, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "dxsbash-config", version)]
#[command(about = "Settings manager for the DXSBash shell dotfiles", long_about = None)]
#[command(after_help = "Examples:\n  \
    dxsbash-config                          Show the current configuration\n  \
    dxsbash-config set shell zsh            Switch the configured shell\n  \
    dxsbash-config apply                    Relink the live files\n  \
    dxsbash-config --dxsbash-root ~/my-dxs  Use a custom DXSBash directory\n  \
    dxsbash-config --validate-only          Check the installation and exit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the DXSBash repository (default: ~/linuxtoolbox/dxsbash)
    #[arg(long, value_name = "PATH", global = true)]
    pub dxsbash_root: Option<Utf8PathBuf>,

    /// Debug-level logging, mirrored to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Only validate the DXSBash installation and exit
    #[arg(long)]
    pub validate_only: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the current configuration (default)
    Show,

    /// Change a setting and save
    Set {
        field: Field,
        value: String,
    },

    /// Turn a feature module on or off and save
    Feature {
        name: String,
        state: Switch,
    },

    /// Manage custom aliases
    Alias {
        #[command(subcommand)]
        action: AliasAction,
    },

    /// Save the configuration as loaded (with any --dxsbash-root override)
    Save,

    /// Back up the live files, relink them to match the configuration, then save
    Apply,

    /// Back up the live shell, prompt and banner files without changing them
    Backup,

    /// Reset every setting to its default and save
    Reset,

    /// Reload the configuration from disk and show it
    Refresh,

    /// Report configuration problems (exit status 1 if any)
    Validate,

    /// List configuration backups and file snapshots
    Backups,
}

#[derive(Subcommand, Debug)]
pub enum AliasAction {
    /// Add an alias, replacing one with the same name
    Add { name: String, command: String },

    /// Remove an alias by name
    #[command(alias = "rm")]
    Remove { name: String },
}

/// Settable fields.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Shell,
    Theme,
    Font,
    ColorScheme,
    Fastfetch,
    AutoBackup,
    BackupCount,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl From<Switch> for bool {
    fn from(switch: Switch) -> Self {
        switch == Switch::On
    }
}

/// Run the parsed command line.
///
/// # Errors
/// Initialization failures (bad `--dxsbash-root`, unwritable state directory)
/// and invalid values. Command failures that the user should see as a status
/// are returned as [`ExitCode::FAILURE`] instead.
pub fn run(cli: Cli, layout: &HomeLayout, runtime: &tokio::runtime::Runtime) -> Result<ExitCode> {
    let root = resolve_repository_root(cli.dxsbash_root.as_deref(), layout)?;

    if cli.validate_only {
        return Ok(validate_only(&root));
    }

    let config_manager =
        ConfigManager::new(layout.clone()).context("Failed to create configuration directories")?;
    let session = SessionController::new(
        Arc::new(StateManager::new(DxsConfig::for_layout(layout))),
        Arc::new(config_manager),
        Arc::new(ApplyService::new(layout.clone())),
        Arc::new(InstallationDetector::new(root.clone())),
        runtime.handle().clone(),
    );

    let report = session.load();
    print::load_notice(&report.source);

    if cli.dxsbash_root.is_some() && session.state().config().dxsbash_path != root {
        session.set_repository_root(root);
    }

    match cli.command.unwrap_or(Command::Show) {
        Command::Show => {
            print::show(&session);
            Ok(ExitCode::SUCCESS)
        }
        Command::Set { field, value } => {
            set_field(&session, field, &value)?;
            save(&session)
        }
        Command::Feature { name, state } => {
            session.state().set_feature(&name, state.into())?;
            save(&session)
        }
        Command::Alias { action } => {
            match action {
                AliasAction::Add { name, command } => {
                    if name.trim().is_empty() || command.trim().is_empty() {
                        bail!("Alias name and command must not be empty");
                    }
                    session.state().add_alias(CustomAlias::new(name, command));
                }
                AliasAction::Remove { name } => {
                    let (removed, _) = session.state().remove_alias(&name);
                    if !removed {
                        bail!("No alias named '{name}'");
                    }
                }
            }
            save(&session)
        }
        Command::Save => save(&session),
        Command::Apply => apply(&session, runtime),
        Command::Backup => {
            let report = session.backup_now();
            print::backup(&report);
            Ok(if report.dir.is_some() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Reset => {
            session.reset();
            save(&session)
        }
        Command::Refresh => {
            session.refresh();
            print::show(&session);
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate => {
            let issues = session.validate();
            print::issues(&issues);
            Ok(if issues.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Backups => {
            print::backups(session.store());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Pick the repository root: an explicit path must be an existing directory;
/// the default is used even when missing so the user can still edit settings.
pub fn resolve_repository_root(explicit: Option<&Utf8Path>, layout: &HomeLayout) -> Result<Utf8PathBuf> {
    let Some(path) = explicit else {
        let default = layout.default_repository_root();
        if !default.is_dir() {
            eprintln!(
                "{} Default DXSBash directory not found: {}",
                "warning:".yellow().bold(),
                default
            );
            eprintln!("You can specify a custom path with --dxsbash-root");
        }
        return Ok(default);
    };

    if !path.exists() {
        bail!("DXSBash directory does not exist: {path}");
    }
    if !path.is_dir() {
        bail!("DXSBash path is not a directory: {path}");
    }
    let root = path
        .canonicalize_utf8()
        .with_context(|| format!("Failed to resolve {path}"))?;

    let missing = validate_installation(&root).missing_essentials();
    if !missing.is_empty() {
        eprintln!(
            "{} {} is missing essential files: {}",
            "warning:".yellow().bold(),
            root,
            missing.join(", ")
        );
    }
    Ok(root)
}

fn validate_only(root: &Utf8Path) -> ExitCode {
    let report = validate_installation(root);
    print::installation(&report);
    if report.is_valid() {
        println!("{}", "DXSBash installation is valid".green());
        ExitCode::SUCCESS
    } else {
        println!("{}", "DXSBash installation validation failed".red());
        ExitCode::FAILURE
    }
}

fn set_field(session: &SessionController, field: Field, value: &str) -> Result<()> {
    let state = session.state();
    match field {
        Field::Shell => {
            let shell: ShellType = value.trim().to_ascii_lowercase().parse()?;
            state.set_active_shell(shell);
        }
        Field::Theme => {
            state.set_starship_theme(value.to_string());
        }
        Field::Font => {
            state.set_terminal_font(value.to_string());
        }
        Field::ColorScheme => {
            state.set_color_scheme(value.to_string());
        }
        Field::Fastfetch => {
            state.set_fastfetch_enabled(parse_switch(value)?);
        }
        Field::AutoBackup => {
            state.set_auto_backup(parse_switch(value)?);
        }
        Field::BackupCount => {
            let count: i64 = value
                .parse()
                .with_context(|| format!("Backup count must be a number, got '{value}'"))?;
            state.set_backup_count(count);
            for issue in session.validate().iter().filter(|i| i.contains("Backup count")) {
                eprintln!("{} {}", "warning:".yellow().bold(), issue);
            }
        }
    }
    Ok(())
}

/// Accept the usual spellings of a boolean.
pub fn parse_switch(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" | "enabled" => Ok(true),
        "off" | "false" | "no" | "0" | "disabled" => Ok(false),
        other => bail!("Expected on or off, got '{other}'"),
    }
}

fn save(session: &SessionController) -> Result<ExitCode> {
    session.save()?;
    println!(
        "{} {}",
        "Saved".green(),
        session.store().config_file()
    );
    Ok(ExitCode::SUCCESS)
}

fn apply(session: &SessionController, runtime: &tokio::runtime::Runtime) -> Result<ExitCode> {
    let mut events = session.state().subscribe();
    let mut handle = session.request_apply()?;

    let joined = runtime.block_on(async {
        loop {
            tokio::select! {
                joined = &mut handle => break joined,
                event = events.recv() => {
                    if let Ok(StateChange::StepCompleted { step, status }) = event {
                        print::step(step, &status);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("{}", "Cancelling after the current step...".yellow());
                    session.request_cancel();
                }
            }
        }
    });

    while let Ok(event) = events.try_recv() {
        if let StateChange::StepCompleted { step, status } = event {
            print::step(step, &status);
        }
    }

    let report = match joined {
        Ok(report) => report,
        Err(e) => {
            session.state().update(|s| s.reset_apply_state());
            return Err(anyhow!(e).context("Apply worker failed"));
        }
    };

    print::apply_result(&report);
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_switch() {
        assert!(parse_switch("on").unwrap());
        assert!(parse_switch(" Yes ").unwrap());
        assert!(!parse_switch("off").unwrap());
        assert!(!parse_switch("0").unwrap());
        assert!(parse_switch("maybe").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["dxsbash-config", "--debug", "set", "backup-count", "7"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(
            cli.command,
            Some(Command::Set { field: Field::BackupCount, ref value }) if value == "7"
        ));

        let cli = Cli::try_parse_from(["dxsbash-config", "feature", "docker", "on"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Feature { state: Switch::On, .. })));

        let cli = Cli::try_parse_from(["dxsbash-config", "alias", "rm", "ll"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Alias { action: AliasAction::Remove { .. } })
        ));
    }

    #[test]
    fn test_explicit_root_must_be_directory() {
        let temp = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let layout = HomeLayout::new(base.clone());

        assert!(resolve_repository_root(Some(base.join("missing").as_path()), &layout).is_err());

        let file = base.join("file");
        std::fs::write(&file, "").unwrap();
        assert!(resolve_repository_root(Some(file.as_path()), &layout).is_err());

        let root = resolve_repository_root(Some(base.as_path()), &layout).unwrap();
        assert!(root.is_absolute());
    }
}
