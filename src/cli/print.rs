use crate::config::{ConfigManager, ConfigSource};
use crate::models::FeatureStatus;
use crate::services::apply::{ApplyReport, ApplyStep, BackupReport, StepStatus};
use crate::services::detection::{InstallationReport, repository_version};
use crate::session::SessionController;
use camino::Utf8PathBuf;
use colored::Colorize;

const LABEL_WIDTH: usize = 18;

fn row(label: &str, value: impl std::fmt::Display) {
    println!("  {:<width$}{}", label, value, width = LABEL_WIDTH);
}

fn heading(title: &str) {
    println!("\n{}", title.bold());
}

pub(super) fn load_notice(source: &ConfigSource) {
    match source {
        ConfigSource::Document => {}
        ConfigSource::Detected { persisted: true } => {
            eprintln!("{}", "No configuration found, saved detected settings".dimmed());
        }
        ConfigSource::Detected { persisted: false } => {
            eprintln!(
                "{} detected settings could not be saved",
                "warning:".yellow().bold()
            );
        }
        ConfigSource::Recovered { reason } => {
            eprintln!(
                "{} configuration unreadable, using detected settings: {}",
                "warning:".yellow().bold(),
                reason
            );
        }
    }
}

pub(super) fn show(session: &SessionController) {
    let state = session.state().snapshot();
    let config = &state.config;
    let locator = session.detector().locator();

    heading("Shell");
    let availability = if config.is_shell_available(locator) {
        String::new()
    } else {
        format!(" {}", "(not installed)".red())
    };
    row("active", format!("{}{}", config.active_shell.to_string().cyan(), availability));
    row("installed", session.detector().installed_shells().join(", "));

    heading("Repository");
    let root = config.repository_root();
    row("path", root);
    row(
        "version",
        repository_version(root).unwrap_or_else(|| "unknown".to_string()),
    );

    heading("Features");
    for (name, status) in &config.features {
        let status = match status {
            FeatureStatus::Enabled => status.to_string().green(),
            FeatureStatus::Disabled => status.to_string().yellow(),
            FeatureStatus::Unavailable => status.to_string().dimmed(),
        };
        row(name, status);
    }

    heading("Appearance");
    row("theme", &config.starship_theme);
    row("font", &config.terminal_font);
    row("color scheme", &config.color_scheme);
    row("fastfetch", on_off(config.fastfetch_enabled));

    heading("Aliases");
    let mut any = false;
    for alias in config.aliases() {
        any = true;
        row(&alias.name, &alias.command);
    }
    if !any {
        println!("  {}", "none".dimmed());
    }

    heading("Backups");
    row("auto backup", on_off(config.auto_backup));
    row("keep", config.backup_count);
    row("location", session.store().backup_dir());

    let issues = config.validate();
    if !issues.is_empty() {
        heading("Issues");
        for issue in &issues {
            println!("  {}", issue.red());
        }
    }
    if state.is_dirty {
        println!("\n{}", "Unsaved changes".yellow());
    }
}

fn on_off(value: bool) -> colored::ColoredString {
    if value { "on".green() } else { "off".dimmed() }
}

pub(super) fn issues(issues: &[String]) {
    if issues.is_empty() {
        println!("{}", "Configuration is valid".green());
        return;
    }
    for issue in issues {
        println!("{} {}", "-".red(), issue);
    }
}

pub(super) fn installation(report: &InstallationReport) {
    let check = |ok: bool| if ok { "ok".green() } else { "missing".red() };
    println!("{}", report.root.to_string().bold());
    row("directory", check(report.directory_exists));
    row(".bashrc", check(report.bashrc_exists));
    row(".zshrc", check(report.zshrc_exists));
    row("config.fish", check(report.fish_config_exists));
    row("starship.toml", check(report.starship_config_exists));
    row("setup.sh", check(report.setup_script_exists));
    row("updater.sh", check(report.updater_script_exists));
}

pub(super) fn backup(report: &BackupReport) {
    match &report.dir {
        Some(dir) => println!(
            "{} {} file(s) to {}",
            "Backed up".green(),
            report.copied.len(),
            dir
        ),
        None => println!("{}", "Backup failed".red()),
    }
    for (path, error) in &report.failed {
        println!("  {} {}: {}", "failed".red(), path, error);
    }
}

pub(super) fn backups(store: &ConfigManager) {
    let list = |title: &str, entries: Vec<Utf8PathBuf>| {
        heading(title);
        if entries.is_empty() {
            println!("  {}", "none".dimmed());
        }
        for entry in entries {
            println!("  {}", entry.file_name().unwrap_or(entry.as_str()));
        }
    };
    list("Configuration backups", store.list_document_backups());
    list("File snapshots", store.list_snapshots());
    println!("\n{}", store.backup_dir().as_str().dimmed());
}

pub(super) fn step(step: ApplyStep, status: &StepStatus) {
    match status {
        StepStatus::Succeeded => println!("{} {}", "✓".green(), step),
        StepStatus::Skipped(why) => println!("{} {} ({})", "-".dimmed(), step, why.dimmed()),
        StepStatus::Failed(why) => println!("{} {}: {}", "✗".red(), step, why),
    }
}

pub(super) fn apply_result(report: &ApplyReport) {
    if let Some(dir) = &report.snapshot {
        println!("{} {}", "Snapshot:".dimmed(), dir);
    }
    if report.cancelled {
        println!("{}", "Apply cancelled; remaining steps were not run".yellow());
    } else if report.is_success() {
        println!(
            "{} in {:.2}s",
            "Configuration applied".green().bold(),
            report.duration.as_secs_f32()
        );
    } else {
        println!("{}", "Apply failed; configuration was not saved".red().bold());
    }
}
