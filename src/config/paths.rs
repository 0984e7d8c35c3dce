//! Fixed per-user locations used by the store, the detector, and the apply engine.
//!
//! Everything is rooted at a single home directory so that tests can point the
//! whole tool at a temporary directory instead of the real `$HOME`.

use crate::models::ShellType;
use camino::{Utf8Path, Utf8PathBuf};

/// Name of the persisted configuration document inside the state directory.
pub const CONFIG_FILE_NAME: &str = "tui-config.yaml";

/// Marker string identifying files that belong to this project.
pub const PROJECT_MARKER: &str = "dxsbash";

/// Well-known per-user paths, all derived from one home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeLayout {
    home: Utf8PathBuf,
}

impl HomeLayout {
    pub fn new<P: Into<Utf8PathBuf>>(home: P) -> Self {
        Self { home: home.into() }
    }

    /// Layout for the current user's home directory.
    ///
    /// Falls back to `/` when the home directory cannot be determined or is not
    /// valid UTF-8.
    pub fn current() -> Self {
        let home = dirs::home_dir()
            .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
            .unwrap_or_else(|| {
                tracing::warn!("Could not determine home directory, using /");
                Utf8PathBuf::from("/")
            });
        Self { home }
    }

    pub fn home(&self) -> &Utf8Path {
        &self.home
    }

    pub fn xdg_config_dir(&self) -> Utf8PathBuf {
        self.home.join(".config")
    }

    /// Default location of the dotfiles repository checkout.
    pub fn default_repository_root(&self) -> Utf8PathBuf {
        self.home.join("linuxtoolbox").join(PROJECT_MARKER)
    }

    /// This tool's own state directory.
    pub fn state_dir(&self) -> Utf8PathBuf {
        self.xdg_config_dir().join(PROJECT_MARKER)
    }

    pub fn config_file(&self) -> Utf8PathBuf {
        self.state_dir().join(CONFIG_FILE_NAME)
    }

    pub fn backup_dir(&self) -> Utf8PathBuf {
        self.state_dir().join("backups")
    }

    pub fn log_dir(&self) -> Utf8PathBuf {
        self.state_dir().join("logs")
    }

    pub fn bashrc(&self) -> Utf8PathBuf {
        self.home.join(".bashrc")
    }

    pub fn bash_aliases(&self) -> Utf8PathBuf {
        self.home.join(".bash_aliases")
    }

    pub fn zshrc(&self) -> Utf8PathBuf {
        self.home.join(".zshrc")
    }

    pub fn fish_dir(&self) -> Utf8PathBuf {
        self.xdg_config_dir().join("fish")
    }

    pub fn fish_config(&self) -> Utf8PathBuf {
        self.fish_dir().join("config.fish")
    }

    pub fn starship_config(&self) -> Utf8PathBuf {
        self.xdg_config_dir().join("starship.toml")
    }

    pub fn fastfetch_config(&self) -> Utf8PathBuf {
        self.xdg_config_dir().join("fastfetch").join("config.jsonc")
    }

    /// Live startup file for a shell.
    pub fn startup_file(&self, shell: ShellType) -> Utf8PathBuf {
        match shell {
            ShellType::Bash => self.bashrc(),
            ShellType::Zsh => self.zshrc(),
            ShellType::Fish => self.fish_config(),
        }
    }

    /// Live location of a shell's help file.
    pub fn help_file(&self, shell: ShellType) -> Utf8PathBuf {
        match shell {
            ShellType::Bash => self.home.join(".bashrc_help"),
            ShellType::Zsh => self.home.join(".zshrc_help"),
            ShellType::Fish => self.fish_dir().join("fish_help"),
        }
    }

    /// Every live file the apply engine may replace, in backup order.
    ///
    /// Includes the helper files a shell switch relinks, not just the
    /// startup files.
    pub fn live_files(&self) -> Vec<Utf8PathBuf> {
        let mut files = Vec::with_capacity(9);
        for shell in ShellType::ALL {
            files.push(self.startup_file(shell));
            if shell == ShellType::Bash {
                files.push(self.bash_aliases());
            }
            files.push(self.help_file(shell));
        }
        files.push(self.starship_config());
        files.push(self.fastfetch_config());
        files
    }
}

/// File names of the sources inside the dotfiles repository.
pub mod repo {
    use crate::models::ShellType;

    pub const BASH_ALIASES: &str = ".bash_aliases";
    pub const STARSHIP: &str = "starship.toml";
    pub const FASTFETCH: &str = "config.jsonc";
    pub const VERSION: &str = "version.txt";
    pub const SETUP_SCRIPT: &str = "setup.sh";
    pub const UPDATER_SCRIPT: &str = "updater.sh";

    pub fn startup_file(shell: ShellType) -> &'static str {
        match shell {
            ShellType::Bash => ".bashrc",
            ShellType::Zsh => ".zshrc",
            ShellType::Fish => "config.fish",
        }
    }

    pub fn help_file(shell: ShellType) -> &'static str {
        match shell {
            ShellType::Bash => ".bashrc_help",
            ShellType::Zsh => ".zshrc_help",
            ShellType::Fish => "fish_help",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_files() {
        let layout = HomeLayout::new("/home/user");
        assert_eq!(layout.startup_file(ShellType::Bash), "/home/user/.bashrc");
        assert_eq!(layout.startup_file(ShellType::Zsh), "/home/user/.zshrc");
        assert_eq!(
            layout.startup_file(ShellType::Fish),
            "/home/user/.config/fish/config.fish"
        );
    }

    #[test]
    fn test_state_locations() {
        let layout = HomeLayout::new("/home/user");
        assert_eq!(layout.state_dir(), "/home/user/.config/dxsbash");
        assert_eq!(
            layout.config_file(),
            "/home/user/.config/dxsbash/tui-config.yaml"
        );
        assert_eq!(layout.backup_dir(), "/home/user/.config/dxsbash/backups");
    }

    #[test]
    fn test_live_files_cover_theme_and_banner() {
        let layout = HomeLayout::new("/h");
        let files = layout.live_files();
        assert_eq!(files.len(), 9);
        assert!(files.contains(&Utf8PathBuf::from("/h/.bash_aliases")));
        assert!(files.contains(&Utf8PathBuf::from("/h/.config/fish/fish_help")));
        assert!(files.contains(&Utf8PathBuf::from("/h/.config/starship.toml")));
        assert!(files.contains(&Utf8PathBuf::from("/h/.config/fastfetch/config.jsonc")));
    }
}
