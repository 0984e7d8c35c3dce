//! Stateless filesystem and PATH probing helpers.
//!
//! These never fail loudly: anything that cannot be inspected is treated as
//! absent, which is the answer every caller wants when the filesystem has been
//! changed underneath it.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;

/// Looks up commands on the executable search path.
///
/// Kept behind a trait so detection can be exercised without depending on
/// what happens to be installed on the machine running the tests.
#[cfg_attr(test, mockall::automock)]
pub trait CommandLocator: Send + Sync {
    /// Full path of `command` if it resolves on the search path.
    fn locate(&self, command: &str) -> Option<Utf8PathBuf>;
}

/// True if `command` resolves through `locator`.
pub fn command_exists(locator: &dyn CommandLocator, command: &str) -> bool {
    locator.locate(command).is_some()
}

/// [`CommandLocator`] backed by the real `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPath;

impl CommandLocator for SystemPath {
    fn locate(&self, command: &str) -> Option<Utf8PathBuf> {
        which::which(command)
            .ok()
            .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
    }
}

/// True if anything occupies `path`, including a dangling symlink.
pub fn entry_exists(path: &Utf8Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// True if `path` is a symbolic link (dangling or not).
pub fn is_symlink(path: &Utf8Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Resolve where a symlink finally points.
///
/// Canonicalizes when the chain resolves; for a dangling link the immediate
/// target is returned instead so callers can still inspect it.
pub fn resolve_link(path: &Utf8Path) -> Option<Utf8PathBuf> {
    if !is_symlink(path) {
        return None;
    }

    match path.canonicalize_utf8() {
        Ok(resolved) => Some(resolved),
        Err(e) => {
            tracing::debug!("Could not canonicalize {}: {}", path, e);
            path.read_link_utf8().ok()
        }
    }
}

/// Remove whatever occupies `path`: file, symlink, or directory tree.
pub fn remove_entry(path: &Utf8Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Create `link` pointing at `original`.
#[cfg(unix)]
pub fn create_symlink(original: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
pub fn create_symlink(original: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
    if original.is_dir() {
        std::os::windows::fs::symlink_dir(original, link)
    } else {
        std::os::windows::fs::symlink_file(original, link)
    }
}

#[cfg(not(any(unix, windows)))]
pub fn create_symlink(_original: &Utf8Path, _link: &Utf8Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}
