//! User settings and well-known file locations.
pub mod toml_loader;

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Settings read from `$XDG_CONFIG_HOME/blueprint/config.toml`.
///
/// Every field is optional; command-line flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Location of the persisted status document.
    pub status_file: Option<PathBuf>,
    /// OS name used instead of the detected one.
    pub os: Option<String>,
    /// Extra command substrings that mark a command as needing elevation.
    pub elevation_markers: Vec<String>,
}

impl Settings {
    /// Load settings from `path`; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or invalid.
    pub fn load(path: &Path) -> Result<Self> {
        toml_loader::load_config(path)
    }

    /// Load settings from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or invalid.
    pub fn load_default() -> Result<Self> {
        Self::load(&config_file_path())
    }

    /// Effective status document path: the configured one, else the default
    /// under `$XDG_STATE_HOME`.
    #[must_use]
    pub fn status_path(&self) -> PathBuf {
        self.status_file
            .as_deref()
            .map_or_else(default_status_path, |p| expand_home(p, &home_dir()))
    }
}

/// The invoking user's home directory (`$HOME`, else the current directory).
#[must_use]
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
}

/// Resolve an XDG base directory: `value` when set and absolute, otherwise
/// `home/fallback`.
fn xdg_dir(value: Option<std::ffi::OsString>, home: &Path, fallback: &str) -> PathBuf {
    value
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .unwrap_or_else(|| home.join(fallback))
}

/// `$XDG_CONFIG_HOME/blueprint/config.toml`.
#[must_use]
pub fn config_file_path() -> PathBuf {
    xdg_dir(std::env::var_os("XDG_CONFIG_HOME"), &home_dir(), ".config")
        .join("blueprint")
        .join("config.toml")
}

/// `$XDG_CACHE_HOME/blueprint`, home of the per-command log files.
#[must_use]
pub fn cache_dir() -> PathBuf {
    xdg_dir(std::env::var_os("XDG_CACHE_HOME"), &home_dir(), ".cache").join("blueprint")
}

/// `$XDG_STATE_HOME/blueprint/status.json`.
#[must_use]
pub fn default_status_path() -> PathBuf {
    xdg_dir(std::env::var_os("XDG_STATE_HOME"), &home_dir(), ".local/state")
        .join("blueprint")
        .join("status.json")
}

/// Expand a leading `~` or `~/` against `home`.
#[must_use]
pub fn expand_home(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) if rest.as_os_str().is_empty() => home.to_path_buf(),
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Identity form of a declared path.
///
/// `~` is expanded, a relative path is made absolute against the current
/// directory, `.` and `..` are folded lexically (never above the root), and
/// anything under `home` is written back as `~/…`. `~/data`,
/// `/home/u/data` and `/home/u/./x/../data/` all yield `~/data`.
#[must_use]
pub fn canonical_path(path: &str, home: &Path) -> String {
    let expanded = expand_home(Path::new(path), home);
    let absolute = std::path::absolute(&expanded).unwrap_or(expanded);
    let cleaned = lexical_clean(&absolute);
    let home = lexical_clean(home);
    match cleaned.strip_prefix(&home) {
        Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Ok(rest) if home.parent().is_some() => format!("~/{}", rest.to_string_lossy()),
        _ => cleaned.to_string_lossy().into_owned(),
    }
}

fn lexical_clean(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}
