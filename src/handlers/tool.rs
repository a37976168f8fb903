//! Command-line tools that may be installed outside the inherited `PATH`.
//!
//! A freshly bootstrapped asdf lives in `~/.asdf/bin` and Homebrew on Apple
//! Silicon in `/opt/homebrew/bin`; neither is on `PATH` until the user's
//! shell profile is reloaded. Checks call the binary by absolute path when
//! it is found there, and commands export the tool's directories first.

use std::path::PathBuf;

use super::HandlerEnv;
use super::validate::shell_quote;

/// Where Homebrew installs its binaries.
pub const BREW_BIN_DIRS: &[&str] = &[
    "/opt/homebrew/bin",
    "/usr/local/bin",
    "/home/linuxbrew/.linuxbrew/bin",
];

/// A named tool plus the directories it may be installed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    name: &'static str,
    dirs: Vec<PathBuf>,
}

impl Tool {
    /// A tool found as `name` on `PATH` or in one of `dirs`.
    #[must_use]
    pub const fn new(name: &'static str, dirs: Vec<PathBuf>) -> Self {
        Self { name, dirs }
    }

    /// Homebrew.
    #[must_use]
    pub fn brew() -> Self {
        Self::new("brew", BREW_BIN_DIRS.iter().map(PathBuf::from).collect())
    }

    /// asdf: the git checkout in `~/.asdf` on Linux, Homebrew on macOS.
    #[must_use]
    pub fn asdf(env: &HandlerEnv<'_>) -> Self {
        let root = env.home.join(".asdf");
        let mut dirs = vec![root.join("bin"), root.join("shims")];
        if env.platform.is_mac() {
            dirs.extend(BREW_BIN_DIRS.iter().map(PathBuf::from));
        }
        Self::new("asdf", dirs)
    }

    /// Ollama: Homebrew on macOS, the install script's `/usr/local/bin`
    /// elsewhere.
    #[must_use]
    pub fn ollama(env: &HandlerEnv<'_>) -> Self {
        if env.platform.is_mac() {
            Self::new("ollama", BREW_BIN_DIRS.iter().map(PathBuf::from).collect())
        } else {
            Self::new("ollama", vec![PathBuf::from("/usr/local/bin")])
        }
    }

    /// Binary name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// First known location holding the binary.
    fn located(&self, env: &HandlerEnv<'_>) -> Option<PathBuf> {
        self.dirs
            .iter()
            .map(|d| d.join(self.name))
            .find(|p| env.fs.exists(p))
    }

    /// Whether the tool is on `PATH` or in one of its known directories.
    #[must_use]
    pub fn is_present(&self, env: &HandlerEnv<'_>) -> bool {
        env.session.which(self.name) || self.located(env).is_some()
    }

    /// Program to spawn directly for read-only checks.
    #[must_use]
    pub fn program(&self, env: &HandlerEnv<'_>) -> String {
        if env.session.which(self.name) {
            return self.name.to_string();
        }
        self.located(env)
            .map_or_else(|| self.name.to_string(), |p| p.to_string_lossy().into_owned())
    }

    /// Whether `tool args…` exits successfully.
    #[must_use]
    pub fn succeeds(&self, env: &HandlerEnv<'_>, args: &[&str]) -> bool {
        env.session.probe(&self.program(env), args)
    }

    /// `cmd` with the tool's directories prepended to `PATH`.
    #[must_use]
    pub fn wrap(&self, cmd: &str) -> String {
        let dirs = self
            .dirs
            .iter()
            .map(|d| shell_quote(&d.to_string_lossy()).into_owned())
            .collect::<Vec<_>>()
            .join(":");
        format!("export PATH={dirs}:\"$PATH\" && {cmd}")
    }
}
