//! Subcommand implementations and their shared setup.
pub mod apply;
pub mod completions;
pub mod status;
pub mod version;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};

use crate::cli::GlobalOpts;
use crate::config::{Settings, expand_home, home_dir};
use crate::logging::Logger;
use crate::platform::{Os, Platform};

/// Exit status when a rule failed or was skipped but the run completed.
pub const EXIT_RULES_FAILED: u8 = 2;

/// Exit status for fatal errors (parse, resolve, status, setup).
pub const EXIT_FATAL: u8 = 1;

/// Shared state produced by the common command setup sequence.
///
/// Encapsulates settings loading, platform detection and the status file
/// location so that each command does not have to repeat the boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    /// Settings from the user config file.
    pub settings: Settings,
    /// Detected platform with any OS override applied.
    pub platform: Platform,
    /// Status document location.
    pub status_path: PathBuf,
}

impl CommandSetup {
    /// Load settings and resolve the effective OS and status file.
    ///
    /// Command-line flags take precedence over the settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file is invalid or the requested OS
    /// is not supported.
    pub fn init(global: &GlobalOpts, log: &Logger) -> Result<Self> {
        let settings = Settings::load_default()?;
        let mut platform = Platform::detect();

        if let Some(name) = global.os.as_deref().or(settings.os.as_deref()) {
            let os: Os = name
                .parse()
                .map_err(anyhow::Error::msg)
                .context("invalid OS override")?;
            platform = platform.with_os(os);
        }
        log.debug(&format!("os: {}", platform.os));
        if let Some(pm) = platform.package_manager {
            log.debug(&format!("package manager: {pm}"));
        }

        let status_path = global
            .status_file
            .as_deref()
            .map_or_else(|| settings.status_path(), |p| expand_home(p, &home_dir()));
        log.debug(&format!("status file: {}", status_path.display()));

        Ok(Self {
            settings,
            platform,
            status_path,
        })
    }
}

/// Map the outcome of a command onto the process exit status.
#[must_use]
pub fn exit_code(result: &Result<bool>) -> ExitCode {
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_RULES_FAILED),
        Err(_) => ExitCode::from(EXIT_FATAL),
    }
}
