//! Structured logger with dry-run awareness and summary collection.
use std::path::PathBuf;
use std::sync::Mutex;

use super::subscriber::{DRY_RUN_TARGET, STAGE_TARGET};
use super::types::{Log, RuleEntry, RuleStatus};
use super::utils::log_file_path;

/// Implement the display methods of [`Log`] by delegating to inherent methods
/// of the same name on the implementing type.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Console and file logger that also collects per-rule outcomes.
///
/// The log file itself is written by the [`FileLayer`](super::subscriber::FileLayer)
/// installed in [`init_subscriber`](super::subscriber::init_subscriber); the
/// logger only remembers its path for the summary.
#[derive(Debug)]
pub struct Logger {
    rules: Mutex<Vec<RuleEntry>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Logger for `command`, with a log file under the cache directory when one can be created.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            log_file: log_file_path(command),
        }
    }

    /// Return the log file path, if available.
    #[cfg(test)]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Snapshot of recorded rule entries.
    #[must_use]
    pub fn rule_entries(&self) -> Vec<RuleEntry> {
        self.rules.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Log an error.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Log progress.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (console only when verbose; always in the file).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Log what a dry run would have done.
    pub fn dry_run(&self, msg: &str) {
        tracing::info!(target: DRY_RUN_TARGET, "{msg}");
    }

    /// Record a rule result for the summary.
    pub fn record_rule(&self, name: &str, status: RuleStatus, message: Option<&str>) {
        if let Ok(mut guard) = self.rules.lock() {
            guard.push(RuleEntry {
                name: name.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }

    /// Count the number of failed rules.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.rules.lock().map_or(0, |guard| {
            guard
                .iter()
                .filter(|r| r.status == RuleStatus::Failed)
                .count()
        })
    }

    /// Print the summary of all recorded rules.
    pub fn print_summary(&self) {
        let rules = self.rule_entries();
        if rules.is_empty() {
            return;
        }

        self.stage("Summary");

        let (mut ok, mut unchanged, mut skipped, mut dry_run, mut failed) = (0u32, 0u32, 0u32, 0u32, 0u32);
        for rule in &rules {
            let (icon, color) = match rule.status {
                RuleStatus::Ok => {
                    ok += 1;
                    ("✓", "\x1b[32m")
                }
                RuleStatus::Unchanged => {
                    unchanged += 1;
                    ("·", "\x1b[2m")
                }
                RuleStatus::Skipped => {
                    skipped += 1;
                    ("○", "\x1b[33m")
                }
                RuleStatus::DryRun => {
                    dry_run += 1;
                    ("~", "\x1b[37m")
                }
                RuleStatus::Failed => {
                    failed += 1;
                    ("✗", "\x1b[31m")
                }
            };
            let suffix = rule
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));
            self.info(&format!("{color}{icon} {}{suffix}\x1b[0m", rule.name));
        }

        let total = ok + unchanged + skipped + dry_run + failed;
        self.info(&format!(
            "{total} rules: \x1b[32m{ok} changed\x1b[0m, \x1b[2m{unchanged} unchanged\x1b[0m, \x1b[33m{skipped} skipped\x1b[0m, \x1b[37m{dry_run} dry-run\x1b[0m, \x1b[31m{failed} failed\x1b[0m"
        ));

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error, dry_run);

    fn record_rule(&self, name: &str, status: RuleStatus, message: Option<&str>) {
        self.record_rule(name, status, message);
    }
}
