//! In-memory log of the shell-level actions taken in the current run.

use chrono::{DateTime, Utc};

/// Outcome tag of an [`ExecutionRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// The command exited zero.
    Success,
    /// The command failed or could not run.
    Error,
}

/// One executed command and its outcome. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    /// When the command finished.
    pub timestamp: DateTime<Utc>,
    /// Exact command text, as rendered by the handler.
    pub command: String,
    /// Combined stdout and stderr.
    pub output: String,
    /// Success or failure.
    pub status: RecordStatus,
    /// Failure description.
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// Record a command that succeeded.
    #[must_use]
    pub fn success(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            command: command.into(),
            output: output.into(),
            status: RecordStatus::Success,
            error: None,
        }
    }

    /// Record a command that failed with `error`.
    #[must_use]
    pub fn failure(
        command: impl Into<String>,
        output: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            command: command.into(),
            output: output.into(),
            status: RecordStatus::Error,
            error: Some(error.into()),
        }
    }

    /// Whether the command succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }
}

/// Whether the most recent record for exactly `command` is a success.
///
/// Handlers call this before touching status so that only actions that
/// really succeeded in this run are remembered.
#[must_use]
pub fn command_succeeded(records: &[ExecutionRecord], command: &str) -> bool {
    records
        .iter()
        .rev()
        .find(|r| r.command == command)
        .is_some_and(ExecutionRecord::is_success)
}
