//! Core logging types: rule entries, status, and the [`Log`] trait.

/// Outcome of one rule, collected for the end-of-run summary.
#[derive(Debug, Clone)]
pub struct RuleEntry {
    /// Progress label of the rule (e.g. `install curl`).
    pub name: String,
    /// Final status of the rule.
    pub status: RuleStatus,
    /// Optional detail message (handler message, skip reason or error).
    pub message: Option<String>,
}

/// Status of a processed rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStatus {
    /// The rule changed the system.
    Ok,
    /// The resource was already in the desired state.
    Unchanged,
    /// A dependency failed, so the rule was not attempted.
    Skipped,
    /// Dry-run mode; nothing was applied.
    DryRun,
    /// The rule's action failed.
    Failed,
}

/// Abstraction over logging backends.
///
/// The engine logs through this trait so tests can substitute a quiet or
/// recording implementation.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a dry-run action message.
    fn dry_run(&self, msg: &str);
    /// Record a rule result for the summary.
    fn record_rule(&self, name: &str, status: RuleStatus, message: Option<&str>);
}
