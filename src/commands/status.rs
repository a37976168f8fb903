//! Command: list recorded resources.
use std::fmt::Write as _;

use anyhow::Result;

use super::CommandSetup;
use crate::cli::{GlobalOpts, StatusOpts};
use crate::logging::Logger;
use crate::status::{EntryView, Scope, Status};

/// Print every status record, or only those owned by the given blueprint on
/// the effective OS.
///
/// # Errors
///
/// Returns an error if the settings or the status document cannot be read.
#[allow(clippy::print_stdout)]
pub fn run(global: &GlobalOpts, opts: &StatusOpts, log: &Logger) -> Result<bool> {
    let setup = CommandSetup::init(global, log)?;
    let status = Status::load(&setup.status_path)?;
    let scope = opts
        .file
        .as_deref()
        .map(|f| Scope::new(f, setup.platform.os.name()));

    let entries: Vec<EntryView<'_>> = status
        .entries()
        .filter(|e| scope.as_ref().is_none_or(|s| e.scope == s))
        .collect();
    if entries.is_empty() {
        log.info("no recorded resources");
        return Ok(true);
    }
    print!("{}", render(&entries));
    Ok(true)
}

/// One line per record: kind, key, OS, source file and timestamp.
#[must_use]
pub fn render(entries: &[EntryView<'_>]) -> String {
    let width = entries.iter().map(|e| e.kind.len()).max().unwrap_or(0);
    let mut out = String::new();
    for e in entries {
        let _ = writeln!(
            out,
            "{:<width$}  {}  [{}] {}  {}",
            e.kind,
            e.key,
            e.scope.os,
            e.scope.source_file,
            e.applied_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    out
}
