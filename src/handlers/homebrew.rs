//! Homebrew formulas, bootstrapping Homebrew itself when needed.

use std::cell::OnceCell;

use anyhow::Result;
use chrono::Utc;

use super::tool::Tool;
use super::{HandlerEnv, Outcome, RuleHandler, validate};
use crate::blueprint::Params;
use crate::error::HandlerError;
use crate::record::{ExecutionRecord, command_succeeded};
use crate::status::identity::{remove, upsert};
use crate::status::{HomebrewStatus, Scope, Status};

/// Official non-interactive Homebrew installer.
pub const HOMEBREW_INSTALL: &str = "NONINTERACTIVE=1 /bin/bash -c \"$(curl -fsSL https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh)\"";

/// Installs and removes Homebrew formulas.
#[derive(Debug)]
pub struct HomebrewHandler<'a> {
    env: HandlerEnv<'a>,
    formulas: Vec<String>,
    uninstall: bool,
    tool: Tool,
    /// Formulas found installed by `down`; only these are uninstalled.
    present: OnceCell<Vec<String>>,
}

impl<'a> HomebrewHandler<'a> {
    /// # Errors
    ///
    /// Returns [`HandlerError::UnsafeIdentifier`] for a bad formula name.
    pub fn new(params: &Params, env: HandlerEnv<'a>, uninstall: bool) -> Result<Self, HandlerError> {
        validate::identifiers("formula", &params.formulas)?;
        Ok(Self {
            env,
            formulas: params.formulas.clone(),
            uninstall,
            tool: Tool::brew(),
            present: OnceCell::new(),
        })
    }

    fn is_installed(&self, formula: &str) -> bool {
        self.tool.succeeds(&self.env, &["list", "--versions", formula])
    }

    fn targets(&self) -> &[String] {
        match self.present.get() {
            Some(present) if self.uninstall && !present.is_empty() => present,
            _ => &self.formulas,
        }
    }
}

impl RuleHandler for HomebrewHandler<'_> {
    fn up(&self) -> Result<Outcome> {
        let session = self.env.session;
        session.ensure_prerequisite("brew", || self.tool.is_present(&self.env), HOMEBREW_INSTALL)?;
        if self.formulas.iter().all(|f| self.is_installed(f)) {
            return Ok(Outcome::unchanged(format!(
                "already installed: {}",
                self.formulas.join(", ")
            )));
        }
        session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("installed {}", self.formulas.join(", "))))
    }

    fn down(&self) -> Result<Outcome> {
        let present: Vec<String> = if self.tool.is_present(&self.env) {
            self.formulas
                .iter()
                .filter(|f| self.is_installed(f))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        let removed = present.join(", ");
        let _ = self.present.set(present);
        if removed.is_empty() {
            return Ok(Outcome::unchanged(format!(
                "not installed: {}",
                self.formulas.join(", ")
            )));
        }
        self.env.session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("uninstalled {removed}")))
    }

    fn update_status(&self, status: &mut Status, records: &[ExecutionRecord], scope: &Scope) {
        if !command_succeeded(records, &self.command()) {
            return;
        }
        for formula in &self.formulas {
            if self.uninstall {
                remove(&mut status.homebrew, formula, scope);
            } else {
                upsert(
                    &mut status.homebrew,
                    HomebrewStatus {
                        formula: formula.clone(),
                        applied_at: Utc::now(),
                        scope: scope.clone(),
                    },
                );
            }
        }
    }

    fn command(&self) -> String {
        let verb = if self.uninstall { "uninstall" } else { "install" };
        self.tool
            .wrap(&format!("brew {verb} {}", self.targets().join(" ")))
    }

    fn display_info(&self) -> String {
        format!("formulas: {}", self.formulas.join(", "))
    }

    fn needs_sudo(&self) -> Option<bool> {
        Some(false)
    }

    fn display_details(&self, uninstall: bool) -> String {
        let verb = if uninstall { "Uninstalling" } else { "Brewing" };
        format!("{verb} {}", self.formulas.join(", "))
    }
}

pub(super) fn uninstall_params(record: &HomebrewStatus) -> Params {
    Params {
        formulas: vec![record.formula.clone()],
        ..Params::default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::handlers::test_helpers::{FakeExecutor, TestEnv};
    use crate::operations::MockFileSystemOps;

    const PATH_PREFIX: &str =
        "export PATH=/opt/homebrew/bin:/usr/local/bin:/home/linuxbrew/.linuxbrew/bin:\"$PATH\" && ";

    fn params(formulas: &[&str]) -> Params {
        Params {
            formulas: formulas.iter().map(|f| (*f).to_string()).collect(),
            ..Params::default()
        }
    }

    #[test]
    fn installs_missing_formula_without_sudo() {
        let t = TestEnv::mac(FakeExecutor::new().with_program("brew").fail_on("--versions ripgrep"));
        let h = HomebrewHandler::new(&params(&["jq", "ripgrep"]), t.env(), false).unwrap();
        assert!(h.up().unwrap().changed);
        assert_eq!(
            t.exec.scripts(),
            vec![format!("{PATH_PREFIX}brew install jq ripgrep")]
        );
        assert!(t.exec.calls().iter().all(|c| !c.starts_with("sudo")));
    }

    #[test]
    fn bootstraps_homebrew_when_absent() {
        let t = TestEnv::mac(FakeExecutor::new().fail_on("--versions jq"));
        let h = HomebrewHandler::new(&params(&["jq"]), t.env(), false).unwrap();
        h.up().unwrap();
        assert_eq!(
            t.exec.scripts(),
            vec![
                HOMEBREW_INSTALL.to_string(),
                format!("{PATH_PREFIX}brew install jq")
            ]
        );
    }

    #[test]
    fn apple_silicon_prefix_counts_as_installed() {
        let t = TestEnv::mac(FakeExecutor::new())
            .with_fs(MockFileSystemOps::new().with_file("/opt/homebrew/bin/brew", b""));
        let h = HomebrewHandler::new(&params(&["jq"]), t.env(), false).unwrap();
        assert!(!h.up().unwrap().changed);
        assert_eq!(
            t.exec.calls(),
            vec!["/opt/homebrew/bin/brew list --versions jq"]
        );
    }

    #[test]
    fn uninstall_names_only_installed_formulas() {
        let t = TestEnv::mac(FakeExecutor::new().with_program("brew").fail_on("--versions ripgrep"));
        let h = HomebrewHandler::new(&params(&["jq", "ripgrep"]), t.env(), true).unwrap();
        assert!(h.down().unwrap().changed);
        assert_eq!(
            t.exec.scripts(),
            vec![format!("{PATH_PREFIX}brew uninstall jq")]
        );
        assert_eq!(h.command(), format!("{PATH_PREFIX}brew uninstall jq"));
    }

    #[test]
    fn down_without_brew_is_a_no_op() {
        let t = TestEnv::mac(FakeExecutor::new());
        let h = HomebrewHandler::new(&params(&["jq"]), t.env(), true).unwrap();
        assert!(!h.down().unwrap().changed);
        assert!(t.exec.calls().is_empty());
        assert_eq!(h.command(), format!("{PATH_PREFIX}brew uninstall jq"));
    }
}
