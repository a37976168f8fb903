//! Language runtimes through the asdf version manager.
//!
//! Every `plugin@version` entry is its own status record, so several
//! versions of one plugin coexist and are removed independently.

use std::cell::OnceCell;

use anyhow::Result;
use chrono::Utc;

use super::tool::Tool;
use super::{HandlerEnv, Outcome, RuleHandler, validate};
use crate::blueprint::Params;
use crate::error::HandlerError;
use crate::record::{ExecutionRecord, command_succeeded};
use crate::status::identity::{remove, upsert};
use crate::status::{AsdfStatus, Scope, Status};

const ASDF_REPO: &str = "https://github.com/asdf-vm/asdf.git";
const ASDF_BRANCH: &str = "v0.14.1";

/// Installs and removes `plugin@version` entries with asdf.
#[derive(Debug)]
pub struct AsdfHandler<'a> {
    env: HandlerEnv<'a>,
    /// `(plugin, version)` pairs in declaration order.
    entries: Vec<(String, String)>,
    uninstall: bool,
    tool: Tool,
    /// Entries found installed by `down`; only these are uninstalled.
    present: OnceCell<Vec<(String, String)>>,
}

impl<'a> AsdfHandler<'a> {
    /// # Errors
    ///
    /// Returns a [`HandlerError`] if an entry is not `plugin@version` or
    /// either half is unsafe.
    pub fn new(params: &Params, env: HandlerEnv<'a>, uninstall: bool) -> Result<Self, HandlerError> {
        let entries = params
            .asdf_packages
            .iter()
            .map(|entry| {
                let (plugin, version) =
                    entry
                        .split_once('@')
                        .ok_or_else(|| HandlerError::InvalidParameter {
                            param: "asdf package".to_string(),
                            value: entry.clone(),
                            reason: "expected plugin@version".to_string(),
                        })?;
                validate::identifier("asdf plugin", plugin)?;
                validate::identifier("asdf version", version)?;
                Ok((plugin.to_string(), version.to_string()))
            })
            .collect::<Result<Vec<_>, HandlerError>>()?;
        Ok(Self {
            tool: Tool::asdf(&env),
            env,
            entries,
            uninstall,
            present: OnceCell::new(),
        })
    }

    fn is_installed(&self, plugin: &str, version: &str) -> bool {
        self.tool.succeeds(&self.env, &["where", plugin, version])
    }

    fn bootstrap_command(&self) -> String {
        if self.env.platform.is_mac() {
            Tool::brew().wrap("brew install asdf")
        } else {
            let dir = self.env.home.join(".asdf");
            format!(
                "git clone {ASDF_REPO} {} --branch {ASDF_BRANCH}",
                validate::shell_quote(&dir.to_string_lossy())
            )
        }
    }

    fn labels(&self) -> String {
        labels(&self.entries)
    }

    /// Entries the command acts on: everything declared, except that an
    /// uninstall narrows to what `down` found installed.
    fn targets(&self) -> &[(String, String)] {
        match self.present.get() {
            Some(present) if self.uninstall && !present.is_empty() => present,
            _ => &self.entries,
        }
    }
}

fn labels(entries: &[(String, String)]) -> String {
    entries
        .iter()
        .map(|(p, v)| format!("{p}@{v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl RuleHandler for AsdfHandler<'_> {
    fn up(&self) -> Result<Outcome> {
        let session = self.env.session;
        session.ensure_prerequisite(
            "asdf",
            || self.tool.is_present(&self.env),
            &self.bootstrap_command(),
        )?;
        if self.entries.iter().all(|(p, v)| self.is_installed(p, v)) {
            return Ok(Outcome::unchanged(format!("already installed: {}", self.labels())));
        }
        session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("installed {}", self.labels())))
    }

    fn down(&self) -> Result<Outcome> {
        let present: Vec<_> = if self.tool.is_present(&self.env) {
            self.entries
                .iter()
                .filter(|(p, v)| self.is_installed(p, v))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        let removed = labels(&present);
        let _ = self.present.set(present);
        if removed.is_empty() {
            return Ok(Outcome::unchanged(format!("not installed: {}", self.labels())));
        }
        self.env.session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("uninstalled {removed}")))
    }

    fn update_status(&self, status: &mut Status, records: &[ExecutionRecord], scope: &Scope) {
        if !command_succeeded(records, &self.command()) {
            return;
        }
        for (plugin, version) in &self.entries {
            if self.uninstall {
                remove(&mut status.asdf, &format!("{plugin}@{version}"), scope);
            } else {
                upsert(
                    &mut status.asdf,
                    AsdfStatus {
                        plugin: plugin.clone(),
                        version: version.clone(),
                        applied_at: Utc::now(),
                        scope: scope.clone(),
                    },
                );
            }
        }
    }

    fn command(&self) -> String {
        let steps = self
            .targets()
            .iter()
            .map(|(p, v)| {
                if self.uninstall {
                    format!("asdf uninstall {p} {v}")
                } else {
                    format!("(asdf plugin add {p} || true) && asdf install {p} {v}")
                }
            })
            .collect::<Vec<_>>()
            .join(" && ");
        self.tool.wrap(&steps)
    }

    fn display_info(&self) -> String {
        format!("asdf: {}", self.labels())
    }

    fn needs_sudo(&self) -> Option<bool> {
        Some(false)
    }

    fn display_details(&self, uninstall: bool) -> String {
        let verb = if uninstall { "Uninstalling" } else { "Installing" };
        format!("{verb} {}", self.labels())
    }
}

pub(super) fn uninstall_params(record: &AsdfStatus) -> Params {
    Params {
        asdf_packages: vec![format!("{}@{}", record.plugin, record.version)],
        ..Params::default()
    }
}
