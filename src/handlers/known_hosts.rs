//! SSH host keys in `~/.ssh/known_hosts`.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;

use super::{HandlerEnv, Outcome, RuleHandler, validate};
use crate::blueprint::Params;
use crate::error::HandlerError;
use crate::record::{ExecutionRecord, command_succeeded};
use crate::status::identity::{remove, upsert};
use crate::status::{KnownHostStatus, Scope, Status};

/// Adds and removes one host in `known_hosts`.
#[derive(Debug)]
pub struct KnownHostsHandler<'a> {
    env: HandlerEnv<'a>,
    host: String,
    key_type: Option<String>,
    file: PathBuf,
    uninstall: bool,
}

impl<'a> KnownHostsHandler<'a> {
    /// # Errors
    ///
    /// Returns [`HandlerError::UnsafeIdentifier`] for a bad host or key type.
    pub fn new(params: &Params, env: HandlerEnv<'a>, uninstall: bool) -> Result<Self, HandlerError> {
        let host = params.known_host.as_deref().unwrap_or_default();
        validate::identifier("host", host)?;
        if let Some(kt) = &params.key_type {
            validate::identifier("key type", kt)?;
        }
        Ok(Self {
            file: env.home.join(".ssh").join("known_hosts"),
            env,
            host: host.to_string(),
            key_type: params.key_type.clone(),
            uninstall,
        })
    }

    fn is_known(&self) -> bool {
        self.env.fs.exists(&self.file)
            && self
                .env
                .session
                .probe("ssh-keygen", &["-F", &self.host, "-f", &self.file.to_string_lossy()])
    }
}

impl RuleHandler for KnownHostsHandler<'_> {
    fn up(&self) -> Result<Outcome> {
        if self.is_known() {
            return Ok(Outcome::unchanged(format!("{} already known", self.host)));
        }
        self.env.session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("added {} to known_hosts", self.host)))
    }

    fn down(&self) -> Result<Outcome> {
        if !self.is_known() {
            return Ok(Outcome::unchanged(format!("{} not in known_hosts", self.host)));
        }
        self.env.session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("removed {} from known_hosts", self.host)))
    }

    fn update_status(&self, status: &mut Status, records: &[ExecutionRecord], scope: &Scope) {
        if !command_succeeded(records, &self.command()) {
            return;
        }
        if self.uninstall {
            remove(&mut status.known_hosts, &self.host, scope);
        } else {
            upsert(
                &mut status.known_hosts,
                KnownHostStatus {
                    host: self.host.clone(),
                    key_type: self.key_type.clone(),
                    applied_at: Utc::now(),
                    scope: scope.clone(),
                },
            );
        }
    }

    fn command(&self) -> String {
        let file = self.file.to_string_lossy();
        let file = validate::shell_quote(&file);
        if self.uninstall {
            return format!("ssh-keygen -R {} -f {file}", self.host);
        }
        let dir = self.file.parent().map(|d| d.to_string_lossy()).unwrap_or_default();
        let key_type = self
            .key_type
            .as_ref()
            .map(|kt| format!("-t {kt} "))
            .unwrap_or_default();
        format!(
            "mkdir -p {} && ssh-keyscan {key_type}{} >> {file}",
            validate::shell_quote(&dir),
            self.host
        )
    }

    fn display_info(&self) -> String {
        match &self.key_type {
            Some(kt) => format!("{} ({kt})", self.host),
            None => self.host.clone(),
        }
    }

    fn needs_sudo(&self) -> Option<bool> {
        Some(false)
    }

    fn display_details(&self, uninstall: bool) -> String {
        if uninstall {
            format!("Forgetting host {}", self.host)
        } else {
            format!("Trusting host {}", self.host)
        }
    }
}

pub(super) fn uninstall_params(record: &KnownHostStatus) -> Params {
    Params {
        known_host: Some(record.host.clone()),
        key_type: record.key_type.clone(),
        ..Params::default()
    }
}
