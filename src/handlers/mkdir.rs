//! Directories, optionally with explicit permissions.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;

use super::{HandlerEnv, Outcome, RuleHandler, guard_removal, remove_path, upsert_path, validate};
use crate::blueprint::Params;
use crate::error::HandlerError;
use crate::record::{ExecutionRecord, command_succeeded};
use crate::status::{MkdirStatus, Scope, Status};

/// Creates and removes one directory.
#[derive(Debug)]
pub struct MkdirHandler<'a> {
    env: HandlerEnv<'a>,
    /// Canonical path; the status key.
    path: String,
    target: PathBuf,
    /// Declared string and parsed mode.
    permissions: Option<(String, u32)>,
    uninstall: bool,
}

impl<'a> MkdirHandler<'a> {
    /// # Errors
    ///
    /// Returns a [`HandlerError`] for a missing path or a malformed
    /// permission string.
    pub fn new(params: &Params, env: HandlerEnv<'a>, uninstall: bool) -> Result<Self, HandlerError> {
        let path = params
            .mkdir
            .clone()
            .filter(|p| !p.is_empty())
            .map(|p| env.canonical(&p))
            .ok_or_else(|| HandlerError::MissingTarget("mkdir path".to_string()))?;
        let permissions = params
            .permissions
            .as_deref()
            .map(|p| validate::permissions(p).map(|mode| (p.to_string(), mode)))
            .transpose()?;
        let target = env.expand(&path);
        if uninstall {
            guard_removal(&env, &target)?;
        }
        Ok(Self {
            env,
            path,
            target,
            permissions,
            uninstall,
        })
    }

    fn is_satisfied(&self) -> bool {
        if !self.env.fs.is_dir(&self.target) {
            return false;
        }
        match &self.permissions {
            None => true,
            // Platforms without modes cannot be checked; treat as matching.
            Some((_, mode)) => self.env.fs.mode(&self.target).is_none_or(|m| m == *mode),
        }
    }
}

impl RuleHandler for MkdirHandler<'_> {
    fn up(&self) -> Result<Outcome> {
        if self.is_satisfied() {
            return Ok(Outcome::unchanged(format!("{} already exists", self.path)));
        }
        self.env.session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("created {}", self.path)))
    }

    fn down(&self) -> Result<Outcome> {
        if !self.env.fs.exists(&self.target) {
            return Ok(Outcome::unchanged(format!("{} already absent", self.path)));
        }
        self.env.session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("removed {}", self.path)))
    }

    fn update_status(&self, status: &mut Status, records: &[ExecutionRecord], scope: &Scope) {
        if !command_succeeded(records, &self.command()) {
            return;
        }
        if self.uninstall {
            remove_path(&self.env, &mut status.mkdirs, &self.path, scope);
        } else {
            upsert_path(
                &self.env,
                &mut status.mkdirs,
                MkdirStatus {
                    path: self.path.clone(),
                    permissions: self.permissions.as_ref().map(|(p, _)| p.clone()),
                    applied_at: Utc::now(),
                    scope: scope.clone(),
                },
            );
        }
    }

    fn command(&self) -> String {
        let target = self.target.to_string_lossy();
        let quoted = validate::shell_quote(&target);
        if self.uninstall {
            return format!("rm -rf {quoted}");
        }
        match &self.permissions {
            Some((perm, _)) => format!("mkdir -p {quoted} && chmod {perm} {quoted}"),
            None => format!("mkdir -p {quoted}"),
        }
    }

    fn display_info(&self) -> String {
        match &self.permissions {
            Some((perm, _)) => format!("{} (mode {perm})", self.path),
            None => self.path.clone(),
        }
    }

    fn display_details(&self, uninstall: bool) -> String {
        if uninstall {
            format!("Removing directory {}", self.path)
        } else {
            format!("Creating directory {}", self.path)
        }
    }
}

pub(super) fn uninstall_params(record: &MkdirStatus) -> Params {
    Params {
        mkdir: Some(record.path.clone()),
        permissions: record.permissions.clone(),
        ..Params::default()
    }
}
