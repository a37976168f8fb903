//! Git repositories cloned to a path and kept fast-forwarded.

use std::cell::OnceCell;
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;

use super::{
    HandlerEnv, Outcome, RuleHandler, find_path, guard_removal, remove_path, upsert_path, validate,
};
use crate::blueprint::Params;
use crate::error::HandlerError;
use crate::git::{self, SyncStatus};
use crate::record::{ExecutionRecord, command_succeeded};
use crate::status::{CloneStatus, Scope, Status};

/// Clones, fast-forwards and removes one checkout.
#[derive(Debug)]
pub struct CloneHandler<'a> {
    env: HandlerEnv<'a>,
    url: String,
    /// Canonical destination; the status key.
    path: String,
    target: PathBuf,
    branch: Option<String>,
    uninstall: bool,
    sha: OnceCell<String>,
}

impl<'a> CloneHandler<'a> {
    /// # Errors
    ///
    /// Returns a [`HandlerError`] if the URL, destination or branch is
    /// missing or unsafe.
    pub fn new(params: &Params, env: HandlerEnv<'a>, uninstall: bool) -> Result<Self, HandlerError> {
        let url = params.clone_url.as_deref().unwrap_or_default();
        validate::url("repository URL", url)?;
        let path = params
            .clone_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| env.canonical(p))
            .ok_or_else(|| HandlerError::MissingTarget(format!("destination for {url}")))?;
        if let Some(branch) = &params.branch {
            validate::identifier("branch", branch)?;
        }
        let target = env.expand(&path);
        if uninstall {
            guard_removal(&env, &target)?;
        }
        Ok(Self {
            env,
            url: url.to_string(),
            path,
            target,
            branch: params.branch.clone(),
            uninstall,
            sha: OnceCell::new(),
        })
    }
}

impl RuleHandler for CloneHandler<'_> {
    fn up(&self) -> Result<Outcome> {
        let outcome = git::clone_or_update(
            self.env.session,
            self.env.fs,
            &self.url,
            &self.target,
            self.branch.as_deref(),
            self.needs_sudo(),
        )?;
        let short = |sha: &str| sha.chars().take(7).collect::<String>();
        let message = match outcome.status {
            SyncStatus::Cloned => format!("cloned {} to {}", self.url, self.path),
            SyncStatus::Updated => format!(
                "updated {} ({} -> {})",
                self.path,
                short(outcome.old_sha.as_deref().unwrap_or_default()),
                short(&outcome.new_sha)
            ),
            SyncStatus::AlreadyUpToDate => format!("{}: {}", self.path, outcome.status),
        };
        let changed = outcome.status != SyncStatus::AlreadyUpToDate;
        let _ = self.sha.set(outcome.new_sha);
        Ok(if changed {
            Outcome::changed(message)
        } else {
            Outcome::unchanged(message)
        })
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
            remove_path(&self.env, &mut status.clones, &self.path, scope);
            return;
        }
        let sha = self
            .sha
            .get()
            .filter(|s| !s.is_empty())
            .cloned()
            .or_else(|| find_path(&self.env, &status.clones, &self.path, scope).map(|c| c.sha.clone()))
            .unwrap_or_default();
        upsert_path(
            &self.env,
            &mut status.clones,
            CloneStatus {
                url: self.url.clone(),
                path: self.path.clone(),
                branch: self.branch.clone(),
                sha,
                applied_at: Utc::now(),
                scope: scope.clone(),
            },
        );
    }

    fn command(&self) -> String {
        if self.uninstall {
            format!("rm -rf {}", validate::shell_quote(&self.target.to_string_lossy()))
        } else {
            git::clone_command(&self.url, &self.target, self.branch.as_deref())
        }
    }

    fn display_info(&self) -> String {
        match &self.branch {
            Some(b) => format!("{} -> {} (branch {b})", self.url, self.path),
            None => format!("{} -> {}", self.url, self.path),
        }
    }

    fn display_details(&self, uninstall: bool) -> String {
        if uninstall {
            format!("Removing clone {}", self.path)
        } else {
            format!("Cloning {}", self.url)
        }
    }
}

pub(super) fn uninstall_params(record: &CloneStatus) -> Params {
    Params {
        clone_url: Some(record.url.clone()),
        clone_path: Some(record.path.clone()),
        branch: record.branch.clone(),
        ..Params::default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::handlers::test_helpers::{FakeExecutor, TestEnv};
    use crate::operations::MockFileSystemOps;

    fn params() -> Params {
        Params {
            clone_url: Some("https://example.com/r.git".to_string()),
            clone_path: Some("~/r".to_string()),
            ..Params::default()
        }
    }

    #[test]
    fn clone_then_record_declared_path() {
        let t = TestEnv::linux(FakeExecutor::new().respond("rev-parse HEAD", "0123456789abcdef\n"));
        let h = CloneHandler::new(&params(), t.env(), false).unwrap();
        assert_eq!(h.command(), "git clone https://example.com/r.git /home/u/r");

        let out = h.up().unwrap();
        assert!(out.changed);
        assert_eq!(out.message, "cloned https://example.com/r.git to ~/r");

        let mut status = Status::default();
        h.update_status(&mut status, &t.session.records(), &t.scope);
        assert_eq!(status.clones.len(), 1);
        assert_eq!(status.clones[0].path, "~/r");
        assert_eq!(status.clones[0].sha, "0123456789abcdef");
    }

    #[test]
    fn up_to_date_checkout_is_unchanged() {
        let t = TestEnv::linux(FakeExecutor::new().respond("rev-parse", "abc\n"))
            .with_fs(MockFileSystemOps::new().with_dir("/home/u/r/.git"));
        let h = CloneHandler::new(&params(), t.env(), false).unwrap();
        let out = h.up().unwrap();
        assert!(!out.changed);
        assert_eq!(out.message, "~/r: Already up to date");
    }

    #[test]
    fn down_removes_existing_checkout() {
        let t = TestEnv::linux(FakeExecutor::new())
            .with_fs(MockFileSystemOps::new().with_dir("/home/u/r"));
        let h = CloneHandler::new(&params(), t.env(), true).unwrap();
        assert_eq!(h.command(), "rm -rf /home/u/r");
        assert!(h.down().unwrap().changed);
        assert_eq!(t.exec.scripts(), vec!["rm -rf /home/u/r"]);
    }

    #[test]
    fn down_on_absent_checkout_is_a_no_op() {
        let t = TestEnv::linux(FakeExecutor::new());
        let h = CloneHandler::new(&params(), t.env(), true).unwrap();
        assert!(!h.down().unwrap().changed);
        assert!(t.exec.calls().is_empty());
    }

    #[test]
    fn refuses_to_remove_home() {
        let t = TestEnv::linux(FakeExecutor::new());
        let mut p = params();
        p.clone_path = Some("~".to_string());
        assert!(CloneHandler::new(&p, t.env(), true).is_err());
    }

    #[test]
    fn option_like_url_is_rejected() {
        let t = TestEnv::linux(FakeExecutor::new());
        let mut p = params();
        p.clone_url = Some("--upload-pack=touch /tmp/x".to_string());
        assert!(matches!(
            CloneHandler::new(&p, t.env(), false),
            Err(HandlerError::UnsafeIdentifier { .. })
        ));
    }
}
