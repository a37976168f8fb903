//! Clone-or-update helper for the `clone` kind.

use std::fmt;
use std::path::Path;

use anyhow::Result;

use crate::handlers::validate::shell_quote;
use crate::operations::FileSystemOps;
use crate::session::Session;

/// What [`clone_or_update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Fresh clone.
    Cloned,
    /// Existing checkout moved to a new commit.
    Updated,
    /// Existing checkout already at the remote head.
    AlreadyUpToDate,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cloned => write!(f, "Cloned"),
            Self::Updated => write!(f, "Updated"),
            Self::AlreadyUpToDate => write!(f, "Already up to date"),
        }
    }
}

/// Result of [`clone_or_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOutcome {
    /// `HEAD` before the update; `None` for a fresh clone.
    pub old_sha: Option<String>,
    /// `HEAD` after the operation.
    pub new_sha: String,
    /// What happened.
    pub status: SyncStatus,
}

/// Render the clone command for `url` into `path`.
#[must_use]
pub fn clone_command(url: &str, path: &Path, branch: Option<&str>) -> String {
    let path = path.to_string_lossy();
    let mut cmd = String::from("git clone");
    if let Some(branch) = branch {
        cmd.push_str(" --branch ");
        cmd.push_str(&shell_quote(branch));
    }
    format!("{cmd} {} {}", shell_quote(url), shell_quote(&path))
}

/// Render the update of an existing checkout at `path`.
///
/// With a branch, the branch is fetched and checked out before the
/// fast-forward so a changed `branch:` takes effect.
#[must_use]
pub fn update_command(path: &Path, branch: Option<&str>) -> String {
    let path = path.to_string_lossy();
    let git = format!("git -C {}", shell_quote(&path));
    match branch {
        Some(branch) => {
            let branch = shell_quote(branch);
            format!(
                "{git} fetch origin {branch} && {git} checkout {branch} && {git} pull --ff-only origin {branch}"
            )
        }
        None => format!("{git} pull --ff-only"),
    }
}

/// Clone `url` into `path`, or fast-forward an existing checkout.
///
/// An SSH URL whose clone fails on authentication is retried once over
/// HTTPS, which succeeds for public repositories.
///
/// # Errors
///
/// Returns an error if the clone or pull fails.
pub fn clone_or_update(
    session: &Session,
    fs: &dyn FileSystemOps,
    url: &str,
    path: &Path,
    branch: Option<&str>,
    sudo: Option<bool>,
) -> Result<CloneOutcome> {
    if fs.is_dir(&path.join(".git")) {
        let old_sha = head(session, path);
        session.execute(&update_command(path, branch), sudo)?;
        let new_sha = head(session, path).unwrap_or_default();
        let status = if old_sha.as_deref() == Some(new_sha.as_str()) {
            SyncStatus::AlreadyUpToDate
        } else {
            SyncStatus::Updated
        };
        return Ok(CloneOutcome {
            old_sha,
            new_sha,
            status,
        });
    }

    if let Err(e) = session.execute(&clone_command(url, path, branch), sudo) {
        let https = ssh_to_https(url).filter(|_| is_auth_failure(&format!("{e:#}")));
        let Some(https) = https else {
            return Err(e);
        };
        tracing::warn!("SSH authentication failed for {url}, retrying with {https}");
        session.execute(&clone_command(&https, path, branch), sudo)?;
    }
    Ok(CloneOutcome {
        old_sha: None,
        new_sha: head(session, path).unwrap_or_default(),
        status: SyncStatus::Cloned,
    })
}

fn head(session: &Session, path: &Path) -> Option<String> {
    let path = path.to_string_lossy();
    session.probe_output("git", &["-C", &path, "rev-parse", "HEAD"])
}

fn is_auth_failure(message: &str) -> bool {
    [
        "Permission denied (publickey",
        "Host key verification failed",
        "Could not read from remote repository",
    ]
    .iter()
    .any(|m| message.contains(m))
}

/// HTTPS equivalent of an SSH remote, if `url` is one.
///
/// Handles both `git@host:owner/repo.git` and `ssh://git@host/owner/repo.git`.
#[must_use]
pub fn ssh_to_https(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("ssh://") {
        let rest = rest.split_once('@').map_or(rest, |(_, r)| r);
        let (host, repo) = rest.split_once('/')?;
        let host = host.split_once(':').map_or(host, |(h, _)| h);
        return Some(format!("https://{host}/{repo}"));
    }
    let (user_host, repo) = url.split_once(':')?;
    if user_host.contains('/') || repo.starts_with("//") {
        return None;
    }
    let (_, host) = user_host.split_once('@')?;
    Some(format!("https://{host}/{repo}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::handlers::test_helpers::{FakeExecutor, session};
    use crate::operations::MockFileSystemOps;
    use std::sync::Arc;

    #[test]
    fn https_rewrites() {
        assert_eq!(
            ssh_to_https("git@github.com:o/r.git").as_deref(),
            Some("https://github.com/o/r.git")
        );
        assert_eq!(
            ssh_to_https("ssh://git@example.com:2222/o/r.git").as_deref(),
            Some("https://example.com/o/r.git")
        );
        assert_eq!(ssh_to_https("https://github.com/o/r.git"), None);
    }

    #[test]
    fn clone_command_rendering() {
        assert_eq!(
            clone_command("https://example.com/r.git", Path::new("/home/u/r"), Some("main")),
            "git clone --branch main https://example.com/r.git /home/u/r"
        );
    }

    #[test]
    fn fresh_clone() {
        let exec = Arc::new(FakeExecutor::new().respond("rev-parse HEAD", "abc123\n"));
        let s = session(Arc::clone(&exec));
        let out = clone_or_update(
            &s,
            &MockFileSystemOps::new(),
            "https://example.com/r.git",
            Path::new("/home/u/r"),
            None,
            None,
        )
        .unwrap();
        assert_eq!(out.status, SyncStatus::Cloned);
        assert_eq!(out.new_sha, "abc123");
        assert_eq!(exec.scripts(), vec!["git clone https://example.com/r.git /home/u/r"]);
    }

    #[test]
    fn existing_checkout_without_new_commits() {
        let exec = Arc::new(FakeExecutor::new().respond("rev-parse HEAD", "abc123\n"));
        let s = session(Arc::clone(&exec));
        let fs = MockFileSystemOps::new().with_dir("/home/u/r/.git");
        let out = clone_or_update(&s, &fs, "u", Path::new("/home/u/r"), None, None).unwrap();
        assert_eq!(out.status, SyncStatus::AlreadyUpToDate);
        assert_eq!(out.old_sha.as_deref(), Some("abc123"));
        assert_eq!(out.status.to_string(), "Already up to date");
        assert_eq!(exec.scripts(), vec!["git -C /home/u/r pull --ff-only"]);
    }

    #[test]
    fn existing_checkout_switches_to_declared_branch() {
        let exec = Arc::new(FakeExecutor::new().respond("rev-parse HEAD", "abc123\n"));
        let s = session(Arc::clone(&exec));
        let fs = MockFileSystemOps::new().with_dir("/home/u/r/.git");
        clone_or_update(&s, &fs, "u", Path::new("/home/u/r"), Some("dev"), None).unwrap();
        assert_eq!(
            exec.scripts(),
            vec![
                "git -C /home/u/r fetch origin dev && git -C /home/u/r checkout dev && \
                 git -C /home/u/r pull --ff-only origin dev"
            ]
        );
    }

    #[test]
    fn ssh_auth_failure_falls_back_to_https() {
        let exec = Arc::new(
            FakeExecutor::new()
                .fail_with("git@github.com:o/r.git", "Permission denied (publickey).")
                .respond("rev-parse HEAD", "def456\n"),
        );
        let s = session(Arc::clone(&exec));
        let out = clone_or_update(
            &s,
            &MockFileSystemOps::new(),
            "git@github.com:o/r.git",
            Path::new("/home/u/r"),
            None,
            None,
        )
        .unwrap();
        assert_eq!(out.status, SyncStatus::Cloned);
        assert_eq!(
            exec.scripts(),
            vec![
                "git clone git@github.com:o/r.git /home/u/r",
                "git clone https://github.com/o/r.git /home/u/r",
            ]
        );
    }

    #[test]
    fn other_failures_are_not_retried() {
        let exec = Arc::new(FakeExecutor::new().fail_with("git clone", "repository not found"));
        let s = session(Arc::clone(&exec));
        let res = clone_or_update(
            &s,
            &MockFileSystemOps::new(),
            "git@github.com:o/r.git",
            Path::new("/home/u/r"),
            None,
            None,
        );
        assert!(res.is_err());
        assert_eq!(exec.scripts().len(), 1);
    }
}
