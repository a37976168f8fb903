//! System packages through the platform package manager.

use std::cell::OnceCell;

use anyhow::Result;
use chrono::Utc;

use super::{HandlerEnv, Outcome, RuleHandler, validate};
use crate::blueprint::Params;
use crate::error::HandlerError;
use crate::platform::PackageManager;
use crate::record::{ExecutionRecord, command_succeeded};
use crate::status::identity::{remove, upsert};
use crate::status::{PackageStatus, Scope, Status};

/// Installs and removes system packages.
#[derive(Debug)]
pub struct InstallHandler<'a> {
    env: HandlerEnv<'a>,
    packages: Vec<String>,
    manager: PackageManager,
    uninstall: bool,
    /// Packages found installed by `down`; only these are removed.
    present: OnceCell<Vec<String>>,
}

impl<'a> InstallHandler<'a> {
    /// # Errors
    ///
    /// Returns [`HandlerError::NoPackageManager`] when the platform has
    /// none, or [`HandlerError::UnsafeIdentifier`] for a bad package name.
    pub fn new(params: &Params, env: HandlerEnv<'a>, uninstall: bool) -> Result<Self, HandlerError> {
        validate::identifiers("package", &params.packages)?;
        let manager = env
            .platform
            .package_manager
            .ok_or_else(|| HandlerError::NoPackageManager(env.platform.os.to_string()))?;
        Ok(Self {
            env,
            packages: params.packages.clone(),
            manager,
            uninstall,
            present: OnceCell::new(),
        })
    }

    fn is_installed(&self, package: &str) -> bool {
        let session = self.env.session;
        match self.manager {
            PackageManager::Apt => session.probe("dpkg", &["-s", package]),
            PackageManager::Dnf => session.probe("rpm", &["-q", package]),
            PackageManager::Pacman => session.probe("pacman", &["-Q", package]),
            PackageManager::Brew => session.probe("brew", &["list", "--versions", package]),
        }
    }

    fn targets(&self) -> &[String] {
        match self.present.get() {
            Some(present) if self.uninstall && !present.is_empty() => present,
            _ => &self.packages,
        }
    }
}

impl RuleHandler for InstallHandler<'_> {
    fn up(&self) -> Result<Outcome> {
        let missing: Vec<&str> = self
            .packages
            .iter()
            .filter(|p| !self.is_installed(p))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(Outcome::unchanged(format!(
                "already installed: {}",
                self.packages.join(", ")
            )));
        }
        self.env.session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("installed {}", missing.join(", "))))
    }

    fn down(&self) -> Result<Outcome> {
        let present: Vec<String> = self
            .packages
            .iter()
            .filter(|p| self.is_installed(p))
            .cloned()
            .collect();
        let removed = present.join(", ");
        let _ = self.present.set(present);
        if removed.is_empty() {
            return Ok(Outcome::unchanged(format!(
                "not installed: {}",
                self.packages.join(", ")
            )));
        }
        self.env.session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("removed {removed}")))
    }

    fn update_status(&self, status: &mut Status, records: &[ExecutionRecord], scope: &Scope) {
        if !command_succeeded(records, &self.command()) {
            return;
        }
        for name in &self.packages {
            if self.uninstall {
                remove(&mut status.packages, name, scope);
            } else {
                upsert(
                    &mut status.packages,
                    PackageStatus {
                        name: name.clone(),
                        package_manager: self.manager.to_string(),
                        applied_at: Utc::now(),
                        scope: scope.clone(),
                    },
                );
            }
        }
    }

    fn command(&self) -> String {
        let verb = match (self.manager, self.uninstall) {
            (PackageManager::Apt, false) => "apt-get install -y",
            (PackageManager::Apt, true) => "apt-get remove -y",
            (PackageManager::Dnf, false) => "dnf install -y",
            (PackageManager::Dnf, true) => "dnf remove -y",
            (PackageManager::Pacman, false) => "pacman -S --noconfirm",
            (PackageManager::Pacman, true) => "pacman -R --noconfirm",
            (PackageManager::Brew, false) => "brew install",
            (PackageManager::Brew, true) => "brew uninstall",
        };
        format!("{verb} {}", self.targets().join(" "))
    }

    fn display_info(&self) -> String {
        format!("packages: {} ({})", self.packages.join(", "), self.manager)
    }

    fn needs_sudo(&self) -> Option<bool> {
        // Homebrew refuses to run as root.
        (self.manager == PackageManager::Brew).then_some(false)
    }

    fn display_details(&self, uninstall: bool) -> String {
        let verb = if uninstall { "Uninstalling" } else { "Installing" };
        format!("{verb} {}", self.packages.join(", "))
    }
}

pub(super) fn uninstall_params(record: &PackageStatus) -> Params {
    Params {
        packages: vec![record.name.clone()],
        ..Params::default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::handlers::test_helpers::{FakeExecutor, TestEnv};
    use crate::platform::{Os, Platform};

    fn params(pkgs: &[&str]) -> Params {
        Params {
            packages: pkgs.iter().map(|p| (*p).to_string()).collect(),
            ..Params::default()
        }
    }

    #[test]
    fn command_per_manager() {
        let t = TestEnv::linux(FakeExecutor::new());
        let h = InstallHandler::new(&params(&["curl", "git"]), t.env(), false).unwrap();
        assert_eq!(h.command(), "apt-get install -y curl git");
        assert_eq!(h.needs_sudo(), None);

        let t = TestEnv::mac(FakeExecutor::new());
        let h = InstallHandler::new(&params(&["jq"]), t.env(), true).unwrap();
        assert_eq!(h.command(), "brew uninstall jq");
        assert_eq!(h.needs_sudo(), Some(false));
    }

    #[test]
    fn already_installed_is_a_no_op() {
        let t = TestEnv::linux(FakeExecutor::new());
        let h = InstallHandler::new(&params(&["curl"]), t.env(), false).unwrap();
        let out = h.up().unwrap();
        assert!(!out.changed);
        assert!(t.exec.scripts().is_empty());
    }

    #[test]
    fn missing_package_is_installed() {
        let t = TestEnv::linux(FakeExecutor::new().fail_on("dpkg -s curl"));
        let h = InstallHandler::new(&params(&["curl"]), t.env(), false).unwrap();
        let out = h.up().unwrap();
        assert!(out.changed);
        assert_eq!(t.exec.scripts(), vec!["apt-get install -y curl"]);
        assert!(t.exec.calls().iter().any(|c| c.starts_with("sudo -n sh -c")));
    }

    #[test]
    fn down_on_absent_package_is_a_no_op() {
        let t = TestEnv::linux(FakeExecutor::new().fail_on("dpkg -s"));
        let h = InstallHandler::new(&params(&["curl"]), t.env(), true).unwrap();
        assert!(!h.down().unwrap().changed);
        assert!(t.exec.scripts().is_empty());
    }

    #[test]
    fn down_removes_only_installed_packages() {
        let t = TestEnv::linux(FakeExecutor::new().fail_on("dpkg -s git"));
        let h = InstallHandler::new(&params(&["curl", "git"]), t.env(), true).unwrap();
        let out = h.down().unwrap();
        assert_eq!(out.message, "removed curl");
        assert_eq!(t.exec.scripts(), vec!["apt-get remove -y curl"]);
        assert_eq!(h.command(), "apt-get remove -y curl");

        let mut status = Status::default();
        for name in ["curl", "git"] {
            status.packages.push(PackageStatus {
                name: name.to_string(),
                package_manager: "apt-get".to_string(),
                applied_at: Utc::now(),
                scope: t.scope.clone(),
            });
        }
        h.update_status(&mut status, &t.session.records(), &t.scope);
        assert!(status.packages.is_empty());
    }

    #[test]
    fn failed_command_leaves_status_empty() {
        let t = TestEnv::linux(FakeExecutor::new());
        let h = InstallHandler::new(&params(&["curl"]), t.env(), false).unwrap();
        let mut status = Status::default();
        let records = vec![ExecutionRecord::failure(
            "apt-get install -y curl",
            "",
            "exit status 100",
        )];
        h.update_status(&mut status, &records, &t.scope);
        assert!(status.packages.is_empty());
    }

    #[test]
    fn success_records_each_package() {
        let t = TestEnv::linux(FakeExecutor::new());
        let h = InstallHandler::new(&params(&["curl", "git"]), t.env(), false).unwrap();
        let mut status = Status::default();
        let records = vec![ExecutionRecord::success("apt-get install -y curl git", "")];
        h.update_status(&mut status, &records, &t.scope);
        assert_eq!(status.packages.len(), 2);
        assert_eq!(status.packages[1].name, "git");
        assert_eq!(status.packages[1].package_manager, "apt-get");

        let down = InstallHandler::new(&params(&["curl"]), t.env(), true).unwrap();
        let records = vec![ExecutionRecord::success("apt-get remove -y curl", "")];
        down.update_status(&mut status, &records, &t.scope);
        assert_eq!(status.packages.len(), 1);
        assert_eq!(status.packages[0].name, "git");
    }

    #[test]
    fn unsafe_package_name_is_rejected() {
        let t = TestEnv::linux(FakeExecutor::new());
        let err = InstallHandler::new(&params(&["curl; rm -rf /"]), t.env(), false).unwrap_err();
        assert!(matches!(err, HandlerError::UnsafeIdentifier { .. }));
    }

    #[test]
    fn no_package_manager() {
        let mut t = TestEnv::linux(FakeExecutor::new());
        t.platform = Platform::new(Os::Linux, None);
        let err = InstallHandler::new(&params(&["curl"]), t.env(), false).unwrap_err();
        assert_eq!(err, HandlerError::NoPackageManager("linux".to_string()));
    }
}
