#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for planning and applying whole blueprints.
//!
//! Each test runs the engine against a temporary home directory with a
//! scripted executor, then inspects the persisted status document and the
//! commands that were issued.

mod common;

use common::{Harness, ScriptedExecutor};

use blueprint_cli::error::ResolveError;
use blueprint_cli::status::Scope;

// ---------------------------------------------------------------------------
// End-to-end
// ---------------------------------------------------------------------------

#[test]
fn clone_then_mkdir_records_both() {
    let h = Harness::linux(ScriptedExecutor::new().respond("rev-parse HEAD", "abc123\n"));
    let bp = h.write_blueprint(
        "setup.bp",
        "clone https://example.com/r.git to: ~/r id: c1\nmkdir ~/r/build after: c1\n",
    );

    let report = h.apply(&bp).unwrap();
    assert!(report.is_success());
    assert_eq!(report.changed, 2);

    let scripts = h.exec.scripts();
    let clone = scripts.iter().position(|s| s.starts_with("git clone")).unwrap();
    let mkdir = scripts.iter().position(|s| s.starts_with("mkdir -p")).unwrap();
    assert!(clone < mkdir);
    assert!(h.home().join("r/build").is_dir());

    let status = h.status();
    assert_eq!(status.clones.len(), 1);
    assert_eq!(status.clones[0].path, "~/r");
    assert_eq!(status.clones[0].sha, "abc123");
    assert_eq!(status.mkdirs.len(), 1);
    assert_eq!(status.mkdirs[0].path, "~/r/build");
}

// ---------------------------------------------------------------------------
// Idempotence
// ---------------------------------------------------------------------------

#[test]
fn second_run_changes_nothing() {
    let h = Harness::linux(ScriptedExecutor::new());
    let bp = h.write_blueprint("setup.bp", "mkdir ~/code\nmkdir ~/notes permissions: 700\n");

    let first = h.apply(&bp).unwrap();
    assert_eq!(first.changed, 2);
    let written = std::fs::read(h.status_path()).unwrap();

    h.exec.clear();
    let second = h.apply(&bp).unwrap();
    assert!(second.is_success());
    assert_eq!(second.changed, 0);
    assert_eq!(second.unchanged, 2);
    assert!(h.exec.scripts().is_empty(), "{:?}", h.exec.scripts());
    assert_eq!(std::fs::read(h.status_path()).unwrap(), written);
}

// ---------------------------------------------------------------------------
// Drift
// ---------------------------------------------------------------------------

#[test]
fn dropping_a_rule_uninstalls_it() {
    let h = Harness::linux(ScriptedExecutor::new());
    let bp = h.write_blueprint("setup.bp", "mkdir ~/keep\nmkdir ~/gone\n");
    h.apply(&bp).unwrap();
    assert!(h.home().join("gone").is_dir());

    h.write_blueprint("setup.bp", "mkdir ~/keep\n");
    h.exec.clear();
    let report = h.apply(&bp).unwrap();
    assert!(report.is_success());

    let gone = h.home().join("gone");
    assert!(!gone.exists());
    assert!(h.home().join("keep").is_dir());
    assert!(
        h.exec
            .scripts()
            .iter()
            .any(|s| s.starts_with("rm -rf ") && s.trim_end_matches('\'').ends_with("/gone"))
    );
    let paths: Vec<_> = h.status().mkdirs.iter().map(|m| m.path.clone()).collect();
    assert_eq!(paths, vec!["~/keep"]);
}

#[test]
fn respelling_a_home_path_keeps_the_directory() {
    let h = Harness::linux(ScriptedExecutor::new());
    let bp = h.write_blueprint("setup.bp", "mkdir ~/data\n");
    h.apply(&bp).unwrap();
    assert!(h.home().join("data").is_dir());

    let absolute = h.home().join("data");
    h.write_blueprint("setup.bp", &format!("mkdir {}/\n", absolute.display()));
    h.exec.clear();
    let report = h.apply(&bp).unwrap();
    assert!(report.is_success());

    assert!(absolute.is_dir());
    assert!(
        !h.exec.scripts().iter().any(|s| s.starts_with("rm -rf")),
        "{:?}",
        h.exec.scripts()
    );
    let paths: Vec<_> = h.status().mkdirs.iter().map(|m| m.path.clone()).collect();
    assert_eq!(paths, vec!["~/data"]);
}

#[test]
fn plan_marks_drift_without_executing() {
    let h = Harness::linux(ScriptedExecutor::new());
    let bp = h.write_blueprint("setup.bp", "mkdir ~/keep\nmkdir ~/gone\n");
    h.apply(&bp).unwrap();

    h.write_blueprint("setup.bp", "mkdir ~/keep\n");
    h.exec.clear();
    let engine = h.engine();
    let plan = engine
        .plan(&bp, &h.status_path(), &common::RecordingLog::default())
        .unwrap();
    assert_eq!(plan.drift_count(), 1);
    let rendered = engine.render(&plan);
    assert!(rendered.contains("[drift]"), "{rendered}");
    assert!(h.exec.scripts().is_empty());
    assert!(h.home().join("gone").is_dir());
}

// ---------------------------------------------------------------------------
// Status identity
// ---------------------------------------------------------------------------

#[test]
fn same_resource_from_two_blueprints_is_tracked_twice() {
    let h = Harness::mac(ScriptedExecutor::new());
    let a = h.write_blueprint("a.bp", "mkdir ~/x on: [mac]\n");
    let b = h.write_blueprint("b.bp", "mkdir ~/x on: [mac]\n");
    h.apply(&a).unwrap();
    h.apply(&b).unwrap();

    let status = h.status();
    assert_eq!(status.mkdirs.len(), 2);
    assert!(status.mkdirs.iter().all(|m| m.path == "~/x" && m.scope.os == "mac"));

    h.write_blueprint("a.bp", "# nothing left\n");
    h.apply(&a).unwrap();

    let status = h.status();
    assert_eq!(status.mkdirs.len(), 1);
    assert_eq!(status.mkdirs[0].scope, Scope::new(&b, "mac"));
}

// ---------------------------------------------------------------------------
// Ordering and fatal errors
// ---------------------------------------------------------------------------

#[test]
fn cycle_aborts_before_any_command() {
    let h = Harness::linux(ScriptedExecutor::new());
    let bp = h.write_blueprint("setup.bp", "mkdir ~/a after: ~/b\nmkdir ~/b after: ~/a\n");

    let err = h.apply(&bp).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ResolveError>(),
        Some(ResolveError::DependencyCycle { .. })
    ));
    assert!(h.exec.calls().is_empty());
    assert!(!h.status_path().exists());
}

#[test]
fn rules_for_other_os_are_ignored() {
    let h = Harness::linux(ScriptedExecutor::new());
    let bp = h.write_blueprint(
        "setup.bp",
        "mkdir ~/mac-only on: [macos] id: m\nmkdir ~/both after: m\n",
    );
    let report = h.apply(&bp).unwrap();
    assert_eq!(report.changed, 1);
    assert!(!h.home().join("mac-only").exists());
    assert!(h.home().join("both").is_dir());
}

// ---------------------------------------------------------------------------
// Command/record coupling
// ---------------------------------------------------------------------------

#[test]
fn failed_install_records_nothing_and_skips_dependents() {
    let h = Harness::linux(
        ScriptedExecutor::new()
            .fail_on("dpkg -s")
            .fail_on("apt-get install"),
    );
    let bp = h.write_blueprint("setup.bp", "install curl on: [linux]\nmkdir ~/after after: curl\n");

    let report = h.apply(&bp).unwrap();
    assert!(!report.is_success());
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
    assert!(h.exec.scripts().contains(&"apt-get install -y curl".to_string()));

    let status = h.status();
    assert!(status.packages.is_empty());
    assert!(status.mkdirs.is_empty());
    assert!(!h.home().join("after").exists());
}

// ---------------------------------------------------------------------------
// Version coexistence
// ---------------------------------------------------------------------------

#[test]
fn asdf_versions_coexist_and_uninstall_independently() {
    // 18.0.0 reports as installed; 20.0.0 never does.
    let h = Harness::linux(ScriptedExecutor::new().fail_on("asdf where nodejs 20.0.0"));
    let bp = h.write_blueprint("tools.bp", "asdf nodejs@18.0.0\n");
    h.apply(&bp).unwrap();

    h.write_blueprint("tools.bp", "asdf nodejs@18.0.0\nasdf nodejs@20.0.0\n");
    h.apply(&bp).unwrap();
    let versions: Vec<_> = h.status().asdf.iter().map(|a| a.version.clone()).collect();
    assert_eq!(versions, vec!["18.0.0", "20.0.0"]);

    h.write_blueprint("tools.bp", "asdf nodejs@20.0.0\n");
    h.exec.clear();
    let report = h.apply(&bp).unwrap();
    assert!(report.is_success());
    let scripts = h.exec.scripts();
    assert!(
        scripts.iter().any(|s| s.ends_with("&& asdf uninstall nodejs 18.0.0")),
        "{scripts:?}"
    );
    assert!(!scripts.iter().any(|s| s.contains("asdf uninstall nodejs 20.0.0")));

    let remaining: Vec<_> = h
        .status()
        .asdf
        .iter()
        .map(|a| format!("{}@{}", a.plugin, a.version))
        .collect();
    assert_eq!(remaining, vec!["nodejs@20.0.0"]);
}
