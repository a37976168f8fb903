// Shared helpers for integration tests.
//
// Provides a scripted executor, a temporary home directory and a small
// harness that plans and applies blueprints through the public engine API
// without touching the real system.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;

use blueprint_cli::config::Settings;
use blueprint_cli::engine::{Engine, RunReport};
use blueprint_cli::exec::{ExecResult, Executor, SystemExecutor};
use blueprint_cli::logging::{Log, RuleStatus};
use blueprint_cli::platform::{Os, PackageManager, Platform};
use blueprint_cli::session::Prompter;
use blueprint_cli::status::Status;

/// Executor that records every invocation and answers from a script.
///
/// Commands succeed with empty output unless they match a `fail_on`
/// pattern or a `respond` pattern. `id -u` reports root so elevated
/// commands run without sudo. Shell scripts starting with a `passthrough`
/// prefix are really executed, which lets tests observe `mkdir` and `rm`
/// inside the temporary home.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    calls: Mutex<Vec<String>>,
    failures: Vec<String>,
    responses: Vec<(String, String)>,
    passthrough: Vec<String>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
            .respond("id -u", "0\n")
            .passthrough("mkdir -p ")
            .passthrough("rm -rf ")
    }

    pub fn fail_on(mut self, pattern: &str) -> Self {
        self.failures.push(pattern.to_string());
        self
    }

    pub fn respond(mut self, pattern: &str, stdout: &str) -> Self {
        self.responses.push((pattern.to_string(), stdout.to_string()));
        self
    }

    pub fn passthrough(mut self, prefix: &str) -> Self {
        self.passthrough.push(prefix.to_string());
        self
    }

    /// Every invocation as `program arg…`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Scripts passed to `sh -c`.
    pub fn scripts(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|c| c.strip_prefix("sh -c ").map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().expect("calls lock").clear();
    }

    fn answer(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().expect("calls lock").push(line.clone());

        if self.failures.iter().any(|p| line.contains(p.as_str())) {
            return Ok(ExecResult {
                stdout: String::new(),
                stderr: format!("scripted failure: {line}"),
                success: false,
                code: Some(1),
            });
        }
        if program == "sh"
            && let [_, script] = args
            && self.passthrough.iter().any(|p| script.starts_with(p.as_str()))
        {
            return SystemExecutor.run_unchecked(program, args);
        }
        let stdout = self
            .responses
            .iter()
            .find(|(p, _)| line.contains(p.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        Ok(ExecResult {
            stdout,
            stderr: String::new(),
            success: true,
            code: Some(0),
        })
    }
}

impl Executor for ScriptedExecutor {
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.answer(program, args)
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        _env: &[(&str, &str)],
        _input: Option<&str>,
    ) -> Result<ExecResult> {
        self.answer(program, args)
    }

    fn which(&self, _program: &str) -> bool {
        true
    }
}

/// Prompter that refuses every request; no integration scenario needs a
/// secret.
#[derive(Debug)]
pub struct NoPrompter;

impl Prompter for NoPrompter {
    fn password(&self, prompt: &str) -> Result<String> {
        anyhow::bail!("unexpected prompt: {prompt}")
    }
}

/// [`Log`] that only keeps rule outcomes.
#[derive(Debug, Default)]
pub struct RecordingLog {
    pub rules: Mutex<Vec<(String, RuleStatus)>>,
}

impl Log for RecordingLog {
    fn stage(&self, _msg: &str) {}
    fn info(&self, _msg: &str) {}
    fn debug(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
    fn dry_run(&self, _msg: &str) {}

    fn record_rule(&self, name: &str, status: RuleStatus, _message: Option<&str>) {
        self.rules
            .lock()
            .expect("rules lock")
            .push((name.to_string(), status));
    }
}

/// An isolated home directory with blueprints and a status file.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub exec: Arc<ScriptedExecutor>,
    pub platform: Platform,
}

impl Harness {
    pub fn linux(exec: ScriptedExecutor) -> Self {
        Self::new(exec, Platform::new(Os::Linux, Some(PackageManager::Apt)))
    }

    pub fn mac(exec: ScriptedExecutor) -> Self {
        Self::new(exec, Platform::new(Os::Mac, Some(PackageManager::Brew)))
    }

    fn new(exec: ScriptedExecutor, platform: Platform) -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp home"),
            exec: Arc::new(exec),
            platform,
        }
    }

    pub fn home(&self) -> &Path {
        self.dir.path()
    }

    pub fn status_path(&self) -> PathBuf {
        self.home().join("state").join("status.json")
    }

    /// Write `contents` to `name` under the home directory.
    pub fn write_blueprint(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.home().join(name);
        std::fs::write(&path, contents).expect("write blueprint");
        path
    }

    pub fn engine(&self) -> Engine {
        Engine::new(
            Arc::clone(&self.exec) as Arc<dyn Executor>,
            Arc::new(NoPrompter),
            self.platform.clone(),
            Settings::default(),
        )
        .with_home(self.home())
    }

    /// Plan and apply `blueprint`.
    pub fn apply(&self, blueprint: &Path) -> Result<RunReport> {
        let log = RecordingLog::default();
        let engine = self.engine();
        let plan = engine.plan(blueprint, &self.status_path(), &log)?;
        engine.apply(&plan, &self.status_path(), &log)
    }

    pub fn status(&self) -> Status {
        Status::load(&self.status_path()).expect("load status")
    }
}
