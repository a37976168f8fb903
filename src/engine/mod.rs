//! Reconciliation engine.
//!
//! A run has four phases:
//!
//! 1. **Load**: parse the blueprint (following includes) and the persisted
//!    status.
//! 2. **Resolve**: drop rules for other operating systems and order the rest
//!    by their `after:` declarations.
//! 3. **Drift**: synthesize uninstall rules for status records of this
//!    (blueprint, OS) scope that are no longer declared, append them and
//!    order the combined list again.
//! 4. **Execute**: run each rule's handler in order, fold the outcome into
//!    status, then persist status once.
//!
//! Phases 1–3 are [`Engine::plan`]; phase 4 is [`Engine::apply`]. Any error
//! before phase 4 leaves both the system and the status file untouched.

pub mod drift;
pub mod plan;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::blueprint::{Rule, parse_file};
use crate::config::{Settings, home_dir};
use crate::exec::Executor;
use crate::handlers::{Handler, HandlerEnv, RuleHandler};
use crate::logging::{Log, RuleStatus};
use crate::operations::{FileSystemOps, SystemFileSystemOps};
use crate::platform::Platform;
use crate::record::ExecutionRecord;
use crate::resolver::resolve;
use crate::secret::{Decryptor, OpensslDecryptor};
use crate::session::{Prompter, Session};
use crate::status::{Scope, Status};

/// One rule of a plan.
#[derive(Debug, Clone)]
pub struct PlannedRule {
    /// The rule to run.
    pub rule: Rule,
    /// Produced by the drift pass rather than declared.
    pub synthesized: bool,
}

/// Output of phases 1–3: everything needed to execute a run.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Canonical path of the blueprint.
    pub source: PathBuf,
    /// Scope every status record of this run is stamped with.
    pub scope: Scope,
    /// Rules in execution order, drift last.
    pub rules: Vec<PlannedRule>,
    /// Status as loaded.
    pub status: Status,
}

impl Plan {
    /// Directory relative paths in the blueprint resolve against.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        self.source.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Number of rules synthesized by the drift pass.
    #[must_use]
    pub fn drift_count(&self) -> usize {
        self.rules.iter().filter(|r| r.synthesized).count()
    }
}

/// Tally of an executed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Rules that modified the system.
    pub changed: usize,
    /// Rules already in the requested state.
    pub unchanged: usize,
    /// Rules not run because a dependency did not succeed.
    pub skipped: usize,
    /// Rules that errored.
    pub failed: usize,
}

impl RunReport {
    /// Every attempted rule succeeded and none was skipped.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Reconciles blueprints against the live system.
#[derive(Debug)]
pub struct Engine {
    executor: Arc<dyn Executor>,
    prompter: Arc<dyn Prompter>,
    platform: Platform,
    settings: Settings,
    decryptor: Arc<dyn Decryptor>,
    fs: Arc<dyn FileSystemOps>,
    home: PathBuf,
}

impl Engine {
    /// Create an engine using the real filesystem, `openssl` for
    /// decryption and the current user's home directory.
    #[must_use]
    pub fn new(
        executor: Arc<dyn Executor>,
        prompter: Arc<dyn Prompter>,
        platform: Platform,
        settings: Settings,
    ) -> Self {
        Self {
            decryptor: Arc::new(OpensslDecryptor::new(Arc::clone(&executor))),
            executor,
            prompter,
            platform,
            settings,
            fs: Arc::new(SystemFileSystemOps),
            home: home_dir(),
        }
    }

    /// Replace the decryptor.
    #[must_use]
    pub fn with_decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    /// Replace the filesystem probes.
    #[must_use]
    pub fn with_fs(mut self, fs: Arc<dyn FileSystemOps>) -> Self {
        self.fs = fs;
        self
    }

    /// Expand `~` against `home` instead of `$HOME`.
    #[must_use]
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    /// Effective platform.
    #[must_use]
    pub const fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Phases 1–3: load, resolve and diff for drift.
    ///
    /// # Errors
    ///
    /// Returns the [`ParseError`](crate::error::ParseError),
    /// [`ResolveError`](crate::error::ResolveError) or
    /// [`StatusError`](crate::error::StatusError) that stopped planning.
    pub fn plan(&self, blueprint: &Path, status_path: &Path, log: &dyn Log) -> Result<Plan> {
        log.stage("Loading blueprint");
        let source = dunce::canonicalize(blueprint).unwrap_or_else(|_| blueprint.to_path_buf());
        let rules = parse_file(&source)?;
        let status = Status::load(status_path)?;
        log.debug(&format!(
            "{} rules declared, {} status entries loaded",
            rules.len(),
            status.len()
        ));

        log.stage("Resolving dependencies");
        let scope = Scope::new(&source, self.platform.os.name());
        let applicable = self.filter_for_os(rules, log);
        let ordered = resolve(applicable)?;

        log.stage("Checking for drift");
        let synthesized = drift::synthesize_uninstalls(&status, &ordered, &scope, &self.home);
        if !synthesized.is_empty() {
            log.info(&format!(
                "{} resource(s) no longer declared will be removed",
                synthesized.len()
            ));
        }
        let combined = resolve(ordered.into_iter().chain(synthesized).collect())?;

        let rules = combined
            .into_iter()
            .map(|rule| PlannedRule {
                synthesized: rule.origin.is_none(),
                rule,
            })
            .collect();
        Ok(Plan {
            source,
            scope,
            rules,
            status,
        })
    }

    /// Keep rules for this OS. `after:` references to rules that only exist
    /// for other operating systems are dropped rather than left dangling.
    fn filter_for_os(&self, rules: Vec<Rule>, log: &dyn Log) -> Vec<Rule> {
        let (kept, dropped): (Vec<_>, Vec<_>) = rules
            .into_iter()
            .partition(|r| self.platform.applies_to(&r.os_list));
        if dropped.is_empty() {
            return kept;
        }
        log.debug(&format!(
            "{} rule(s) skipped for {}",
            dropped.len(),
            self.platform.os
        ));
        let kept_keys: HashSet<String> = kept.iter().map(Rule::dependency_key).collect();
        let foreign: HashSet<String> = dropped
            .iter()
            .map(Rule::dependency_key)
            .filter(|k| !kept_keys.contains(k))
            .collect();
        kept.into_iter()
            .map(|mut rule| {
                rule.after.retain(|a| !foreign.contains(a));
                rule
            })
            .collect()
    }

    /// Build the session and handler environment for one run.
    fn session(&self) -> Session {
        Session::new(
            Arc::clone(&self.executor),
            Arc::clone(&self.prompter),
            &self.settings.elevation_markers,
        )
    }

    /// Render `plan` for display without executing anything.
    #[must_use]
    pub fn render(&self, plan: &Plan) -> String {
        let session = self.session();
        let env = self.env(&session, plan);
        plan::render_plan(plan, env)
    }

    fn env<'a>(&'a self, session: &'a Session, plan: &'a Plan) -> HandlerEnv<'a> {
        HandlerEnv {
            session,
            platform: &self.platform,
            home: &self.home,
            base_path: plan.base_path(),
            fs: self.fs.as_ref(),
            decryptor: self.decryptor.as_ref(),
            prior: &plan.status,
            scope: &plan.scope,
        }
    }

    /// Phase 4: execute every rule of `plan` in order and persist the
    /// resulting status to `status_path`.
    ///
    /// Rule failures are reported, not returned: the run continues and the
    /// report counts them. A rule that runs after a failed or skipped rule
    /// it depends on is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the status file cannot be written.
    pub fn apply(&self, plan: &Plan, status_path: &Path, log: &dyn Log) -> Result<RunReport> {
        log.stage("Applying rules");
        let session = self.session();
        let env = self.env(&session, plan);
        let mut status = plan.status.clone();
        let mut failed_keys: HashSet<String> = HashSet::new();
        let mut report = RunReport::default();

        for planned in &plan.rules {
            let rule = &planned.rule;
            let key = rule.dependency_key();

            if let Some(dep) = rule.after.iter().find(|a| failed_keys.contains(*a)) {
                let reason = format!("dependency '{dep}' did not succeed");
                log.warn(&format!("skipping {key}: {reason}"));
                log.record_rule(&key, RuleStatus::Skipped, Some(&reason));
                failed_keys.insert(key);
                report.skipped += 1;
                continue;
            }

            let handler = match Handler::new(rule, env) {
                Ok(h) => h,
                Err(e) => {
                    let message = format!("{}: {e}", rule.location());
                    log.error(&message);
                    log.record_rule(&key, RuleStatus::Failed, Some(&message));
                    failed_keys.insert(key);
                    report.failed += 1;
                    continue;
                }
            };

            let label = handler.display_details(rule.is_uninstall());
            log.debug(&format!("{label}: {}", handler.command()));
            let result = if rule.is_uninstall() {
                handler.down()
            } else {
                handler.up()
            };
            // An uninstall narrows its command to what `down` found present.
            let command = handler.command();

            match result {
                Ok(outcome) => {
                    session.record(ExecutionRecord::success(&command, &outcome.message));
                    if outcome.changed {
                        log.info(&format!("{label}: {}", outcome.message));
                        log.record_rule(&label, RuleStatus::Ok, Some(&outcome.message));
                        report.changed += 1;
                    } else {
                        log.debug(&format!("{label}: {}", outcome.message));
                        log.record_rule(&label, RuleStatus::Unchanged, Some(&outcome.message));
                        report.unchanged += 1;
                    }
                }
                Err(e) => {
                    let error = format!("{e:#}");
                    session.record(ExecutionRecord::failure(&command, "", &error));
                    log.error(&format!("{label} ({}): {error}", rule.location()));
                    log.record_rule(&label, RuleStatus::Failed, Some(&error));
                    failed_keys.insert(key);
                    report.failed += 1;
                }
            }

            handler.update_status(&mut status, &session.records(), &plan.scope);
        }

        if status == plan.status {
            log.debug("status unchanged");
        } else {
            status.save(status_path)?;
            log.debug(&format!("status written to {}", status_path.display()));
        }
        Ok(report)
    }
}
