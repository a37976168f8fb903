//! Local LLM models pulled with Ollama.

use std::cell::OnceCell;

use anyhow::Result;
use chrono::Utc;

use super::tool::Tool;
use super::{HandlerEnv, Outcome, RuleHandler, validate};
use crate::blueprint::Params;
use crate::error::HandlerError;
use crate::record::{ExecutionRecord, command_succeeded};
use crate::status::identity::{remove, upsert};
use crate::status::{OllamaStatus, Scope, Status};

/// Pulls and removes Ollama models.
#[derive(Debug)]
pub struct OllamaHandler<'a> {
    env: HandlerEnv<'a>,
    models: Vec<String>,
    uninstall: bool,
    tool: Tool,
    /// Models found locally by `down`; only these are removed.
    present: OnceCell<Vec<String>>,
}

impl<'a> OllamaHandler<'a> {
    /// # Errors
    ///
    /// Returns [`HandlerError::UnsafeIdentifier`] for a bad model name.
    pub fn new(params: &Params, env: HandlerEnv<'a>, uninstall: bool) -> Result<Self, HandlerError> {
        validate::identifiers("model", &params.models)?;
        Ok(Self {
            tool: Tool::ollama(&env),
            env,
            models: params.models.clone(),
            uninstall,
            present: OnceCell::new(),
        })
    }

    fn has_model(&self, model: &str) -> bool {
        self.tool.succeeds(&self.env, &["show", model])
    }

    fn bootstrap_command(&self) -> String {
        if self.env.platform.is_mac() {
            Tool::brew().wrap("brew install ollama")
        } else {
            "curl -fsSL https://ollama.com/install.sh | sh".to_string()
        }
    }

    fn join(&self, verb: &str) -> String {
        let models = match self.present.get() {
            Some(present) if self.uninstall && !present.is_empty() => present,
            _ => &self.models,
        };
        let steps = models
            .iter()
            .map(|m| format!("ollama {verb} {m}"))
            .collect::<Vec<_>>()
            .join(" && ");
        self.tool.wrap(&steps)
    }
}

impl RuleHandler for OllamaHandler<'_> {
    fn up(&self) -> Result<Outcome> {
        let session = self.env.session;
        session.ensure_prerequisite(
            "ollama",
            || self.tool.is_present(&self.env),
            &self.bootstrap_command(),
        )?;
        if self.models.iter().all(|m| self.has_model(m)) {
            return Ok(Outcome::unchanged(format!(
                "already pulled: {}",
                self.models.join(", ")
            )));
        }
        session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("pulled {}", self.models.join(", "))))
    }

    fn down(&self) -> Result<Outcome> {
        let present: Vec<String> = if self.tool.is_present(&self.env) {
            self.models
                .iter()
                .filter(|m| self.has_model(m))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        let removed = present.join(", ");
        let _ = self.present.set(present);
        if removed.is_empty() {
            return Ok(Outcome::unchanged(format!("not present: {}", self.models.join(", "))));
        }
        self.env.session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("removed {removed}")))
    }

    fn update_status(&self, status: &mut Status, records: &[ExecutionRecord], scope: &Scope) {
        if !command_succeeded(records, &self.command()) {
            return;
        }
        for model in &self.models {
            if self.uninstall {
                remove(&mut status.ollama, model, scope);
            } else {
                upsert(
                    &mut status.ollama,
                    OllamaStatus {
                        model: model.clone(),
                        applied_at: Utc::now(),
                        scope: scope.clone(),
                    },
                );
            }
        }
    }

    fn command(&self) -> String {
        self.join(if self.uninstall { "rm" } else { "pull" })
    }

    fn display_info(&self) -> String {
        format!("models: {}", self.models.join(", "))
    }

    fn needs_sudo(&self) -> Option<bool> {
        Some(false)
    }

    fn display_details(&self, uninstall: bool) -> String {
        let verb = if uninstall { "Removing model" } else { "Pulling model" };
        format!("{verb} {}", self.models.join(", "))
    }
}

pub(super) fn uninstall_params(record: &OllamaStatus) -> Params {
    Params {
        models: vec![record.model.clone()],
        ..Params::default()
    }
}
