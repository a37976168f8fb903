//! Per-kind rule handlers.
//!
//! Each resource kind has one handler type implementing [`RuleHandler`]. The
//! closed [`Handler`] enum dispatches over them so that adding a kind is a
//! compile error everywhere a kind must be handled.
//!
//! # Contract
//!
//! - [`up`](RuleHandler::up) probes first and returns an unchanged
//!   [`Outcome`] when the resource is already present.
//! - [`down`](RuleHandler::down) never errors on an absent resource.
//! - [`command`](RuleHandler::command) is byte-identical to the text
//!   `up`/`down` hand to the session, and
//!   [`update_status`](RuleHandler::update_status) only mutates status when
//!   that exact text succeeded in this run.

pub mod asdf;
pub mod clone;
pub mod decrypt;
pub mod gpg_key;
pub mod homebrew;
pub mod install;
pub mod known_hosts;
pub mod mkdir;
pub mod ollama;
pub mod tool;
pub mod validate;

#[cfg(test)]
pub mod test_helpers;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::blueprint::{Action, Params, Rule};
use crate::config::{canonical_path, expand_home};
use crate::error::HandlerError;
use crate::operations::FileSystemOps;
use crate::platform::Platform;
use crate::record::ExecutionRecord;
use crate::secret::Decryptor;
use crate::session::Session;
use crate::status::identity::{find_where, remove_where, upsert};
use crate::status::{Scope, Status, StatusEntry};

/// Collaborators a handler borrows for one run.
#[derive(Debug, Clone, Copy)]
pub struct HandlerEnv<'a> {
    /// Command runner shared by every handler in the run.
    pub session: &'a Session,
    /// Effective platform, after any OS override.
    pub platform: &'a Platform,
    /// Directory `~` expands to.
    pub home: &'a Path,
    /// Directory of the blueprint file; relative sources resolve against it.
    pub base_path: &'a Path,
    /// Filesystem probes.
    pub fs: &'a dyn FileSystemOps,
    /// Decrypts `decrypt` sources.
    pub decryptor: &'a dyn Decryptor,
    /// Status as loaded at the start of the run.
    pub prior: &'a Status,
    /// Provenance stamped on every record this run writes.
    pub scope: &'a Scope,
}

impl HandlerEnv<'_> {
    /// Expand a declared path: `~` against the home directory.
    #[must_use]
    pub fn expand(&self, path: &str) -> PathBuf {
        expand_home(Path::new(path), self.home)
    }

    /// Identity form of a declared path; see [`canonical_path`].
    #[must_use]
    pub fn canonical(&self, path: &str) -> String {
        canonical_path(path, self.home)
    }
}

/// Upsert a path-keyed record, first dropping in-scope records that name
/// the same path under another spelling.
pub(crate) fn upsert_path<T: StatusEntry>(env: &HandlerEnv<'_>, list: &mut Vec<T>, entry: T) -> bool {
    let key = entry.natural_key();
    let aliased = remove_where(list, entry.scope(), |k| k != key && env.canonical(k) == key);
    upsert(list, entry) || aliased
}

/// Remove every in-scope record naming `key` under any spelling.
pub(crate) fn remove_path<T: StatusEntry>(
    env: &HandlerEnv<'_>,
    list: &mut Vec<T>,
    key: &str,
    scope: &Scope,
) -> bool {
    remove_where(list, scope, |k| env.canonical(k) == key)
}

/// Find the in-scope record naming `key` under any spelling.
pub(crate) fn find_path<'s, T: StatusEntry>(
    env: &HandlerEnv<'_>,
    list: &'s [T],
    key: &str,
    scope: &Scope,
) -> Option<&'s T> {
    find_where(list, scope, |k| env.canonical(k) == key)
}

/// Result of a successful `up` or `down`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Human-readable result, shown in the run summary.
    pub message: String,
    /// `false` when the system was already in the requested state.
    pub changed: bool,
}

impl Outcome {
    /// The system was modified.
    pub fn changed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            changed: true,
        }
    }

    /// The resource was already in the requested state.
    pub fn unchanged(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            changed: false,
        }
    }
}

/// Behaviour shared by every resource kind.
pub trait RuleHandler {
    /// Bring the resource into existence.
    ///
    /// # Errors
    ///
    /// Returns an error if a command fails or the target is missing.
    fn up(&self) -> Result<Outcome>;

    /// Remove the resource.
    ///
    /// # Errors
    ///
    /// Returns an error if a command fails.
    fn down(&self) -> Result<Outcome>;

    /// Fold this run's outcome into `status`, but only if
    /// [`command`](Self::command) succeeded according to `records`.
    fn update_status(&self, status: &mut Status, records: &[ExecutionRecord], scope: &Scope);

    /// Shell text this handler runs, for the direction it was built for.
    fn command(&self) -> String;

    /// Parameter summary for plans.
    fn display_info(&self) -> String;

    /// Elevation override; `None` defers to the session heuristic.
    fn needs_sudo(&self) -> Option<bool> {
        None
    }

    /// Short progress label.
    fn display_details(&self, uninstall: bool) -> String;
}

/// Handler for any concrete kind.
#[derive(Debug)]
pub enum Handler<'a> {
    /// System packages.
    Install(install::InstallHandler<'a>),
    /// Git checkouts.
    Clone(clone::CloneHandler<'a>),
    /// Directories.
    Mkdir(mkdir::MkdirHandler<'a>),
    /// Decrypted private files.
    Decrypt(decrypt::DecryptHandler<'a>),
    /// asdf runtimes.
    Asdf(asdf::AsdfHandler<'a>),
    /// `known_hosts` entries.
    KnownHosts(known_hosts::KnownHostsHandler<'a>),
    /// Apt keyrings.
    GpgKey(gpg_key::GpgKeyHandler<'a>),
    /// Homebrew formulas.
    Homebrew(homebrew::HomebrewHandler<'a>),
    /// Ollama models.
    Ollama(ollama::OllamaHandler<'a>),
}

macro_rules! dispatch {
    ($self:ident, $h:ident => $body:expr) => {
        match $self {
            Handler::Install($h) => $body,
            Handler::Clone($h) => $body,
            Handler::Mkdir($h) => $body,
            Handler::Decrypt($h) => $body,
            Handler::Asdf($h) => $body,
            Handler::KnownHosts($h) => $body,
            Handler::GpgKey($h) => $body,
            Handler::Homebrew($h) => $body,
            Handler::Ollama($h) => $body,
        }
    };
}

impl<'a> Handler<'a> {
    /// Build the handler for `rule`. An `uninstall` rule is dispatched to its
    /// recovered kind with the reversal flag set.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] if the kind cannot be recovered or a
    /// parameter fails validation.
    pub fn new(rule: &Rule, env: HandlerEnv<'a>) -> Result<Self, HandlerError> {
        let uninstall = rule.is_uninstall();
        let params = &rule.params;
        let kind = rule.kind().ok_or_else(|| HandlerError::InvalidParameter {
            param: "uninstall".to_string(),
            value: rule.dependency_key(),
            reason: "no resource parameters to uninstall".to_string(),
        })?;
        Ok(match kind {
            Action::Install => Self::Install(install::InstallHandler::new(params, env, uninstall)?),
            Action::Clone => Self::Clone(clone::CloneHandler::new(params, env, uninstall)?),
            Action::Mkdir => Self::Mkdir(mkdir::MkdirHandler::new(params, env, uninstall)?),
            Action::Decrypt => Self::Decrypt(decrypt::DecryptHandler::new(params, env, uninstall)?),
            Action::Asdf => Self::Asdf(asdf::AsdfHandler::new(params, env, uninstall)?),
            Action::KnownHosts => {
                Self::KnownHosts(known_hosts::KnownHostsHandler::new(params, env, uninstall)?)
            }
            Action::GpgKey => Self::GpgKey(gpg_key::GpgKeyHandler::new(params, env, uninstall)?),
            Action::Homebrew => {
                Self::Homebrew(homebrew::HomebrewHandler::new(params, env, uninstall)?)
            }
            Action::Ollama => Self::Ollama(ollama::OllamaHandler::new(params, env, uninstall)?),
            // `Rule::kind` never yields `Uninstall`.
            Action::Uninstall => {
                return Err(HandlerError::InvalidParameter {
                    param: "uninstall".to_string(),
                    value: rule.dependency_key(),
                    reason: "nested uninstall".to_string(),
                });
            }
        })
    }
}

impl RuleHandler for Handler<'_> {
    fn up(&self) -> Result<Outcome> {
        dispatch!(self, h => h.up())
    }

    fn down(&self) -> Result<Outcome> {
        dispatch!(self, h => h.down())
    }

    fn update_status(&self, status: &mut Status, records: &[ExecutionRecord], scope: &Scope) {
        dispatch!(self, h => h.update_status(status, records, scope));
    }

    fn command(&self) -> String {
        dispatch!(self, h => h.command())
    }

    fn display_info(&self) -> String {
        dispatch!(self, h => h.display_info())
    }

    fn needs_sudo(&self) -> Option<bool> {
        dispatch!(self, h => h.needs_sudo())
    }

    fn display_details(&self, uninstall: bool) -> String {
        dispatch!(self, h => h.display_details(uninstall))
    }
}

/// Whether records of `kind` are keyed by a filesystem path.
const fn is_path_kind(kind: Action) -> bool {
    matches!(kind, Action::Clone | Action::Mkdir | Action::Decrypt)
}

/// Natural keys a rule's parameters declare for its kind. Paths are in
/// [`canonical_path`] form so every spelling of one path compares equal.
#[must_use]
pub fn declared_keys(kind: Action, params: &Params, home: &Path) -> Vec<String> {
    let one = |v: &Option<String>| v.iter().cloned().collect::<Vec<_>>();
    let keys = match kind {
        Action::Install => params.packages.clone(),
        Action::Clone => one(&params.clone_path),
        Action::Mkdir => one(&params.mkdir),
        Action::Decrypt => one(&params.decrypt_path),
        Action::Asdf => params.asdf_packages.clone(),
        Action::KnownHosts => one(&params.known_host),
        Action::GpgKey => one(&params.gpg_keyring),
        Action::Homebrew => params.formulas.clone(),
        Action::Ollama => params.models.clone(),
        Action::Uninstall => Vec::new(),
    };
    if is_path_kind(kind) {
        keys.iter().map(|k| canonical_path(k, home)).collect()
    } else {
        keys
    }
}

/// Uninstall rules for every `kind` record in `scope` that no rule in
/// `rules` declares any more. Rules of the kind, uninstall rules included,
/// count as declarations.
#[must_use]
pub fn find_uninstall_rules(
    kind: Action,
    status: &Status,
    rules: &[Rule],
    scope: &Scope,
    home: &Path,
) -> Vec<Rule> {
    let declared: HashSet<String> = rules
        .iter()
        .filter(|r| r.kind() == Some(kind))
        .flat_map(|r| declared_keys(kind, &r.params, home))
        .collect();
    let key = |k: String| if is_path_kind(kind) { canonical_path(&k, home) } else { k };
    let d = Declared {
        keys: &declared,
        scope,
        key: &key,
    };
    match kind {
        Action::Install => d.synthesize(&status.packages, install::uninstall_params),
        Action::Clone => d.synthesize(&status.clones, clone::uninstall_params),
        Action::Mkdir => d.synthesize(&status.mkdirs, mkdir::uninstall_params),
        Action::Decrypt => d.synthesize(&status.decrypts, decrypt::uninstall_params),
        Action::Asdf => d.synthesize(&status.asdf, asdf::uninstall_params),
        Action::KnownHosts => d.synthesize(&status.known_hosts, known_hosts::uninstall_params),
        Action::GpgKey => d.synthesize(&status.gpg_keys, gpg_key::uninstall_params),
        Action::Homebrew => d.synthesize(&status.homebrew, homebrew::uninstall_params),
        Action::Ollama => d.synthesize(&status.ollama, ollama::uninstall_params),
        Action::Uninstall => Vec::new(),
    }
}

struct Declared<'d> {
    keys: &'d HashSet<String>,
    scope: &'d Scope,
    key: &'d dyn Fn(String) -> String,
}

impl Declared<'_> {
    fn synthesize<T: StatusEntry>(&self, records: &[T], to_params: impl Fn(&T) -> Params) -> Vec<Rule> {
        let mut seen = HashSet::new();
        crate::status::identity::in_scope(records, self.scope)
            .filter(|r| {
                let key = (self.key)(r.natural_key());
                !self.keys.contains(&key) && seen.insert(key)
            })
            .map(|r| Rule::new(Action::Uninstall, to_params(r)))
            .collect()
    }
}

/// Refuse to recursively remove paths whose loss would be catastrophic.
pub(crate) fn guard_removal(env: &HandlerEnv<'_>, target: &Path) -> Result<(), HandlerError> {
    if target == Path::new("/") || target == env.home || target.as_os_str().is_empty() {
        return Err(HandlerError::InvalidParameter {
            param: "path".to_string(),
            value: target.display().to_string(),
            reason: "refusing to remove this directory".to_string(),
        });
    }
    Ok(())
}
