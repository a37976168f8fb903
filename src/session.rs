//! Execution and credential session for one run.
//!
//! All shell-level actions go through [`Session::execute`], which decides
//! whether a command needs elevation, obtains the elevation credential at
//! most once per run, skips byte-identical commands that already succeeded,
//! and appends an [`ExecutionRecord`] for every command it runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context as _, Result, bail};

use crate::error::HandlerError;
use crate::exec::{ExecResult, Executor};
use crate::record::ExecutionRecord;

/// Command substrings that mark a command as needing elevation.
pub const DEFAULT_ELEVATION_MARKERS: &[&str] = &[
    "apt-get ",
    "dnf ",
    "pacman ",
    " /etc/",
    " '/etc/",
    " /usr/",
    " '/usr/",
    " /opt/",
    " '/opt/",
    " /var/",
    " '/var/",
];

/// Source of interactive secrets.
#[cfg_attr(test, mockall::automock)]
pub trait Prompter: Send + Sync + fmt::Debug {
    /// Ask for a hidden value.
    ///
    /// # Errors
    ///
    /// Returns an error if no terminal is available or input is aborted.
    fn password(&self, prompt: &str) -> Result<String>;
}

/// [`Prompter`] reading from the terminal without echo.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn password(&self, prompt: &str) -> Result<String> {
        dialoguer::Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .context("failed to read password from terminal")
    }
}

/// How elevated commands are run for the rest of the session.
#[derive(Clone)]
enum Credential {
    /// Already running as root.
    Root,
    /// `sudo -n` works without a password.
    Passwordless,
    Password(String),
    /// Elevation was attempted and failed; do not prompt again.
    Unavailable(String),
}

/// Per-run execution state shared by every handler.
pub struct Session {
    executor: Arc<dyn Executor>,
    prompter: Arc<dyn Prompter>,
    markers: Vec<String>,
    credential: Mutex<Option<Credential>>,
    /// Output of commands that already succeeded, keyed by exact text.
    completed: Mutex<HashMap<String, String>>,
    records: Mutex<Vec<ExecutionRecord>>,
    secrets: Mutex<HashMap<String, String>>,
    prerequisites: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("executor", &self.executor)
            .field("markers", &self.markers)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session. `extra_markers` extend [`DEFAULT_ELEVATION_MARKERS`].
    #[must_use]
    pub fn new(
        executor: Arc<dyn Executor>,
        prompter: Arc<dyn Prompter>,
        extra_markers: &[String],
    ) -> Self {
        let markers = DEFAULT_ELEVATION_MARKERS
            .iter()
            .map(|m| (*m).to_string())
            .chain(extra_markers.iter().cloned())
            .collect();
        Self {
            executor,
            prompter,
            markers,
            credential: Mutex::new(None),
            completed: Mutex::new(HashMap::new()),
            records: Mutex::new(Vec::new()),
            secrets: Mutex::new(HashMap::new()),
            prerequisites: Mutex::new(HashMap::new()),
        }
    }

    /// Underlying executor.
    #[must_use]
    pub fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    /// Generic elevation heuristic: does `cmd` contain a marker substring?
    #[must_use]
    pub fn needs_elevation(&self, cmd: &str) -> bool {
        self.markers.iter().any(|m| cmd.contains(m.as_str()))
    }

    /// Run `cmd` through `sh -c`, elevated when `sudo` says so or, if `sudo`
    /// is `None`, when [`needs_elevation`](Self::needs_elevation) does.
    ///
    /// A command whose exact text already succeeded in this session is not
    /// run again; its earlier output is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned, elevation is
    /// unavailable, or the command exits non-zero.
    pub fn execute(&self, cmd: &str, sudo: Option<bool>) -> Result<String> {
        if let Some(output) = self.lock_completed().get(cmd) {
            tracing::debug!("already ran this session: {cmd}");
            return Ok(output.clone());
        }

        let elevate = sudo.unwrap_or_else(|| self.needs_elevation(cmd));
        tracing::debug!("run{}: {cmd}", if elevate { " (elevated)" } else { "" });

        let result = if elevate {
            self.run_elevated(cmd)
        } else {
            self.executor.run_unchecked("sh", &["-c", cmd])
        };

        match result {
            Err(e) => {
                self.record(ExecutionRecord::failure(cmd, "", format!("{e:#}")));
                Err(e)
            }
            Ok(r) if r.success => {
                let output = r.combined_output();
                self.record(ExecutionRecord::success(cmd, output.clone()));
                self.lock_completed().insert(cmd.to_string(), output.clone());
                Ok(output)
            }
            Ok(r) => {
                let output = r.combined_output();
                let error = exit_description(&r);
                self.record(ExecutionRecord::failure(cmd, output.clone(), error.clone()));
                if output.is_empty() {
                    bail!("`{cmd}` failed ({error})");
                }
                bail!("`{cmd}` failed ({error}): {output}");
            }
        }
    }

    fn run_elevated(&self, cmd: &str) -> Result<ExecResult> {
        match self.credential()? {
            Credential::Root => self.executor.run_unchecked("sh", &["-c", cmd]),
            Credential::Passwordless => self.executor.run_unchecked("sudo", &["-n", "sh", "-c", cmd]),
            Credential::Password(password) => self.executor.run_with_input(
                "sudo",
                &["-S", "-p", "", "sh", "-c", cmd],
                &[],
                Some(&format!("{password}\n")),
            ),
            Credential::Unavailable(reason) => bail!("elevation unavailable: {reason}"),
        }
    }

    /// The elevation credential, established on first use.
    fn credential(&self) -> Result<Credential> {
        let mut guard = self
            .credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(c) = guard.as_ref() {
            return Ok(c.clone());
        }

        let credential = if self
            .executor
            .run_unchecked("id", &["-u"])
            .is_ok_and(|r| r.success && r.stdout.trim() == "0")
        {
            Credential::Root
        } else if self.probe("sudo", &["-n", "true"]) {
            Credential::Passwordless
        } else {
            match self.prompter.password("[sudo] password") {
                Ok(password) => {
                    let verified = self
                        .executor
                        .run_with_input("sudo", &["-S", "-p", "", "-v"], &[], Some(&format!("{password}\n")))
                        .is_ok_and(|r| r.success);
                    if verified {
                        Credential::Password(password)
                    } else {
                        Credential::Unavailable("sudo rejected the password".to_string())
                    }
                }
                Err(e) => Credential::Unavailable(format!("{e:#}")),
            }
        };
        *guard = Some(credential.clone());
        Ok(credential)
    }

    /// Run a read-only probe. Probes are not recorded.
    pub fn probe(&self, program: &str, args: &[&str]) -> bool {
        self.executor
            .run_unchecked(program, args)
            .is_ok_and(|r| r.success)
    }

    /// Trimmed stdout of a successful probe.
    pub fn probe_output(&self, program: &str, args: &[&str]) -> Option<String> {
        self.executor
            .run_unchecked(program, args)
            .ok()
            .filter(|r| r.success)
            .map(|r| r.stdout.trim().to_string())
    }

    /// Whether `program` is on `PATH`.
    #[must_use]
    pub fn which(&self, program: &str) -> bool {
        self.executor.which(program)
    }

    /// Append a record to this run's log.
    pub fn record(&self, record: ExecutionRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Snapshot of this run's records.
    #[must_use]
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Password for `id`, prompted on first use and then cached in memory.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::MissingSecret`] if the prompt fails or yields
    /// an empty password.
    pub fn secret(&self, id: &str) -> Result<String> {
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(s) = secrets.get(id) {
            return Ok(s.clone());
        }
        let password = self
            .prompter
            .password(&format!("Password for '{id}'"))
            .ok()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| HandlerError::MissingSecret(id.to_string()))?;
        secrets.insert(id.to_string(), password.clone());
        Ok(password)
    }

    /// Make sure a prerequisite tool is installed, running `install_cmd` at
    /// most once even if several callers need the tool at the same time.
    ///
    /// `is_present` is checked before and again after taking the tool's
    /// lock, so a caller that waited on another's install skips its own.
    /// Returns `true` if this call performed the install.
    ///
    /// # Errors
    ///
    /// Returns an error if the install command fails.
    pub fn ensure_prerequisite(
        &self,
        tool: &str,
        is_present: impl Fn() -> bool,
        install_cmd: &str,
    ) -> Result<bool> {
        if is_present() {
            return Ok(false);
        }
        let lock = Arc::clone(
            self.prerequisites
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(tool.to_string())
                .or_default(),
        );
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        if is_present() {
            return Ok(false);
        }
        tracing::info!("installing prerequisite {tool}");
        self.execute(install_cmd, Some(false))
            .with_context(|| format!("failed to install {tool}"))?;
        Ok(true)
    }

    fn lock_completed(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn exit_description(r: &ExecResult) -> String {
    r.code
        .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit status {c}"))
}
