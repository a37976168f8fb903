//! Shared fakes for handler, session and engine unit tests.
#![allow(clippy::expect_used, missing_docs)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};

use super::HandlerEnv;
use crate::exec::{ExecResult, Executor};
use crate::operations::MockFileSystemOps;
use crate::platform::{Os, PackageManager, Platform};
use crate::secret::Decryptor;
use crate::session::{MockPrompter, Session};
use crate::status::{Scope, Status};

#[derive(Debug)]
struct Call {
    line: String,
    args: Vec<String>,
    input: Option<String>,
}

/// Scripted [`Executor`] that never spawns a process.
///
/// Every call succeeds with empty output unless a configured substring of
/// the call line (`program arg1 arg2 …`) says otherwise. Calls are recorded
/// for later assertions.
#[derive(Debug, Default)]
#[allow(clippy::struct_field_names)]
pub struct FakeExecutor {
    failures: Vec<(String, String)>,
    responses: Vec<(String, String)>,
    provides: Vec<(String, String)>,
    programs: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
}

#[allow(clippy::expect_used)]
impl FakeExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls containing `pattern` exit 1.
    #[must_use]
    pub fn fail_on(self, pattern: &str) -> Self {
        self.fail_with(pattern, "")
    }

    /// Calls containing `pattern` exit 1 with `stderr`.
    #[must_use]
    pub fn fail_with(mut self, pattern: &str, stderr: &str) -> Self {
        self.failures.push((pattern.to_string(), stderr.to_string()));
        self
    }

    /// Calls containing `pattern` print `stdout`.
    #[must_use]
    pub fn respond(mut self, pattern: &str, stdout: &str) -> Self {
        self.responses.push((pattern.to_string(), stdout.to_string()));
        self
    }

    /// `program` is on PATH from the start.
    #[must_use]
    pub fn with_program(self, program: &str) -> Self {
        self.programs
            .lock()
            .expect("programs poisoned")
            .insert(program.to_string());
        self
    }

    /// A call containing `pattern` puts `program` on PATH, after a short
    /// delay that widens any race between callers.
    #[must_use]
    pub fn provides(mut self, pattern: &str, program: &str) -> Self {
        self.provides.push((pattern.to_string(), program.to_string()));
        self
    }

    /// Every call line, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock_calls().iter().map(|c| c.line.clone()).collect()
    }

    /// The script argument of every `… -c <script>` call, in order.
    pub fn scripts(&self) -> Vec<String> {
        self.lock_calls()
            .iter()
            .filter_map(|c| {
                let pos = c.args.iter().position(|a| a == "-c")?;
                c.args.get(pos + 1).cloned()
            })
            .collect()
    }

    /// Standard input passed to each call that had some.
    pub fn inputs(&self) -> Vec<String> {
        self.lock_calls()
            .iter()
            .filter_map(|c| c.input.clone())
            .collect()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<Call>> {
        self.calls.lock().expect("calls poisoned")
    }

    fn handle(&self, program: &str, args: &[&str], input: Option<&str>) -> ExecResult {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.lock_calls().push(Call {
            line: line.clone(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            input: input.map(str::to_string),
        });

        if let Some((_, stderr)) = self.failures.iter().find(|(p, _)| line.contains(p.as_str())) {
            return ExecResult {
                stdout: String::new(),
                stderr: stderr.clone(),
                success: false,
                code: Some(1),
            };
        }
        for (pattern, program) in &self.provides {
            if line.contains(pattern.as_str()) {
                std::thread::sleep(Duration::from_millis(20));
                self.programs
                    .lock()
                    .expect("programs poisoned")
                    .insert(program.clone());
            }
        }
        let stdout = self
            .responses
            .iter()
            .find(|(p, _)| line.contains(p.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        ExecResult {
            stdout,
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }
}

impl Executor for FakeExecutor {
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        Ok(self.handle(program, args, None))
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        _env: &[(&str, &str)],
        input: Option<&str>,
    ) -> Result<ExecResult> {
        Ok(self.handle(program, args, input))
    }

    #[allow(clippy::expect_used)]
    fn which(&self, program: &str) -> bool {
        self.programs
            .lock()
            .expect("programs poisoned")
            .contains(program)
    }
}

/// Decryptor whose ciphertext is the plaintext prefixed with `ENC:`.
#[derive(Debug)]
pub struct FakeDecryptor {
    pub password: String,
}

impl Decryptor for FakeDecryptor {
    fn decrypt(&self, ciphertext: &[u8], password: &str) -> Result<Vec<u8>> {
        if password != self.password {
            bail!("bad decrypt");
        }
        match ciphertext.strip_prefix(b"ENC:") {
            Some(plain) => Ok(plain.to_vec()),
            None => bail!("not an encrypted file"),
        }
    }
}

/// Prompter that fails the test if it is ever asked.
pub fn silent_prompter() -> MockPrompter {
    let mut p = MockPrompter::new();
    p.expect_password().never();
    p
}

/// Session over `exec` that must not prompt.
pub fn session(exec: Arc<FakeExecutor>) -> Session {
    Session::new(exec, Arc::new(silent_prompter()), &[])
}

/// Everything a handler borrows, owned in one place.
#[derive(Debug)]
pub struct TestEnv {
    pub exec: Arc<FakeExecutor>,
    pub session: Session,
    pub platform: Platform,
    pub home: PathBuf,
    pub base: PathBuf,
    pub fs: MockFileSystemOps,
    pub decryptor: FakeDecryptor,
    pub prior: Status,
    pub scope: Scope,
}

impl TestEnv {
    /// Linux with apt-get, home `/home/u`, blueprint `/home/u/setup.bp`.
    pub fn linux(exec: FakeExecutor) -> Self {
        Self::on(Platform::new(Os::Linux, Some(PackageManager::Apt)), exec)
    }

    pub fn mac(exec: FakeExecutor) -> Self {
        Self::on(Platform::new(Os::Mac, Some(PackageManager::Brew)), exec)
    }

    fn on(platform: Platform, exec: FakeExecutor) -> Self {
        let exec = Arc::new(exec);
        let scope = Scope::new(Path::new("/home/u/setup.bp"), platform.os.name());
        Self {
            session: session(Arc::clone(&exec)),
            exec,
            platform,
            home: PathBuf::from("/home/u"),
            base: PathBuf::from("/home/u"),
            fs: MockFileSystemOps::new(),
            decryptor: FakeDecryptor {
                password: "open sesame".to_string(),
            },
            prior: Status::default(),
            scope,
        }
    }

    #[must_use]
    pub fn with_fs(mut self, fs: MockFileSystemOps) -> Self {
        self.fs = fs;
        self
    }

    /// Replace the prompter with one answering every prompt with `answer`.
    #[must_use]
    pub fn answering(mut self, answer: &str) -> Self {
        let answer = answer.to_string();
        let mut p = MockPrompter::new();
        p.expect_password().returning(move |_| Ok(answer.clone()));
        self.session = Session::new(Arc::<FakeExecutor>::clone(&self.exec), Arc::new(p), &[]);
        self
    }

    #[must_use]
    pub fn with_prior(mut self, prior: Status) -> Self {
        self.prior = prior;
        self
    }

    pub fn env(&self) -> HandlerEnv<'_> {
        HandlerEnv {
            session: &self.session,
            platform: &self.platform,
            home: &self.home,
            base_path: &self.base,
            fs: &self.fs,
            decryptor: &self.decryptor,
            prior: &self.prior,
            scope: &self.scope,
        }
    }
}
