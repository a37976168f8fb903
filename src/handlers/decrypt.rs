//! Encrypted files decrypted to a private destination.

use std::cell::OnceCell;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chrono::Utc;

use super::{HandlerEnv, Outcome, RuleHandler, find_path, remove_path, upsert_path, validate};
use crate::blueprint::Params;
use crate::error::HandlerError;
use crate::record::{ExecutionRecord, command_succeeded};
use crate::secret::sha256_hex;
use crate::status::{DecryptStatus, Scope, Status};

const DEFAULT_PASSWORD_ID: &str = "default";

/// Decrypts one file to a private destination.
#[derive(Debug)]
pub struct DecryptHandler<'a> {
    env: HandlerEnv<'a>,
    /// Encrypted file as declared.
    file: String,
    source: PathBuf,
    /// Canonical destination; the status key.
    dest: String,
    target: PathBuf,
    password_id: String,
    uninstall: bool,
    digest: OnceCell<String>,
}

impl<'a> DecryptHandler<'a> {
    /// # Errors
    ///
    /// Returns a [`HandlerError`] if the source or destination is missing.
    pub fn new(params: &Params, env: HandlerEnv<'a>, uninstall: bool) -> Result<Self, HandlerError> {
        let file = params
            .decrypt_file
            .clone()
            .ok_or_else(|| HandlerError::MissingTarget("encrypted file".to_string()))?;
        let dest = params
            .decrypt_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| env.canonical(p))
            .ok_or_else(|| HandlerError::MissingTarget(format!("destination for {file}")))?;
        let password_id = params
            .password_id
            .clone()
            .unwrap_or_else(|| DEFAULT_PASSWORD_ID.to_string());
        validate::identifier("password-id", &password_id)?;

        let expanded = env.expand(&file);
        let source = if expanded.is_absolute() {
            expanded
        } else {
            env.base_path.join(expanded)
        };
        let target = env.expand(&dest);
        Ok(Self {
            env,
            file,
            source,
            dest,
            target,
            password_id,
            uninstall,
            digest: OnceCell::new(),
        })
    }

    /// Digest recorded by an earlier run, if the destination still holds
    /// exactly that plaintext.
    fn unchanged_digest(&self) -> Option<String> {
        let prior = find_path(&self.env, &self.env.prior.decrypts, &self.dest, self.env.scope)
            .filter(|r| r.encrypted_file == self.file)?;
        let current = self.env.fs.read(&self.target).ok()?;
        (sha256_hex(&current) == prior.sha256).then(|| prior.sha256.clone())
    }
}

impl RuleHandler for DecryptHandler<'_> {
    fn up(&self) -> Result<Outcome> {
        if let Some(digest) = self.unchanged_digest() {
            let _ = self.digest.set(digest);
            return Ok(Outcome::unchanged(format!("{} already decrypted", self.dest)));
        }
        if !self.env.fs.exists(&self.source) {
            return Err(HandlerError::MissingTarget(self.source.display().to_string()).into());
        }

        let password = self.env.session.secret(&self.password_id)?;
        let ciphertext = self.env.fs.read(&self.source)?;
        let plaintext = self
            .env
            .decryptor
            .decrypt(&ciphertext, &password)
            .with_context(|| format!("failed to decrypt {}", self.file))?;
        let digest = sha256_hex(&plaintext);

        let same = self
            .env
            .fs
            .read(&self.target)
            .is_ok_and(|current| sha256_hex(&current) == digest);
        let _ = self.digest.set(digest);
        if same {
            return Ok(Outcome::unchanged(format!("{} already decrypted", self.dest)));
        }
        self.env.fs.write_private(&self.target, &plaintext)?;
        Ok(Outcome::changed(format!("decrypted {} to {}", self.file, self.dest)))
    }

    fn down(&self) -> Result<Outcome> {
        if !self.env.fs.exists(&self.target) {
            return Ok(Outcome::unchanged(format!("{} already absent", self.dest)));
        }
        self.env.session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("removed {}", self.dest)))
    }

    fn update_status(&self, status: &mut Status, records: &[ExecutionRecord], scope: &Scope) {
        if !command_succeeded(records, &self.command()) {
            return;
        }
        if self.uninstall {
            remove_path(&self.env, &mut status.decrypts, &self.dest, scope);
            return;
        }
        let Some(sha256) = self.digest.get() else {
            return;
        };
        upsert_path(
            &self.env,
            &mut status.decrypts,
            DecryptStatus {
                encrypted_file: self.file.clone(),
                dest_path: self.dest.clone(),
                password_id: self.password_id.clone(),
                sha256: sha256.clone(),
                applied_at: Utc::now(),
                scope: scope.clone(),
            },
        );
    }

    /// Decryption runs in-process; the rendered text identifies the action
    /// in records and plans.
    fn command(&self) -> String {
        let target = self.target.to_string_lossy();
        if self.uninstall {
            format!("rm -f {}", validate::shell_quote(&target))
        } else {
            format!(
                "decrypt {} to {}",
                validate::shell_quote(&self.source.to_string_lossy()),
                validate::shell_quote(&target)
            )
        }
    }

    fn display_info(&self) -> String {
        format!(
            "{} -> {} (password-id {})",
            self.file, self.dest, self.password_id
        )
    }

    fn display_details(&self, uninstall: bool) -> String {
        if uninstall {
            format!("Removing decrypted {}", self.dest)
        } else {
            format!("Decrypting {}", self.file)
        }
    }
}

pub(super) fn uninstall_params(record: &DecryptStatus) -> Params {
    Params {
        decrypt_file: Some(record.encrypted_file.clone()),
        decrypt_path: Some(record.dest_path.clone()),
        password_id: Some(record.password_id.clone()),
        ..Params::default()
    }
}
