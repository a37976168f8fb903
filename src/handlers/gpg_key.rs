//! Apt signing keys and their repository entries.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;

use super::{HandlerEnv, Outcome, RuleHandler, validate};
use crate::blueprint::Params;
use crate::error::HandlerError;
use crate::record::{ExecutionRecord, command_succeeded};
use crate::status::identity::{remove, upsert};
use crate::status::{GpgKeyStatus, Scope, Status};

const KEYRING_DIR: &str = "/usr/share/keyrings";
const SOURCES_DIR: &str = "/etc/apt/sources.list.d";

/// Installs an apt keyring and its sources entry.
#[derive(Debug)]
pub struct GpgKeyHandler<'a> {
    env: HandlerEnv<'a>,
    keyring: String,
    url: String,
    deb_url: Option<String>,
    keyring_path: PathBuf,
    list_path: PathBuf,
    uninstall: bool,
}

impl<'a> GpgKeyHandler<'a> {
    /// # Errors
    ///
    /// Returns a [`HandlerError`] for an unsafe keyring name or URL.
    pub fn new(params: &Params, env: HandlerEnv<'a>, uninstall: bool) -> Result<Self, HandlerError> {
        let keyring = params.gpg_keyring.as_deref().unwrap_or_default();
        validate::identifier("keyring", keyring)?;
        if keyring.contains('/') {
            return Err(HandlerError::UnsafeIdentifier {
                what: "keyring".to_string(),
                value: keyring.to_string(),
            });
        }
        // The URL is only needed to fetch; synthesized removals may lack it.
        let url = params.gpg_url.clone().unwrap_or_default();
        if !uninstall {
            validate::url("key URL", &url)?;
        }
        let deb_url = params
            .deb_url
            .as_deref()
            .map(|d| {
                let d = d.trim();
                let d = d.strip_prefix("deb ").unwrap_or(d).trim();
                if d.chars().any(char::is_control) || d.is_empty() {
                    return Err(HandlerError::UnsafeIdentifier {
                        what: "deb-url".to_string(),
                        value: d.to_string(),
                    });
                }
                Ok(d.to_string())
            })
            .transpose()?;
        Ok(Self {
            env,
            keyring_path: PathBuf::from(KEYRING_DIR).join(format!("{keyring}.gpg")),
            list_path: PathBuf::from(SOURCES_DIR).join(format!("{keyring}.list")),
            keyring: keyring.to_string(),
            url,
            deb_url,
            uninstall,
        })
    }

    fn is_present(&self) -> bool {
        self.env.fs.exists(&self.keyring_path)
            && (self.deb_url.is_none() || self.env.fs.exists(&self.list_path))
    }
}

impl RuleHandler for GpgKeyHandler<'_> {
    fn up(&self) -> Result<Outcome> {
        if self.is_present() {
            return Ok(Outcome::unchanged(format!("keyring {} already present", self.keyring)));
        }
        self.env.session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("installed keyring {}", self.keyring)))
    }

    fn down(&self) -> Result<Outcome> {
        if !self.env.fs.exists(&self.keyring_path) && !self.env.fs.exists(&self.list_path) {
            return Ok(Outcome::unchanged(format!("keyring {} already absent", self.keyring)));
        }
        self.env.session.execute(&self.command(), self.needs_sudo())?;
        Ok(Outcome::changed(format!("removed keyring {}", self.keyring)))
    }

    fn update_status(&self, status: &mut Status, records: &[ExecutionRecord], scope: &Scope) {
        if !command_succeeded(records, &self.command()) {
            return;
        }
        if self.uninstall {
            remove(&mut status.gpg_keys, &self.keyring, scope);
        } else {
            upsert(
                &mut status.gpg_keys,
                GpgKeyStatus {
                    keyring: self.keyring.clone(),
                    url: self.url.clone(),
                    deb_url: self.deb_url.clone(),
                    applied_at: Utc::now(),
                    scope: scope.clone(),
                },
            );
        }
    }

    fn command(&self) -> String {
        let keyring = self.keyring_path.display();
        let list = self.list_path.display();
        if self.uninstall {
            return format!("rm -f {keyring} {list}");
        }
        let mut cmd = format!(
            "curl -fsSL {} | gpg --dearmor --yes -o {keyring}",
            validate::shell_quote(&self.url)
        );
        if let Some(deb) = &self.deb_url {
            let line = format!("deb [signed-by={keyring}] {deb}");
            cmd.push_str(&format!(" && echo {} > {list}", validate::shell_quote(&line)));
        }
        cmd
    }

    fn display_info(&self) -> String {
        match &self.deb_url {
            Some(deb) => format!("{} from {} ({deb})", self.keyring, self.url),
            None => format!("{} from {}", self.keyring, self.url),
        }
    }

    fn needs_sudo(&self) -> Option<bool> {
        Some(true)
    }

    fn display_details(&self, uninstall: bool) -> String {
        if uninstall {
            format!("Removing keyring {}", self.keyring)
        } else {
            format!("Adding keyring {}", self.keyring)
        }
    }
}

pub(super) fn uninstall_params(record: &GpgKeyStatus) -> Params {
    Params {
        gpg_keyring: Some(record.keyring.clone()),
        gpg_url: Some(record.url.clone()),
        deb_url: record.deb_url.clone(),
        ..Params::default()
    }
}
