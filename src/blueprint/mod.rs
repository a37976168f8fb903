//! Rule model: one parsed directive of a blueprint file.
//!
//! A [`Rule`] is immutable once parsed. Kind-specific values live in a flat
//! [`Params`] bag so that an `uninstall` rule can carry the parameters of any
//! concrete kind and have that kind recovered from which fields are set.

pub mod parser;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub use parser::parse_file;

/// Directive action. Every variant except [`Action::Uninstall`] is a
/// concrete resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    /// System packages through the platform package manager.
    Install,
    /// A git repository checked out to a path.
    Clone,
    /// A directory, optionally with a mode.
    Mkdir,
    /// An encrypted file decrypted to a private destination.
    Decrypt,
    /// Runtime versions through asdf.
    Asdf,
    /// A host key in `~/.ssh/known_hosts`.
    KnownHosts,
    /// An apt signing keyring and its sources entry.
    GpgKey,
    /// Homebrew formulas.
    Homebrew,
    /// Ollama models.
    Ollama,
    /// Reversal of the concrete kind its parameters describe.
    Uninstall,
}

impl Action {
    /// All concrete kinds, in the order the drift pass visits them.
    pub const KINDS: [Self; 9] = [
        Self::Install,
        Self::Clone,
        Self::Mkdir,
        Self::Decrypt,
        Self::Asdf,
        Self::KnownHosts,
        Self::GpgKey,
        Self::Homebrew,
        Self::Ollama,
    ];

    /// Keyword used in blueprint files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Clone => "clone",
            Self::Mkdir => "mkdir",
            Self::Decrypt => "decrypt",
            Self::Asdf => "asdf",
            Self::KnownHosts => "known_hosts",
            Self::GpgKey => "gpg-key",
            Self::Homebrew => "homebrew",
            Self::Ollama => "ollama",
            Self::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::KINDS
            .into_iter()
            .chain(std::iter::once(Self::Uninstall))
            .find(|a| a.name() == s)
            .ok_or_else(|| format!("unknown action '{s}'"))
    }
}

/// Kind-specific parameters. Only the fields of the rule's kind are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    /// `install`: system package names.
    pub packages: Vec<String>,
    /// `clone`: repository URL.
    pub clone_url: Option<String>,
    /// `clone`: destination path as declared.
    pub clone_path: Option<String>,
    /// `clone`: branch to check out.
    pub branch: Option<String>,
    /// `decrypt`: encrypted source file.
    pub decrypt_file: Option<String>,
    /// `decrypt`: destination of the plaintext.
    pub decrypt_path: Option<String>,
    /// `decrypt`: which cached password to use.
    pub password_id: Option<String>,
    /// `mkdir`: directory path as declared.
    pub mkdir: Option<String>,
    /// `mkdir`: octal permission string.
    pub permissions: Option<String>,
    /// `asdf`: `plugin@version` entries.
    pub asdf_packages: Vec<String>,
    /// `known_hosts`: host name.
    pub known_host: Option<String>,
    /// `known_hosts`: key type passed to `ssh-keyscan -t`.
    pub key_type: Option<String>,
    /// `gpg-key`: keyring name.
    pub gpg_keyring: Option<String>,
    /// `gpg-key`: URL of the armoured key.
    pub gpg_url: Option<String>,
    /// `gpg-key`: apt repository line written next to the keyring.
    pub deb_url: Option<String>,
    /// `homebrew`: formula names.
    pub formulas: Vec<String>,
    /// `ollama`: model names.
    pub models: Vec<String>,
}

impl Params {
    /// Recover the concrete kind from the populated fields.
    ///
    /// Fields are checked in a fixed priority order so that a parameter bag
    /// with several fields set always maps to the same kind.
    #[must_use]
    pub fn inferred_kind(&self) -> Option<Action> {
        if !self.packages.is_empty() {
            Some(Action::Install)
        } else if self.clone_url.is_some() {
            Some(Action::Clone)
        } else if self.decrypt_file.is_some() {
            Some(Action::Decrypt)
        } else if self.mkdir.is_some() {
            Some(Action::Mkdir)
        } else if !self.asdf_packages.is_empty() {
            Some(Action::Asdf)
        } else if self.known_host.is_some() {
            Some(Action::KnownHosts)
        } else if self.gpg_keyring.is_some() {
            Some(Action::GpgKey)
        } else if !self.formulas.is_empty() {
            Some(Action::Homebrew)
        } else if !self.models.is_empty() {
            Some(Action::Ollama)
        } else {
            None
        }
    }
}

/// Where a rule was declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    /// Declaring file, after include resolution.
    pub file: PathBuf,
    /// 1-based line number.
    pub line: usize,
}

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// What the rule does.
    pub action: Action,
    /// Kind-specific parameters.
    pub params: Params,
    /// Explicit identity for `after:` references.
    pub id: Option<String>,
    /// Dependency keys this rule must run after.
    pub after: Vec<String>,
    /// Operating systems the rule applies to; empty means all.
    pub os_list: Vec<String>,
    /// Free-form label shown in plans.
    pub group: Option<String>,
    /// `None` for rules synthesized by the drift pass.
    pub origin: Option<Origin>,
}

impl Rule {
    /// Create a rule with no id, dependencies, OS filter or origin.
    #[must_use]
    pub const fn new(action: Action, params: Params) -> Self {
        Self {
            action,
            params,
            id: None,
            after: Vec::new(),
            os_list: Vec::new(),
            group: None,
            origin: None,
        }
    }

    /// Set the explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Replace the `after:` keys.
    #[must_use]
    pub fn with_after<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict the rule to the given operating systems.
    #[must_use]
    pub fn on<I, S>(mut self, os: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.os_list = os.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this is an `uninstall` directive.
    #[must_use]
    pub const fn is_uninstall(&self) -> bool {
        matches!(self.action, Action::Uninstall)
    }

    /// The concrete resource kind. For `uninstall` it is recovered from the
    /// populated parameters.
    #[must_use]
    pub fn kind(&self) -> Option<Action> {
        match self.action {
            Action::Uninstall => self.params.inferred_kind(),
            kind => Some(kind),
        }
    }

    /// Identity used for ordering and `after:` references: the explicit id,
    /// else a kind-specific fallback.
    #[must_use]
    pub fn dependency_key(&self) -> String {
        if let Some(id) = &self.id {
            return id.clone();
        }
        let Some(kind) = self.kind() else {
            return self.action.name().to_string();
        };
        let p = &self.params;
        let fallback = match kind {
            Action::Install => p.packages.first(),
            Action::Clone => p.clone_path.as_ref(),
            Action::Decrypt => p.decrypt_path.as_ref(),
            Action::Mkdir => p.mkdir.as_ref(),
            Action::KnownHosts => p.known_host.as_ref(),
            Action::GpgKey => p.gpg_keyring.as_ref(),
            Action::Asdf | Action::Homebrew | Action::Ollama | Action::Uninstall => None,
        };
        fallback.map_or_else(|| kind.name().to_string(), Clone::clone)
    }

    /// `file:line` of the declaration, or `<drift>` for synthesized rules.
    #[must_use]
    pub fn location(&self) -> String {
        self.origin.as_ref().map_or_else(
            || "<drift>".to_string(),
            |o| format!("{}:{}", o.file.display(), o.line),
        )
    }
}
