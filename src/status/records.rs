//! Per-kind status records.
//!
//! Every record carries its natural key, kind-specific metadata, the time it
//! was last applied, and a flattened [`Scope`].

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::{impl_status_entry, normalize_source};
use crate::platform::normalize_os_name;

/// Provenance of a record: which blueprint declared it, on which OS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Symlink-resolved absolute path of the blueprint file.
    pub source_file: String,
    /// Normalized OS name.
    pub os: String,
}

impl Scope {
    /// Build a scope, normalizing both the path and the OS name.
    #[must_use]
    pub fn new(source_file: &Path, os: &str) -> Self {
        Self {
            source_file: normalize_source(source_file),
            os: normalize_os_name(os),
        }
    }
}

/// An installed system package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageStatus {
    /// Package name.
    pub name: String,
    /// Manager that installed it.
    pub package_manager: String,
    /// When the rule last succeeded.
    pub applied_at: DateTime<Utc>,
    /// Owning blueprint and OS.
    #[serde(flatten)]
    pub scope: Scope,
}
impl_status_entry!(PackageStatus, |r| r.name.clone());

/// A cloned repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneStatus {
    /// Repository URL.
    pub url: String,
    /// Destination in canonical form (e.g. `~/r`).
    pub path: String,
    /// Declared branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Commit checked out after the last successful clone or update.
    pub sha: String,
    /// When the rule last succeeded.
    pub applied_at: DateTime<Utc>,
    /// Owning blueprint and OS.
    #[serde(flatten)]
    pub scope: Scope,
}
impl_status_entry!(CloneStatus, |r| r.path.clone());

/// A created directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MkdirStatus {
    /// Directory in canonical form (e.g. `~/r/build`).
    pub path: String,
    /// Declared permission string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    /// When the rule last succeeded.
    pub applied_at: DateTime<Utc>,
    /// Owning blueprint and OS.
    #[serde(flatten)]
    pub scope: Scope,
}
impl_status_entry!(MkdirStatus, |r| r.path.clone());

/// A decrypted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptStatus {
    /// Encrypted source as declared.
    pub encrypted_file: String,
    /// Plaintext destination in canonical form.
    pub dest_path: String,
    /// Password cache key used.
    pub password_id: String,
    /// SHA-256 of the written plaintext, hex encoded.
    pub sha256: String,
    /// When the rule last succeeded.
    pub applied_at: DateTime<Utc>,
    /// Owning blueprint and OS.
    #[serde(flatten)]
    pub scope: Scope,
}
impl_status_entry!(DecryptStatus, |r| r.dest_path.clone());

/// A host added to `known_hosts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownHostStatus {
    /// Host name.
    pub host: String,
    /// Key type scanned for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    /// When the rule last succeeded.
    pub applied_at: DateTime<Utc>,
    /// Owning blueprint and OS.
    #[serde(flatten)]
    pub scope: Scope,
}
impl_status_entry!(KnownHostStatus, |r| r.host.clone());

/// An apt keyring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpgKeyStatus {
    /// Keyring name.
    pub keyring: String,
    /// Where the key was downloaded from.
    pub url: String,
    /// Repository line written with it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deb_url: Option<String>,
    /// When the rule last succeeded.
    pub applied_at: DateTime<Utc>,
    /// Owning blueprint and OS.
    #[serde(flatten)]
    pub scope: Scope,
}
impl_status_entry!(GpgKeyStatus, |r| r.keyring.clone());

/// An asdf runtime version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsdfStatus {
    /// asdf plugin.
    pub plugin: String,
    /// Installed version.
    pub version: String,
    /// When the rule last succeeded.
    pub applied_at: DateTime<Utc>,
    /// Owning blueprint and OS.
    #[serde(flatten)]
    pub scope: Scope,
}
// Version is part of the key so several versions of a plugin coexist.
impl_status_entry!(AsdfStatus, |r| format!("{}@{}", r.plugin, r.version));

/// A Homebrew formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomebrewStatus {
    /// Formula name.
    pub formula: String,
    /// When the rule last succeeded.
    pub applied_at: DateTime<Utc>,
    /// Owning blueprint and OS.
    #[serde(flatten)]
    pub scope: Scope,
}
impl_status_entry!(HomebrewStatus, |r| r.formula.clone());

/// An Ollama model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OllamaStatus {
    /// Model name.
    pub model: String,
    /// When the rule last succeeded.
    pub applied_at: DateTime<Utc>,
    /// Owning blueprint and OS.
    #[serde(flatten)]
    pub scope: Scope,
}
impl_status_entry!(OllamaStatus, |r| r.model.clone());
