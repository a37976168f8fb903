//! Persisted record of previously applied resources.
//!
//! The document holds one array per kind. It is loaded once at the start of
//! a run (empty if absent), mutated in memory as rules succeed and written
//! back once at the end with a write-temp-then-rename.

pub mod identity;
pub mod records;

use std::io::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StatusError;
pub use identity::{StatusEntry, normalize_source};
pub use records::{
    AsdfStatus, CloneStatus, DecryptStatus, GpgKeyStatus, HomebrewStatus, KnownHostStatus,
    MkdirStatus, OllamaStatus, PackageStatus, Scope,
};

/// Aggregate status document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    /// `install` records, one per package.
    pub packages: Vec<PackageStatus>,
    /// `clone` records.
    pub clones: Vec<CloneStatus>,
    /// `mkdir` records.
    pub mkdirs: Vec<MkdirStatus>,
    /// `decrypt` records.
    pub decrypts: Vec<DecryptStatus>,
    /// `known_hosts` records.
    pub known_hosts: Vec<KnownHostStatus>,
    /// `gpg-key` records.
    pub gpg_keys: Vec<GpgKeyStatus>,
    /// `asdf` records, one per `plugin@version`.
    pub asdf: Vec<AsdfStatus>,
    /// `homebrew` records, one per formula.
    pub homebrew: Vec<HomebrewStatus>,
    /// `ollama` records, one per model.
    pub ollama: Vec<OllamaStatus>,
}

/// Flat, kind-tagged view of one record for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryView<'a> {
    /// Kind keyword.
    pub kind: &'static str,
    /// Natural key.
    pub key: String,
    /// Owning scope.
    pub scope: &'a Scope,
    /// Last applied.
    pub applied_at: DateTime<Utc>,
}

fn views<'a, T: StatusEntry>(kind: &'static str, list: &'a [T]) -> impl Iterator<Item = EntryView<'a>> {
    list.iter().map(move |e| EntryView {
        kind,
        key: e.natural_key(),
        scope: e.scope(),
        applied_at: e.applied_at(),
    })
}

impl Status {
    /// Load the document at `path`, or an empty status if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::Io`] if the file exists but cannot be read and
    /// [`StatusError::Malformed`] if it is not a valid status document.
    pub fn load(path: &Path) -> Result<Self, StatusError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(StatusError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content).map_err(|source| StatusError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Atomically write the document to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::Write`] if any step of the write fails.
    pub fn save(&self, path: &Path) -> Result<(), StatusError> {
        let write_err = |source: std::io::Error| StatusError::Write {
            path: path.to_path_buf(),
            source,
        };
        let mut data = serde_json::to_string_pretty(self)
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        data.push('\n');

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(write_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(data.as_bytes()).map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    /// Total number of records across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    /// Whether no records exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record as an [`EntryView`], grouped by kind.
    pub fn entries(&self) -> impl Iterator<Item = EntryView<'_>> {
        views("install", &self.packages)
            .chain(views("clone", &self.clones))
            .chain(views("mkdir", &self.mkdirs))
            .chain(views("decrypt", &self.decrypts))
            .chain(views("known_hosts", &self.known_hosts))
            .chain(views("gpg-key", &self.gpg_keys))
            .chain(views("asdf", &self.asdf))
            .chain(views("homebrew", &self.homebrew))
            .chain(views("ollama", &self.ollama))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn scope() -> Scope {
        Scope {
            source_file: "/home/u/setup.bp".to_string(),
            os: "linux".to_string(),
        }
    }

    fn sample() -> Status {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Status {
            mkdirs: vec![MkdirStatus {
                path: "~/r/build".to_string(),
                permissions: Some("755".to_string()),
                applied_at: at,
                scope: scope(),
            }],
            clones: vec![CloneStatus {
                url: "https://example.com/r.git".to_string(),
                path: "~/r".to_string(),
                branch: None,
                sha: "abc123".to_string(),
                applied_at: at,
                scope: scope(),
            }],
            ..Status::default()
        }
    }

    #[test]
    fn load_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let status = Status::load(&tmp.path().join("status.json")).unwrap();
        assert!(status.is_empty());
    }

    #[test]
    fn save_then_load_preserves_records() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state/blueprint/status.json");
        let status = sample();
        status.save(&path).unwrap();
        assert_eq!(Status::load(&path).unwrap(), status);
    }

    #[test]
    fn save_is_byte_stable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("status.json");
        sample().save(&path).unwrap();
        let first = std::fs::read(&path).unwrap();
        Status::load(&path).unwrap().save(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[test]
    fn document_has_one_array_per_kind() {
        let json: serde_json::Value = serde_json::to_value(Status::default()).unwrap();
        for key in [
            "packages",
            "clones",
            "mkdirs",
            "decrypts",
            "known_hosts",
            "gpg_keys",
            "asdf",
            "homebrew",
            "ollama",
        ] {
            assert!(json[key].is_array(), "missing array {key}");
        }
    }

    #[test]
    fn load_tolerates_missing_arrays() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("status.json");
        std::fs::write(&path, "{\"mkdirs\": []}").unwrap();
        assert!(Status::load(&path).unwrap().is_empty());
    }

    #[test]
    fn load_malformed_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("status.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Status::load(&path),
            Err(StatusError::Malformed { .. })
        ));
    }

    #[test]
    fn entries_lists_every_kind() {
        let status = sample();
        let kinds: Vec<_> = status.entries().map(|e| (e.kind, e.key)).collect();
        assert_eq!(
            kinds,
            vec![
                ("clone", "~/r".to_string()),
                ("mkdir", "~/r/build".to_string()),
            ]
        );
        assert_eq!(status.len(), 2);
    }
}
