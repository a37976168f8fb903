//! Filesystem operation abstractions for dependency injection.
//!
//! Provides the [`FileSystemOps`] trait so that handlers can be unit-tested
//! without touching the real filesystem.  Production code uses
//! [`SystemFileSystemOps`]; tests use `MockFileSystemOps`.

use anyhow::{Context as _, Result};
use std::io::Write as _;
use std::path::Path;

/// Abstraction over the filesystem probes and writes used by handlers.
pub trait FileSystemOps: Send + Sync + std::fmt::Debug {
    /// Returns `true` if `path` exists on the filesystem.
    fn exists(&self, path: &Path) -> bool;

    /// Returns `true` if `path` is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Permission bits of `path`, or `None` if it does not exist or the
    /// platform has no Unix modes.
    fn mode(&self, path: &Path) -> Option<u32>;

    /// Read the full contents of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Atomically write `data` to `path` with owner-only permissions,
    /// creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent cannot be created or the write fails.
    fn write_private(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Remove the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    fn remove_file(&self, path: &Path) -> std::io::Result<()>;
}

/// Production [`FileSystemOps`] implementation that delegates to [`std::fs`].
#[derive(Debug, Default)]
pub struct SystemFileSystemOps;

impl FileSystemOps for SystemFileSystemOps {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    #[cfg(unix)]
    fn mode(&self, path: &Path) -> Option<u32> {
        use std::os::unix::fs::PermissionsExt as _;
        std::fs::metadata(path)
            .ok()
            .map(|m| m.permissions().mode() & 0o7777)
    }

    #[cfg(not(unix))]
    fn mode(&self, _path: &Path) -> Option<u32> {
        None
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
    }

    fn write_private(&self, path: &Path, data: &[u8]) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        // NamedTempFile is created 0600 on Unix, so the secret is never
        // readable by others, not even briefly.
        tmp.write_all(data)?;
        tmp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Mock [`FileSystemOps`] for unit tests.
///
/// Pre-configure existing files and directories with the builder-style
/// methods; writes and removals are tracked so tests can assert on them.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockFileSystemOps {
    files: std::sync::Mutex<std::collections::HashMap<std::path::PathBuf, Vec<u8>>>,
    dirs: Vec<std::path::PathBuf>,
    modes: std::collections::HashMap<std::path::PathBuf, u32>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl MockFileSystemOps {
    /// Create an empty mock with nothing configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a regular file with the given contents.
    #[must_use]
    pub fn with_file(self, path: impl Into<std::path::PathBuf>, contents: &[u8]) -> Self {
        self.files
            .lock()
            .expect("mock files poisoned")
            .insert(path.into(), contents.to_vec());
        self
    }

    /// Register a directory.
    #[must_use]
    pub fn with_dir(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.dirs.push(path.into());
        self
    }

    /// Register a directory with explicit permission bits.
    #[must_use]
    pub fn with_dir_mode(mut self, path: impl Into<std::path::PathBuf>, mode: u32) -> Self {
        let path = path.into();
        self.modes.insert(path.clone(), mode);
        self.dirs.push(path);
        self
    }

    /// Current contents of a file, if present.
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files
            .lock()
            .expect("mock files poisoned")
            .get(path)
            .cloned()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl FileSystemOps for MockFileSystemOps {
    fn exists(&self, path: &Path) -> bool {
        self.is_dir(path)
            || self
                .files
                .lock()
                .expect("mock files poisoned")
                .contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.iter().any(|d| d == path)
    }

    fn mode(&self, path: &Path) -> Option<u32> {
        if !self.exists(path) {
            return None;
        }
        Some(self.modes.get(path).copied().unwrap_or(0o755))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.contents(path)
            .ok_or_else(|| anyhow::anyhow!("mock: no file at {}", path.display()))
    }

    fn write_private(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.files
            .lock()
            .expect("mock files poisoned")
            .insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        self.files
            .lock()
            .expect("mock files poisoned")
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
    }
}
