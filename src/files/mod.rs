//! Read and list files inside a private root directory.
//!
//! Every input path is taken relative to the root (a leading `/` is
//! ignored). Anything that resolves outside the root is refused.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// File access errors
#[derive(Debug, Error)]
pub enum FileError {
    /// Target missing or of the wrong kind
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// An existing entry is not a directory where one was required
    #[error("Expected directory at: {0}")]
    NotADirectory(String),

    /// Path escapes the private root
    #[error("Path escapes home directory: {0}")]
    Security(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory walk error
    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Sandboxed reader over a private root
#[derive(Debug, Clone)]
pub struct FileAccessor {
    root: PathBuf,
}

impl FileAccessor {
    /// Use `root` as the sandbox, creating it if needed
    pub fn new(root: impl AsRef<Path>) -> Result<Self, FileError> {
        std::fs::create_dir_all(root.as_ref())?;
        let root = root.as_ref().canonicalize()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read a UTF-8 text file
    pub fn read(&self, path: &str) -> Result<String, FileError> {
        let file = self.resolve(path)?;
        if !file.is_file() {
            return Err(FileError::InvalidPath(path.to_string()));
        }
        Ok(std::fs::read_to_string(file)?)
    }

    /// List everything below a directory.
    ///
    /// Entries are `<base>/<relative>`; directories end with `/`. The base
    /// itself is not included.
    pub fn list(&self, path: &str) -> Result<Vec<String>, FileError> {
        let base = self.resolve(path)?;
        if base.exists() && !base.is_dir() {
            return Err(FileError::NotADirectory(path.to_string()));
        }
        if !base.is_dir() {
            return Err(FileError::InvalidPath(base.display().to_string()));
        }

        let prefix = base.display().to_string();
        let mut entries = Vec::new();
        for entry in WalkDir::new(&base).min_depth(1) {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(&base)
                .unwrap_or_else(|_| entry.path())
                .display()
                .to_string();
            if entry.file_type().is_dir() {
                entries.push(format!("{}/{}/", prefix, relative));
            } else {
                entries.push(format!("{}/{}", prefix, relative));
            }
        }
        Ok(entries)
    }

    /// Map an input path onto the sandbox, refusing escapes.
    ///
    /// Existing targets are canonicalized so symlinks cannot lead out.
    /// Missing targets are normalized lexically.
    fn resolve(&self, input: &str) -> Result<PathBuf, FileError> {
        let relative = input.trim_start_matches('/');
        let target = self.root.join(relative);

        let resolved = match target.canonicalize() {
            Ok(canonical) => canonical,
            Err(_) => normalize(&target),
        };

        if !resolved.starts_with(&self.root) {
            tracing::warn!(input, "Rejected path outside sandbox");
            return Err(FileError::Security(input.to_string()));
        }
        Ok(resolved)
    }
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
