//! Reload error handling
//!
//! Errors surfaced by the reload engine. Load failures carry the file that
//! failed and the original error raised by the load capability; everything
//! else that can go wrong is an I/O or configuration problem.

use std::path::{Path, PathBuf};

/// Type alias for reload results
pub type ReloadResult<T> = Result<T, ReloadError>;

/// Errors returned by the reloader
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// The load capability raised while executing a file. Partially bound
    /// names have already been removed when this is returned.
    #[error("failed to load {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The path could not be resolved to a file on disk
    #[error("cannot resolve {}: {source}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A load tried to bind something that is not a legal qualified name
    #[error("{0:?} is not a valid constant name")]
    InvalidName(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The entry block failed after a successful reload cycle
    #[error("entry block failed: {0}")]
    Entry(#[source] anyhow::Error),
}

impl ReloadError {
    /// Path of the file involved, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            ReloadError::Load { path, .. }
            | ReloadError::NotFound { path, .. }
            | ReloadError::Io { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Whether this error came from executing a source unit
    pub fn is_load_failure(&self) -> bool {
        matches!(self, ReloadError::Load { .. })
    }
}

/// Helper trait for attaching a path to I/O results
pub trait ReloadErrorContext<T> {
    fn reload_context(self, path: &Path) -> ReloadResult<T>;
}

impl<T> ReloadErrorContext<T> for std::io::Result<T> {
    fn reload_context(self, path: &Path) -> ReloadResult<T> {
        self.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ReloadError::NotFound {
                    path: path.to_path_buf(),
                    source,
                }
            } else {
                ReloadError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
    }
}

/// Create a load error for `path`
pub fn load_error(path: impl AsRef<Path>, source: anyhow::Error) -> ReloadError {
    ReloadError::Load {
        path: path.as_ref().to_path_buf(),
        source,
    }
}
