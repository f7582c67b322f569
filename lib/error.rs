//! Error taxonomy shared by every stage of a cache lookup.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::builder::BuildError;

/// Errors produced by [`Mache`](crate::Mache) operations.
///
/// Errors are `Clone` because a single in-flight rebuild settles every caller that joined it with
/// the same outcome. I/O sources are therefore held behind an [`Arc`].
#[derive(Debug, Clone, Error)]
pub enum MacheError {
    /// The configured base directory does not exist or cannot be accessed.
    #[error("failed to resolve base directory {path}: {source}")]
    DirectoryResolution {
        /// The base directory as it was configured.
        path: PathBuf,
        /// Underlying I/O error from canonicalization.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The configured base directory resolved to something other than a directory.
    #[error("base directory is not a directory: {path}")]
    NotADirectory {
        /// The canonical path that was resolved.
        path: PathBuf,
    },

    /// The file key resolves to a location outside the base directory.
    #[error("file key {key:?} resolves outside the base directory: {path}")]
    PathTraversal {
        /// The offending file key.
        key: String,
        /// The normalized path the key resolved to.
        path: PathBuf,
    },

    /// The file behind a key does not exist.
    #[error("file not found: {path}")]
    NotFound {
        /// The full path that was looked up.
        path: PathBuf,
    },

    /// Stat or read of the file failed for a reason other than absence.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The full path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The object builder reported a failure.
    #[error("failed to build object for {key:?}: {source}")]
    Builder {
        /// The file key whose object could not be built.
        key: String,
        /// The builder's error.
        #[source]
        source: BuildError,
    },

    /// The object builder panicked.
    #[error("object builder panicked for {key:?}")]
    BuilderPanicked {
        /// The file key whose build panicked.
        key: String,
    },

    /// The in-flight rebuild was cancelled with [`Mache::cancel`](crate::Mache::cancel).
    #[error("rebuild of {key:?} was cancelled")]
    Cancelled {
        /// The file key whose rebuild was cancelled.
        key: String,
    },
}

impl MacheError {
    /// Classify an I/O error raised while touching a file under the base directory.
    pub(crate) fn from_file_io(path: PathBuf, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io {
                path,
                source: Arc::new(err),
            }
        }
    }

    /// Returns `true` if this error means the requested file does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this error is a rejected path traversal.
    #[must_use]
    pub fn is_traversal(&self) -> bool {
        matches!(self, Self::PathTraversal { .. })
    }
}
