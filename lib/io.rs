//! Filesystem access used by the cache.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;

/// The filesystem operations a [`Mache`](crate::Mache) needs.
///
/// All operations are async. Implementations must be cheap to clone; clones are moved into the
/// tasks that run rebuilds.
pub trait FileSystem: Clone + Send + Sync + 'static {
    /// Resolve `path` to a canonical absolute path, following symlinks.
    fn canonicalize(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<PathBuf, std::io::Error>> + Send;

    /// Returns `true` if `path` is a directory.
    fn is_dir(&self, path: &Path) -> impl Future<Output = Result<bool, std::io::Error>> + Send;

    /// Return the last modification time of `path`.
    fn modified(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<SystemTime, std::io::Error>> + Send;

    /// Read the whole content of `path`.
    fn read(&self, path: &Path) -> impl Future<Output = Result<Bytes, std::io::Error>> + Send;
}

/// [`FileSystem`] backed by the local disk through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    async fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error> {
        tokio::fs::canonicalize(path).await
    }

    async fn is_dir(&self, path: &Path) -> Result<bool, std::io::Error> {
        Ok(tokio::fs::metadata(path).await?.is_dir())
    }

    async fn modified(&self, path: &Path) -> Result<SystemTime, std::io::Error> {
        tokio::fs::metadata(path).await?.modified()
    }

    async fn read(&self, path: &Path) -> Result<Bytes, std::io::Error> {
        tokio::fs::read(path).await.map(Bytes::from)
    }
}
