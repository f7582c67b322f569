#![allow(missing_docs, clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use bytes::Bytes;

use mache::{BuildError, FileSystem, LocalFs, ObjectBuilder};

/// How many times each `FileSystem` operation ran.
#[derive(Debug, Default)]
pub struct FsCounts {
    pub canonicalize: AtomicUsize,
    pub modified: AtomicUsize,
    pub reads: AtomicUsize,
}

impl FsCounts {
    pub fn canonicalize(&self) -> usize {
        self.canonicalize.load(Ordering::SeqCst)
    }

    pub fn modified(&self) -> usize {
        self.modified.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// A `FileSystem` that delegates to the local disk and counts every call.
#[derive(Debug, Clone, Default)]
pub struct CountingFs {
    pub counts: Arc<FsCounts>,
    /// Artificial latency added to `canonicalize`, to widen race windows.
    pub canonicalize_delay: Duration,
}

impl CountingFs {
    pub fn with_canonicalize_delay(delay: Duration) -> Self {
        Self {
            canonicalize_delay: delay,
            ..Self::default()
        }
    }
}

impl FileSystem for CountingFs {
    async fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error> {
        self.counts.canonicalize.fetch_add(1, Ordering::SeqCst);
        if !self.canonicalize_delay.is_zero() {
            tokio::time::sleep(self.canonicalize_delay).await;
        }
        LocalFs.canonicalize(path).await
    }

    async fn is_dir(&self, path: &Path) -> Result<bool, std::io::Error> {
        LocalFs.is_dir(path).await
    }

    async fn modified(&self, path: &Path) -> Result<SystemTime, std::io::Error> {
        self.counts.modified.fetch_add(1, Ordering::SeqCst);
        LocalFs.modified(path).await
    }

    async fn read(&self, path: &Path) -> Result<Bytes, std::io::Error> {
        self.counts.reads.fetch_add(1, Ordering::SeqCst);
        LocalFs.read(path).await
    }
}

/// The object produced by [`CountingBuilder`].
#[derive(Debug)]
pub struct Doc {
    /// Zero-based index of the build that produced this object.
    pub seq: usize,
    pub key: String,
    pub content: String,
}

/// Builds [`Doc`]s and counts invocations.
///
/// Content `"fail"` produces a `BuildError`, content `"panic"` panics.
#[derive(Debug, Clone, Default)]
pub struct CountingBuilder {
    pub calls: Arc<AtomicUsize>,
    /// Delay applied to the very first build only.
    pub first_build_delay: Option<Duration>,
    /// Delay applied to every build.
    pub build_delay: Option<Duration>,
}

impl CountingBuilder {
    pub fn slow_first(delay: Duration) -> Self {
        Self {
            first_build_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            build_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ObjectBuilder<Doc> for CountingBuilder {
    async fn build(&self, key: &str, content: Bytes) -> Result<Doc, BuildError> {
        let seq = self.calls.fetch_add(1, Ordering::SeqCst);
        if seq == 0
            && let Some(delay) = self.first_build_delay
        {
            tokio::time::sleep(delay).await;
        }
        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }

        let content = String::from_utf8(content.to_vec()).map_err(BuildError::new)?;
        match content.as_str() {
            "fail" => Err(BuildError::msg("refusing to build")),
            "panic" => panic!("builder exploded"),
            _ => Ok(Doc {
                seq,
                key: key.to_owned(),
                content,
            }),
        }
    }
}
