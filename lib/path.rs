//! Base directory resolution and containment of file keys.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::cache::single_flight::SingleFlight;
use crate::error::MacheError;
use crate::io::FileSystem;

/// Lexically normalize `path`: drop `.` components and let `..` remove the preceding normal
/// component.
///
/// `..` never climbs above the root, matching how the kernel treats `/..`. No filesystem access
/// happens, so symlinks are not followed.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // Already at the root: stay there.
                Some(Component::RootDir | Component::Prefix(_)) => {}
                // Relative path that climbs out of its start.
                _ => out.push(".."),
            },
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// Returns `true` if `candidate` is `base` itself or lies beneath it.
///
/// Both paths must already be normalized. The comparison is component-wise, so `/base` never
/// contains `/basement/x`.
#[must_use]
pub fn is_descendant_or_equal(base: &Path, candidate: &Path) -> bool {
    candidate.starts_with(base)
}

/// Resolves the base directory once and validates file keys against it.
///
/// The canonical base directory is memoized for the lifetime of the resolver. Concurrent callers
/// racing the first resolution share a single canonicalize call. Validated full paths are memoized
/// per key and never invalidated.
pub struct PathResolver<F: FileSystem> {
    fs: F,
    configured: PathBuf,
    base: Arc<OnceLock<PathBuf>>,
    resolving: SingleFlight<(), Result<PathBuf, MacheError>>,
    full_paths: scc::HashMap<String, PathBuf>,
}

impl<F: FileSystem> PathResolver<F> {
    /// Create a resolver for the given (possibly relative, possibly symlinked) root.
    pub fn new(fs: F, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            configured: base_dir.into(),
            base: Arc::new(OnceLock::new()),
            resolving: SingleFlight::default(),
            full_paths: scc::HashMap::new(),
        }
    }

    /// The root as it was configured, before resolution.
    #[must_use]
    pub fn configured(&self) -> &Path {
        &self.configured
    }

    /// Returns the canonical base directory, resolving it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`MacheError::DirectoryResolution`] if the root does not exist or cannot be
    /// accessed, and [`MacheError::NotADirectory`] if it is not a directory. Failures are not
    /// memoized; the next call tries again.
    pub async fn base_dir(&self) -> Result<&Path, MacheError> {
        if let Some(base) = self.base.get() {
            return Ok(base);
        }

        let fs = self.fs.clone();
        let configured = self.configured.clone();
        let memo = Arc::clone(&self.base);
        self.resolving
            .run((), move || Self::resolve_base(fs, configured, memo))
            .await
            .unwrap_or_else(|interrupted| {
                Err(MacheError::DirectoryResolution {
                    path: self.configured.clone(),
                    source: Arc::new(std::io::Error::other(format!(
                        "base directory resolution interrupted: {interrupted:?}"
                    ))),
                })
            })?;

        // The flight stores the path before it settles.
        self.base.get().map(PathBuf::as_path).ok_or_else(|| {
            MacheError::DirectoryResolution {
                path: self.configured.clone(),
                source: Arc::new(std::io::Error::other("base directory was not memoized")),
            }
        })
    }

    async fn resolve_base(
        fs: F,
        configured: PathBuf,
        memo: Arc<OnceLock<PathBuf>>,
    ) -> Result<PathBuf, MacheError> {
        // A caller that missed the memo may still start a flight after the winning one settled.
        if let Some(base) = memo.get() {
            return Ok(base.clone());
        }

        let canonical = fs.canonicalize(&configured).await.map_err(|e| {
            MacheError::DirectoryResolution {
                path: configured.clone(),
                source: Arc::new(e),
            }
        })?;

        let is_dir = fs
            .is_dir(&canonical)
            .await
            .map_err(|e| MacheError::DirectoryResolution {
                path: configured.clone(),
                source: Arc::new(e),
            })?;
        if !is_dir {
            return Err(MacheError::NotADirectory { path: canonical });
        }

        debug!(configured = ?configured, base = ?canonical, "resolved base directory");
        Ok(memo.get_or_init(|| canonical).clone())
    }

    /// Resolve `key` to a full path inside the base directory.
    ///
    /// # Errors
    ///
    /// Propagates base directory resolution failures, and returns
    /// [`MacheError::PathTraversal`] if the normalized path escapes the base directory.
    pub async fn resolve_file_path(&self, key: &str) -> Result<PathBuf, MacheError> {
        if let Some(path) = self.full_paths.read_async(key, |_, p| p.clone()).await {
            return Ok(path);
        }

        let base = self.base_dir().await?;
        let candidate = normalize(&base.join(key));
        if !is_descendant_or_equal(base, &candidate) {
            debug!(key, path = ?candidate, "rejected file key outside base directory");
            return Err(MacheError::PathTraversal {
                key: key.to_owned(),
                path: candidate,
            });
        }

        // A concurrent resolution of the same key computes the same path; first writer wins.
        drop(
            self.full_paths
                .insert_async(key.to_owned(), candidate.clone())
                .await,
        );
        Ok(candidate)
    }

    /// Returns the number of memoized full paths.
    #[must_use]
    pub fn memoized_paths(&self) -> usize {
        self.full_paths.len()
    }
}

