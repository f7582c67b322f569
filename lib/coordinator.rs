//! The request coordinator.
//!
//! [`Mache`] ties the pieces together: it resolves a file key through the [`PathResolver`],
//! stats the file, compares the modification time against the [`CacheStore`], rebuilds through
//! the [`ObjectBuilder`] when stale, and announces replaced objects on the [`EventHub`]. All of it
//! runs inside a [`SingleFlight`], so overlapping requests for one key share one pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::builder::ObjectBuilder;
use crate::cache::single_flight::{Interrupted, SingleFlight};
use crate::cache::store::CacheStore;
use crate::error::MacheError;
use crate::events::{EventHub, Invalidation, Subscription};
use crate::io::{FileSystem, LocalFs};
use crate::path::PathResolver;

type Outcome<T> = Result<Arc<T>, MacheError>;

struct Inner<T, B, F: FileSystem> {
    fs: F,
    resolver: PathResolver<F>,
    store: CacheStore<T>,
    flights: SingleFlight<String, Outcome<T>>,
    events: EventHub<T>,
    builder: B,
}

/// A memoizing cache of objects built from files under one base directory.
///
/// Objects are rebuilt when their file's modification time changes. Requests for a key that
/// overlap in time share a single rebuild, and every caller receives the same [`Arc`]. Cloning a
/// `Mache` is cheap and yields a handle onto the same cache.
pub struct Mache<T, B, F: FileSystem = LocalFs> {
    inner: Arc<Inner<T, B, F>>,
}

impl<T, B, F: FileSystem> Clone for Mache<T, B, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, B> Mache<T, B, LocalFs>
where
    T: Send + Sync + 'static,
    B: ObjectBuilder<T>,
{
    /// Create a cache rooted at `base_dir` on the local filesystem.
    ///
    /// The directory is not touched until the first request; a missing directory surfaces as
    /// [`MacheError::DirectoryResolution`] from [`base_dir`](Self::base_dir) or
    /// [`get`](Self::get).
    pub fn new(base_dir: impl Into<PathBuf>, builder: B) -> Self {
        Self::with_fs(base_dir, builder, LocalFs)
    }
}

impl<T, B, F> Mache<T, B, F>
where
    T: Send + Sync + 'static,
    B: ObjectBuilder<T>,
    F: FileSystem,
{
    /// Create a cache rooted at `base_dir`, reading files through `fs`.
    pub fn with_fs(base_dir: impl Into<PathBuf>, builder: B, fs: F) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver: PathResolver::new(fs.clone(), base_dir),
                fs,
                store: CacheStore::default(),
                flights: SingleFlight::default(),
                events: EventHub::default(),
                builder,
            }),
        }
    }

    /// Returns the up-to-date object for `key`, rebuilding it if the file changed.
    ///
    /// If a rebuild for `key` is already running, this waits for it and returns its outcome
    /// rather than starting another one.
    ///
    /// # Errors
    ///
    /// - [`MacheError::DirectoryResolution`] / [`MacheError::NotADirectory`] if the base directory
    ///   cannot be resolved.
    /// - [`MacheError::PathTraversal`] if `key` resolves outside the base directory. No file is
    ///   touched in that case.
    /// - [`MacheError::NotFound`] / [`MacheError::Io`] if the file cannot be stat'd or read.
    /// - [`MacheError::Builder`] / [`MacheError::BuilderPanicked`] if building failed.
    /// - [`MacheError::Cancelled`] if the rebuild was cancelled with [`cancel`](Self::cancel).
    ///
    /// A failed rebuild leaves any previously cached object in place.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime; the rebuild runs on a spawned task.
    pub async fn get(&self, key: &str) -> Result<Arc<T>, MacheError> {
        let inner = Arc::clone(&self.inner);
        let owned = key.to_owned();
        self.inner
            .flights
            .run(key.to_owned(), move || async move { inner.refresh(&owned).await })
            .await
            .unwrap_or_else(|interrupted| {
                Err(match interrupted {
                    Interrupted::Panicked => MacheError::BuilderPanicked {
                        key: key.to_owned(),
                    },
                    Interrupted::Cancelled => MacheError::Cancelled {
                        key: key.to_owned(),
                    },
                })
            })
    }

    /// Like [`get`](Self::get), but delivers the outcome to `callback` from a spawned task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn get_with<C>(&self, key: &str, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(Result<Arc<T>, MacheError>) + Send + 'static,
    {
        let this = self.clone();
        let key = key.to_owned();
        tokio::spawn(async move { callback(this.get(&key).await) })
    }

    /// Returns the canonical base directory, resolving it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`MacheError::DirectoryResolution`] or [`MacheError::NotADirectory`] if the
    /// configured directory cannot be resolved.
    pub async fn base_dir(&self) -> Result<&Path, MacheError> {
        self.inner.resolver.base_dir().await
    }

    /// Call `handler` whenever a cached object is superseded by a rebuilt one.
    ///
    /// Handlers run synchronously on the task performing the rebuild, after the new object is
    /// stored and before the triggering [`get`](Self::get) returns.
    pub fn on_invalidation<H>(&self, handler: H) -> Subscription
    where
        H: Fn(&Invalidation<T>) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler)
    }

    /// Stop delivering invalidations to a handler registered with
    /// [`on_invalidation`](Self::on_invalidation).
    pub fn unsubscribe(&self, sub: Subscription) -> bool {
        self.inner.events.unsubscribe(sub)
    }

    /// Abort the rebuild currently running for `key`.
    ///
    /// Every caller waiting on it receives [`MacheError::Cancelled`]. The previously cached
    /// object, if any, is kept. Returns `false` if nothing was running.
    ///
    /// A rebuild already in its final step when `cancel` is called may still finish: it stores
    /// its object and its waiters receive it. The next [`get`](Self::get) never joins the
    /// cancelled rebuild.
    pub fn cancel(&self, key: &str) -> bool {
        let cancelled = self.inner.flights.cancel(&key.to_owned());
        if cancelled {
            debug!(key, "cancelled in-flight rebuild");
        }
        cancelled
    }

    /// Returns `true` while a rebuild for `key` is running.
    #[must_use]
    pub fn is_building(&self, key: &str) -> bool {
        self.inner.flights.is_in_flight(&key.to_owned())
    }

    /// Returns the cached object for `key` without checking freshness or touching the disk.
    #[must_use]
    pub fn cached(&self, key: &str) -> Option<Arc<T>> {
        self.inner.store.lookup(key).map(|entry| entry.object)
    }

    /// Drop the cached object for `key`. The next [`get`](Self::get) rebuilds it.
    ///
    /// No invalidation is published: the object was discarded, not superseded.
    pub fn forget(&self, key: &str) -> Option<Arc<T>> {
        self.inner.store.remove(key)
    }

    /// Returns the keys that currently have a cached object.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.store.keys()
    }

    /// Returns the number of cached objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }
}

impl<T, B, F> Inner<T, B, F>
where
    T: Send + Sync + 'static,
    B: ObjectBuilder<T>,
    F: FileSystem,
{
    /// Bring the entry for `key` up to date and return its object.
    #[instrument(level = "debug", skip(self))]
    async fn refresh(&self, key: &str) -> Outcome<T> {
        let path = self.resolver.resolve_file_path(key).await?;
        let modified = self
            .fs
            .modified(&path)
            .await
            .map_err(|e| MacheError::from_file_io(path.clone(), e))?;

        let cached = self.store.lookup(key);
        if let Some(entry) = &cached
            && entry.modified == modified
        {
            debug!("cache hit");
            return Ok(Arc::clone(&entry.object));
        }

        debug!(stale = cached.is_some(), "building object");
        let content = self
            .fs
            .read(&path)
            .await
            .map_err(|e| MacheError::from_file_io(path, e))?;

        let object = match self.builder.build(key, content).await {
            Ok(object) => Arc::new(object),
            Err(source) => {
                warn!(error = %source, "object builder failed");
                return Err(MacheError::Builder {
                    key: key.to_owned(),
                    source,
                });
            }
        };

        if let Some(previous) = self.store.store(key, modified, Arc::clone(&object)) {
            self.events.publish(&Invalidation {
                key: key.to_owned(),
                previous,
                current: Arc::clone(&object),
            });
        }

        Ok(object)
    }
}
