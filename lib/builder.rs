//! The caller-supplied object construction hook.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

/// A failure reported by an [`ObjectBuilder`].
///
/// Wraps any error type behind an [`Arc`] so it can be cloned into every caller that joined the
/// failed rebuild.
#[derive(Clone)]
pub struct BuildError {
    inner: Arc<dyn std::error::Error + Send + Sync + 'static>,
}

impl BuildError {
    /// Wrap an arbitrary error.
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(err),
        }
    }

    /// Build an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Message(message.into())),
        }
    }

    /// Attempt to downcast to the wrapped error type.
    #[must_use]
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }
}

impl fmt::Debug for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

/// Turns the raw bytes of a file into an application object.
///
/// Invoked at most once per rebuild. The returned future may take arbitrarily long; concurrent
/// requests for the same key wait on it instead of starting their own build.
pub trait ObjectBuilder<T>: Send + Sync + 'static {
    /// Build the object for `key` from the file's `content`.
    fn build(&self, key: &str, content: Bytes)
    -> impl Future<Output = Result<T, BuildError>> + Send;
}

impl<T, F, Fut> ObjectBuilder<T> for F
where
    F: Fn(&str, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BuildError>> + Send,
{
    fn build(
        &self,
        key: &str,
        content: Bytes,
    ) -> impl Future<Output = Result<T, BuildError>> + Send {
        self(key, content)
    }
}
