//! mache: a memoizing cache of objects built from files.
//!
//! A [`Mache`] maps a file key, relative to a base directory, onto the object an
//! [`ObjectBuilder`] produced from that file's bytes. The object is rebuilt when the file's
//! modification time changes, concurrent requests for the same key share one rebuild, and
//! superseded objects are announced to invalidation subscribers.

/// The caller-supplied object construction hook.
pub mod builder;
/// Caching primitives for mache.
pub mod cache;
mod coordinator;
pub mod error;
pub mod events;
pub mod io;
/// Base directory resolution and path containment.
pub mod path;

pub use builder::{BuildError, ObjectBuilder};
pub use coordinator::Mache;
pub use error::MacheError;
pub use events::{Invalidation, Subscription};
pub use io::{FileSystem, LocalFs};
