//! The current built object for every file key.

use std::sync::Arc;
use std::time::SystemTime;

/// A built object together with the modification time of the file it was built from.
#[derive(Debug)]
pub struct CacheEntry<T> {
    /// Modification time of the file when `object` was built.
    pub modified: SystemTime,
    /// The built object.
    pub object: Arc<T>,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            modified: self.modified,
            object: Arc::clone(&self.object),
        }
    }
}

/// Pure data holder mapping file keys to their [`CacheEntry`].
///
/// Entries are replaced wholesale, never mutated in place, so an [`Arc`] handed out earlier keeps
/// pointing at the object it was built as. Performs no I/O and publishes no events.
pub struct CacheStore<T> {
    entries: scc::HashMap<String, CacheEntry<T>>,
}

impl<T> Default for CacheStore<T> {
    fn default() -> Self {
        Self {
            entries: scc::HashMap::default(),
        }
    }
}

impl<T> CacheStore<T> {
    /// Returns the current entry for `key`.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<CacheEntry<T>> {
        self.entries.read_sync(key, |_, entry| entry.clone())
    }

    /// Install a new entry for `key`, returning the object it replaced.
    pub fn store(&self, key: &str, modified: SystemTime, object: Arc<T>) -> Option<Arc<T>> {
        let entry = CacheEntry { modified, object };
        match self.entries.entry_sync(key.to_owned()) {
            scc::hash_map::Entry::Occupied(mut occ) => {
                Some(std::mem::replace(occ.get_mut(), entry).object)
            }
            scc::hash_map::Entry::Vacant(vac) => {
                vac.insert_entry(entry);
                None
            }
        }
    }

    /// Remove the entry for `key`, returning its object.
    pub fn remove(&self, key: &str) -> Option<Arc<T>> {
        self.entries.remove_sync(key).map(|(_, entry)| entry.object)
    }

    /// Returns the keys that currently hold an entry, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.entries.len());
        self.entries.iter_sync(|key, _| {
            keys.push(key.clone());
            true
        });
        keys
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
