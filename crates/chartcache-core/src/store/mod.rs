//! Persistent key/value storage behind the tiered cache.
//!
//! A `PersistentStore` is a byte-string store that survives across sessions,
//! has a finite capacity, and may refuse writes once that capacity is reached.
//! It has no notion of TTL or namespacing; both are layered on top by
//! [`crate::cache::TieredCache`].
//!
//! Adapters:
//! - `MemoryStore`: process-local map with a byte budget
//! - `FileStore`: one file per key under a directory, with a byte budget

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage capacity exceeded: write needs {needed} bytes, capacity is {capacity} bytes")]
    CapacityExceeded { needed: u64, capacity: u64 },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, StoreError::CapacityExceeded { .. })
    }
}

/// Key/value byte storage shared with whatever else lives on the same medium.
///
/// Single-key reads and writes are atomic. `list_keys` makes no ordering
/// guarantee, and a scan followed by removals is not atomic with respect to
/// other writers.
pub trait PersistentStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Fails with `StoreError::CapacityExceeded` when the aggregate stored
    /// size would pass the medium's limit. The previous value, if any, is
    /// left untouched on failure.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

impl<T: PersistentStore + ?Sized> PersistentStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).list_keys(prefix)
    }
}

/// Size a key/value pair occupies against a store's budget.
pub(crate) fn entry_size(key: &str, value: &[u8]) -> u64 {
    (key.len() + value.len()) as u64
}
