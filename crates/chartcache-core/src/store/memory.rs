use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{entry_size, PersistentStore, StoreError};

/// In-process store with an optional byte budget.
///
/// Behaves like browser-style local storage: keys and values both count
/// against the budget, and a write that would exceed it is refused without
/// touching the existing value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    capacity_bytes: Option<u64>,
}

impl MemoryStore {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity_bytes: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity_bytes: Some(capacity_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A poisoned map is still structurally valid; every mutation is a single
    // insert or remove.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.lock();

        if let Some(capacity) = self.capacity_bytes {
            let used: u64 = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| entry_size(k, v))
                .sum();
            let needed = used + entry_size(key, value);
            if needed > capacity {
                return Err(StoreError::CapacityExceeded { needed, capacity });
            }
        }

        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
