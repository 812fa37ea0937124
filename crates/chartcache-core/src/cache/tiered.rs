use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::entry::{CacheEntry, EntryStamp};
use super::key::CacheKey;
use crate::config::CacheConfig;
use crate::store::PersistentStore;

/// Counters describing how lookups and writes were served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub persistent_hits: u64,
    pub misses: u64,
    /// Entries dropped at lookup for being older than the TTL.
    pub expired: u64,
    /// Persisted entries dropped because they failed to parse.
    pub corrupt: u64,
    /// Persisted entries removed by the eviction pass.
    pub evicted: u64,
    /// Writes that ended up in the in-process tier only.
    pub write_failures: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.persistent_hits
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

/// Two-tier cache: an unbounded in-process map over a bounded persistent store.
///
/// Construct one per application (or per namespace) and share it behind an
/// `Arc`. Both tiers sit behind locks that are only held for synchronous
/// sections, so a `store` that returns is visible to every later `lookup`.
///
/// Storage trouble never reaches the caller: corrupt or expired entries read
/// as misses, and a persistent write that still fails after one eviction pass
/// leaves the value cached in-process only.
pub struct TieredCache<V, S> {
    memory: Mutex<HashMap<CacheKey, CacheEntry<V>>>,
    store: S,
    config: CacheConfig,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
    stats: Mutex<CacheStats>,
}

impl<V, S> TieredCache<V, S>
where
    V: Serialize + DeserializeOwned + Clone,
    S: PersistentStore,
{
    pub fn new(store: S, config: CacheConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl = config.ttl();
        Self {
            memory: Mutex::new(HashMap::new()),
            store,
            config,
            ttl,
            clock,
            last_stamp: Mutex::new(None),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The persistent tier this cache writes through to.
    pub fn persistent(&self) -> &S {
        &self.store
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the cached value for `key` if one exists and is within the TTL.
    pub fn lookup(&self, key: &CacheKey) -> Option<V> {
        let now = self.clock.now();
        let mut expired_in_memory = false;

        {
            let mut memory = self.memory();
            if let Some(entry) = memory.get(key) {
                if entry.is_fresh(now, self.ttl) {
                    self.record(|s| s.memory_hits += 1);
                    return Some(entry.value.clone());
                }
                debug!(key = %key, "In-process cache entry expired");
                memory.remove(key);
                self.record(|s| s.expired += 1);
                expired_in_memory = true;
            }
        }

        let namespaced = self.namespaced(key);
        let bytes = match self.store.get(&namespaced) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return self.miss(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read persistent cache entry");
                return self.miss();
            }
        };

        let entry: CacheEntry<V> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding corrupt persistent cache entry");
                self.remove_persistent(&namespaced);
                self.record(|s| s.corrupt += 1);
                return self.miss();
            }
        };

        if !entry.is_fresh(now, self.ttl) {
            debug!(key = %key, age = %entry.age_display(now), "Persistent cache entry expired");
            self.remove_persistent(&namespaced);
            if !expired_in_memory {
                self.record(|s| s.expired += 1);
            }
            return self.miss();
        }

        let value = entry.value.clone();
        self.memory().insert(key.clone(), entry);
        self.record(|s| s.persistent_hits += 1);
        Some(value)
    }

    /// Cache `value` under `key` in both tiers.
    ///
    /// The in-process write always happens. The persistent write may be
    /// dropped if the medium stays full after one eviction pass.
    pub fn store(&self, key: &CacheKey, value: V) {
        let payload = {
            let mut memory = self.memory();
            let entry = CacheEntry::new(value, self.next_stamp());
            let payload = serde_json::to_vec(&entry);
            memory.insert(key.clone(), entry);
            payload
        };

        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize cache entry, keeping it in memory only");
                self.record(|s| s.write_failures += 1);
                return;
            }
        };

        let namespaced = self.namespaced(key);
        if self.config.max_persistent_entries == 0 {
            // Don't let a copy from an earlier, bounded run shadow this value
            self.remove_persistent(&namespaced);
            return;
        }

        if self.write_persistent(&namespaced, &payload) {
            self.enforce_bound(&namespaced);
        }
    }

    /// Drop `key` from both tiers.
    pub fn invalidate(&self, key: &CacheKey) {
        self.memory().remove(key);
        self.remove_persistent(&self.namespaced(key));
        debug!(key = %key, "Invalidated cache entry");
    }

    /// Remove every entry in this cache's namespace from both tiers.
    ///
    /// Returns the number of persisted entries removed.
    pub fn purge(&self) -> usize {
        self.memory().clear();

        let keys = match self.store.list_keys(&self.config.namespace_prefix) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list persistent cache entries");
                return 0;
            }
        };

        let removed = keys
            .iter()
            .filter(|k| self.remove_persistent(k))
            .count();
        info!(removed, "Purged persistent cache");
        removed
    }

    /// Remove the persisted entries beyond the newest `retain`.
    ///
    /// `keep` is never removed and counts toward `retain`. Entries whose
    /// timestamp can't be parsed are removed outright. Returns how many
    /// entries were removed.
    pub fn evict(&self, keep: Option<&str>, retain: usize) -> usize {
        match self.store.list_keys(&self.config.namespace_prefix) {
            Ok(keys) => self.evict_keys(keys, keep, retain),
            Err(e) => {
                warn!(error = %e, "Failed to list persistent cache entries for eviction");
                0
            }
        }
    }

    fn evict_keys(&self, keys: Vec<String>, keep: Option<&str>, retain: usize) -> usize {
        let mut removed = 0;
        let mut stamped: Vec<(String, DateTime<Utc>)> = Vec::with_capacity(keys.len());

        for key in keys {
            if Some(key.as_str()) == keep {
                continue;
            }
            match self.store.get(&key) {
                Ok(Some(bytes)) => match serde_json::from_slice::<EntryStamp>(&bytes) {
                    Ok(stamp) => stamped.push((key, stamp.stored_at)),
                    Err(e) => {
                        debug!(key = %key, error = %e, "Removing unparsable entry during eviction");
                        if self.remove_persistent(&key) {
                            removed += 1;
                        }
                    }
                },
                // Removed by someone else since the listing
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable entry during eviction"),
            }
        }

        stamped.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let slots = if keep.is_some() {
            retain.saturating_sub(1)
        } else {
            retain
        };
        for (key, _) in stamped.iter().skip(slots) {
            if self.remove_persistent(key) {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, retain, "Evicted persistent cache entries");
            self.record(|s| s.evicted += removed as u64);
        }
        removed
    }

    /// Returns whether the entry made it to the persistent tier.
    fn write_persistent(&self, namespaced: &str, payload: &[u8]) -> bool {
        match self.store.set(namespaced, payload) {
            Ok(()) => true,
            Err(e) if e.is_capacity_exceeded() => {
                warn!(key = namespaced, error = %e, "Persistent cache full, evicting oldest entries");
                // Leave room for the entry being written
                self.evict(None, self.config.max_persistent_entries.saturating_sub(1));

                match self.store.set(namespaced, payload) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(key = namespaced, error = %e, "Persistent cache write failed after eviction, keeping entry in memory only");
                        self.record(|s| s.write_failures += 1);
                        false
                    }
                }
            }
            Err(e) => {
                warn!(key = namespaced, error = %e, "Persistent cache write failed, keeping entry in memory only");
                self.record(|s| s.write_failures += 1);
                false
            }
        }
    }

    fn enforce_bound(&self, just_written: &str) {
        let max = self.config.max_persistent_entries;
        match self.store.list_keys(&self.config.namespace_prefix) {
            Ok(keys) if keys.len() > max => {
                self.evict_keys(keys, Some(just_written), max);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to list persistent cache entries"),
        }
    }

    /// Returns whether the entry is gone.
    fn remove_persistent(&self, namespaced: &str) -> bool {
        match self.store.remove(namespaced) {
            Ok(()) => true,
            Err(e) => {
                warn!(key = namespaced, error = %e, "Failed to remove persistent cache entry");
                false
            }
        }
    }

    fn miss(&self) -> Option<V> {
        self.record(|s| s.misses += 1);
        None
    }

    /// Write timestamp, strictly increasing across this instance's writes so
    /// eviction order always matches write order, even within a millisecond
    /// or when the wall clock steps back.
    fn next_stamp(&self) -> DateTime<Utc> {
        let now = self.clock.now().trunc_subsecs(3);
        let mut last = self.last_stamp.lock().unwrap_or_else(|e| e.into_inner());
        let stamp = match *last {
            Some(prev) if prev >= now => prev + Duration::milliseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }

    fn namespaced(&self, key: &CacheKey) -> String {
        format!("{}{}", self.config.namespace_prefix, key)
    }

    fn record(&self, f: impl FnOnce(&mut CacheStats)) {
        f(&mut self.stats.lock().unwrap_or_else(|e| e.into_inner()));
    }

    fn memory(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry<V>>> {
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Tests
// ============================================================================
