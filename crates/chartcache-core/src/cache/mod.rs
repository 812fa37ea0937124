//! Two-tier result cache for chart data.
//!
//! This module provides the `TieredCache`, an in-process map layered over a
//! [`PersistentStore`](crate::store::PersistentStore). Entries carry the time
//! they were written and are treated as misses once older than the configured
//! TTL. The persistent tier is kept to a bounded number of entries by
//! discarding the oldest writes.
//!
//! Supporting types:
//! - `CacheKey`: deterministic key for a dataset plus its parameters
//! - `CacheEntry`: the persisted `{value, stored_at}` record
//! - `Clock`: time source, with `ManualClock` for driving time explicitly

pub mod clock;
pub mod entry;
pub mod key;
pub mod tiered;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use key::{CacheKey, KeyError};
pub use tiered::{CacheStats, TieredCache};
