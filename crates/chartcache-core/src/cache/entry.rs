use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A cached value and the time the cache wrote it.
///
/// Persisted as `{"value": ..., "stored_at": <epoch millis>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub stored_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, stored_at: DateTime<Utc>) -> Self {
        Self { value, stored_at }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.stored_at
    }

    /// Fresh while `now - stored_at <= ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) <= ttl
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        let minutes = self.age(now).num_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// Just the timestamp of a persisted entry; the eviction scan reads this
/// without materializing the value type.
#[derive(Debug, Deserialize)]
pub(crate) struct EntryStamp {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub stored_at: DateTime<Utc>,
}
