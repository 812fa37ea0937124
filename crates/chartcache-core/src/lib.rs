//! Chartcache Core Library
//!
//! Client-side caching for dashboard chart data. Chart results are fetched
//! from the backend once and reused from a two-tier cache: an in-process map
//! in front of a persistent store that outlives the session.
//!
//! - [`store`]: the persistent key/value tier and its adapters
//! - [`cache`]: the tiered cache with TTL and bounded eviction
//! - [`api`]: the HTTP client for the chart endpoints
//! - [`charts`]: the datasets and the chart shape that gets cached
//! - [`loader`]: fetch-with-cache for a single dataset

pub mod api;
pub mod cache;
pub mod charts;
pub mod config;
pub mod loader;
pub mod store;

pub use api::{ApiError, ChartClient, ChartSource, RetryPolicy};
pub use cache::{CacheKey, CacheStats, TieredCache};
pub use charts::{CapacityCurveDataset, ChartSpec, Dataset, DemandDataset};
pub use config::{AppConfig, CacheConfig};
pub use loader::{ChartError, ChartLoader};
pub use store::{FileStore, MemoryStore, PersistentStore, StoreError};
