//! Fetch-with-cache orchestration for chart datasets.
//!
//! `ChartLoader::load` consults the shared `TieredCache` first and only goes
//! to the network on a miss. Only complete, well-formed charts are cached;
//! failures surface as a `ChartError` carrying the dataset's user-facing
//! message and are never stored.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ApiError, ChartSource};
use crate::cache::{CacheKey, KeyError, TieredCache};
use crate::charts::{ChartSpec, Dataset};
use crate::store::PersistentStore;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("{message}")]
    Unavailable {
        dataset: &'static str,
        message: &'static str,
        #[source]
        source: ApiError,
    },

    #[error("Loading {dataset} was cancelled")]
    Cancelled { dataset: &'static str },

    #[error("Invalid cache key for {dataset}: {source}")]
    InvalidKey {
        dataset: &'static str,
        #[source]
        source: KeyError,
    },
}

impl ChartError {
    pub fn dataset(&self) -> &'static str {
        match self {
            ChartError::Unavailable { dataset, .. }
            | ChartError::Cancelled { dataset }
            | ChartError::InvalidKey { dataset, .. } => dataset,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChartError::Cancelled { .. })
    }
}

/// Loads charts through a shared cache.
///
/// Concurrent loads of the same dataset are not merged: each misses, fetches
/// and stores independently, and the last store wins.
pub struct ChartLoader<C, S> {
    cache: Arc<TieredCache<ChartSpec, S>>,
    source: C,
}

impl<C, S> ChartLoader<C, S>
where
    C: ChartSource,
    S: PersistentStore,
{
    pub fn new(cache: Arc<TieredCache<ChartSpec, S>>, source: C) -> Self {
        Self { cache, source }
    }

    pub fn cache(&self) -> &Arc<TieredCache<ChartSpec, S>> {
        &self.cache
    }

    pub fn key_for<D: Dataset + ?Sized>(dataset: &D) -> Result<CacheKey, ChartError> {
        CacheKey::for_dataset(dataset.id(), dataset.params().as_ref()).map_err(|source| {
            ChartError::InvalidKey {
                dataset: dataset.id(),
                source,
            }
        })
    }

    /// Return the dataset's chart, from cache when fresh, otherwise fetched.
    ///
    /// If `cancel` fires before the fetch settles, the result is discarded
    /// and nothing is cached.
    pub async fn load<D: Dataset + ?Sized>(
        &self,
        dataset: &D,
        cancel: &CancellationToken,
    ) -> Result<ChartSpec, ChartError> {
        let id = dataset.id();
        let key = Self::key_for(dataset)?;

        if let Some(chart) = self.cache.lookup(&key) {
            debug!(dataset = id, key = %key, "Chart served from cache");
            return Ok(chart);
        }

        if cancel.is_cancelled() {
            return Err(ChartError::Cancelled { dataset: id });
        }

        debug!(dataset = id, key = %key, endpoint = dataset.endpoint(), "Cache miss, fetching chart");
        let params = dataset.params();
        let fetched = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(dataset = id, "Chart fetch abandoned");
                return Err(ChartError::Cancelled { dataset: id });
            }
            result = self.source.post_json(dataset.endpoint(), params.as_ref()) => result,
        };

        let chart = fetched
            .and_then(|rows| dataset.transform(rows))
            .map_err(|source| {
                warn!(dataset = id, status = ?source.status(), error = %source, "Failed to load chart");
                ChartError::Unavailable {
                    dataset: id,
                    message: dataset.error_message(),
                    source,
                }
            })?;

        if !chart.is_consistent() {
            warn!(dataset = id, "Chart series don't line up with its categories, not caching");
            return Err(ChartError::Unavailable {
                dataset: id,
                message: dataset.error_message(),
                source: ApiError::InvalidResponse(format!(
                    "{} chart series don't match its {} categories",
                    id,
                    chart.point_count()
                )),
            });
        }

        if cancel.is_cancelled() {
            debug!(dataset = id, "Chart arrived after cancellation, not caching");
            return Err(ChartError::Cancelled { dataset: id });
        }

        debug!(dataset = id, points = chart.point_count(), "Caching fetched chart");
        self.cache.store(&key, chart.clone());
        Ok(chart)
    }

    /// Forget the dataset's cached chart so the next load refetches it.
    pub fn invalidate<D: Dataset + ?Sized>(&self, dataset: &D) -> Result<(), ChartError> {
        let key = Self::key_for(dataset)?;
        self.cache.invalidate(&key);
        Ok(())
    }
}
