//! Chart datasets served by the backend.
//!
//! This module provides:
//! - `ChartSpec`: the renderer-agnostic chart shape the cache stores
//! - `Dataset`: how one chart is requested and built from API rows
//! - `DemandDataset`, `CapacityCurveDataset`: the dashboard's charts

pub mod datasets;
pub mod model;

pub use datasets::{CapacityCurveDataset, Dataset, DemandDataset};
pub use model::{ChartKind, ChartSpec, Series, YAxis};
