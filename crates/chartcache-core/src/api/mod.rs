//! REST API client module for the chart backend.
//!
//! This module provides the `ChartClient` for fetching chart rows and the
//! `ChartSource` trait the loader fetches through, so tests and embedders
//! can substitute their own transport.

pub mod client;
pub mod error;

pub use client::{ChartClient, ChartSource, RetryPolicy};
pub use error::ApiError;
