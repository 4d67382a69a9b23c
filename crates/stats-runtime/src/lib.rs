//! Runtime layer for stats-chart.
//!
//! Defines the retrieval seam, a replay fetcher over recorded responses and
//! the concurrent orchestrator that drives the data pipeline.

pub mod fetcher;
pub mod orchestrator;
pub mod replay;

pub use stats_core as core;
pub use stats_data as data;
