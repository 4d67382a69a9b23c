//! Data layer for stats-chart.
//!
//! Decodes source responses, resolves deferred filters, aggregates records
//! into yearly series and aligns several series onto one chart.

pub mod aggregator;
pub mod aligner;
pub mod analysis;
pub mod axis;
pub mod reader;
pub mod resolver;

pub use stats_core as core;
