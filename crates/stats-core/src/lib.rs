//! Core types for the statistics chart pipeline.
//!
//! Holds the record and series model, the shared error type, value and
//! time-code processors, the deferred-dimension table and CLI settings.

pub mod data_processors;
pub mod datasets;
pub mod error;
pub mod models;
pub mod settings;

pub use error::{Result, StatsError};
