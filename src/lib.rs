//! Aggregation of solar monitoring telemetry.
//!
//! Observation feeds arrive as irregular, quality-flagged time series.
//! Aggregates combine several feeds, each valid only inside its lifecycle
//! windows, into one regular series. The library is organized as:
//! - `aggregate` – validity masks, grid construction and the engine
//! - `interval`  – interval length/label parsing and clipping
//! - `models`    – observation frames, lifecycle records and results
//! - `config`, `routes` – the HTTP service around the engine

pub mod aggregate;
pub mod config;
pub mod error;
pub mod interval;
pub mod models;
pub mod routes;

pub use config::Config;
pub use error::{AggregateError, ErrorKind};

// Re-exported for routes/*.rs so they only depend on the crate root.
pub use models::{AggregateObservation, AggregateResult, AggregateRow, ObservationFrame, ValuesPayload};
