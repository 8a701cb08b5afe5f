//! Aggregate time-series engine.
//!
//! Gateway for the aggregation components; callers use the re-exports
//! below rather than reaching into the submodules.

mod engine;
mod function;
mod index;
mod validity;

pub use engine::{
    compute_aggregate, compute_aggregate_with, AggregateOptions, BucketReduction, MissingData,
};
pub use function::AggregateFunction;
pub use index::build_index;
pub use validity::resolve_validity;
