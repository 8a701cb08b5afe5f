use axum::Router;

use crate::Config;

mod aggregate;
mod health;

pub use aggregate::{AggregateRequest, AggregateResponse, ErrorResponse};

// ---

pub fn router(config: Config) -> Router {
    // ---
    Router::new()
        .merge(aggregate::router())
        .merge(health::router())
        .with_state(config)
}
