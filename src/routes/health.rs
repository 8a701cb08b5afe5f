// src/routes/health.rs
//! Liveness endpoint for the aggregation service.
//!
//! Orchestrators and the integration tests poll `/health` to learn when the
//! server is accepting requests. Following the module boundary used across
//! `routes`, this file keeps its handler private and exports only a
//! subrouter that the gateway (`mod.rs`) merges.

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Handle `GET /health`. Never touches the engine.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Subrouter containing the `/health` route, generic over the gateway state.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
