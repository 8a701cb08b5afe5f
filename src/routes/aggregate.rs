use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::aggregate::{compute_aggregate_with, AggregateFunction, AggregateOptions, MissingData};
use crate::interval::{clip_to_interval_label, IntervalLabel, IntervalLength};
use crate::{AggregateError, AggregateObservation, AggregateRow, Config, ObservationFrame, ValuesPayload};

// ---

pub fn router() -> Router<Config> {
    // ---
    Router::new().route("/aggregate", post(handler))
}

/// Body of `POST /aggregate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRequest {
    pub interval_length: String,
    pub interval_label: String,
    /// IANA name; the configured default when absent.
    #[serde(default)]
    pub timezone: Option<String>,
    pub aggregate_function: String,
    pub observations: Vec<AggregateObservation>,
    pub data: BTreeMap<String, ValuesPayload>,
    #[serde(default)]
    pub missing_data: Option<String>,
    /// Optional window the data is clipped to before aggregating.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResponse {
    pub interval_length: String,
    pub interval_label: String,
    pub timezone: String,
    pub values: Vec<AggregateRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

impl From<AggregateError> for ErrorResponse {
    fn from(e: AggregateError) -> Self {
        Self {
            kind: e.kind().as_str().to_string(),
            error: e.to_string(),
        }
    }
}

async fn handler(
    State(config): State<Config>,
    Json(request): Json<AggregateRequest>,
) -> impl IntoResponse {
    // ---
    info!(
        "POST /aggregate - {} records over {} series",
        request.observations.len(),
        request.data.len()
    );

    match run_aggregate(&config, request) {
        Ok(response) => {
            debug!("POST /aggregate - Returning {} rows", response.values.len());
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            error!("Failed to compute aggregate: {}", e.error);
            (StatusCode::BAD_REQUEST, Json(e)).into_response()
        }
    }
}

// ---

/// Parse the request, clip the data if asked to, and run the engine.
fn run_aggregate(config: &Config, request: AggregateRequest) -> Result<AggregateResponse, ErrorResponse> {
    // ---
    if request.observations.len() > config.max_observations as usize {
        return Err(ErrorResponse {
            error: format!(
                "too many aggregate observations: {} (limit {})",
                request.observations.len(),
                config.max_observations
            ),
            kind: "value".to_string(),
        });
    }

    let interval_length: IntervalLength = request.interval_length.parse()?;
    let interval_label: IntervalLabel = request.interval_label.parse()?;
    let function: AggregateFunction = request.aggregate_function.parse()?;
    let timezone = match &request.timezone {
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| AggregateError::UnknownTimezone(name.clone()))?,
        None => config.default_timezone,
    };
    let missing_data = match &request.missing_data {
        Some(policy) => policy.parse::<MissingData>()?,
        None => config.missing_data,
    };

    let mut frames: BTreeMap<String, ObservationFrame> = request
        .data
        .into_iter()
        .map(|(id, payload)| (id, ObservationFrame::from(payload)))
        .collect();

    if request.start.is_some() || request.end.is_some() {
        let start = request.start.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let end = request.end.unwrap_or(DateTime::<Utc>::MAX_UTC);
        debug!("Clipping data to {} .. {} ({})", start, end, interval_label);
        for frame in frames.values_mut() {
            *frame = clip_to_interval_label(frame, interval_label, &start, &end)?;
        }
    }

    let options = AggregateOptions {
        missing_data,
        ..Default::default()
    };
    let result = compute_aggregate_with(
        &frames,
        interval_length,
        interval_label,
        timezone,
        function,
        &request.observations,
        &options,
    )?;

    Ok(AggregateResponse {
        interval_length: result.interval_length.to_string(),
        interval_label: result.interval_label.to_string(),
        timezone: timezone.name().to_string(),
        values: result.rows().collect(),
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn request(body: serde_json::Value) -> AggregateRequest {
        serde_json::from_value(body).unwrap()
    }

    fn hourly_values(hours: std::ops::Range<u32>, value: f64, flag: u32) -> serde_json::Value {
        let rows: Vec<_> = hours
            .map(|h| {
                json!({
                    "timestamp": format!("2019-10-04T{h:02}:00:00Z"),
                    "value": value,
                    "quality_flag": flag
                })
            })
            .collect();
        json!({ "values": rows })
    }

    fn base_body() -> serde_json::Value {
        json!({
            "interval_length": "1h",
            "interval_label": "ending",
            "aggregate_function": "sum",
            "observations": [
                {"observation_id": "a", "effective_from": "2019-10-01T00:00:00Z"},
                {"observation_id": "b", "effective_from": "2019-10-04T02:00:00Z"}
            ],
            "data": {
                "a": hourly_values(0..4, 1.0, 1),
                "b": hourly_values(0..4, 2.0, 4)
            }
        })
    }

    #[test]
    fn test_run_aggregate() {
        // ---
        let response = run_aggregate(&Config::default(), request(base_body())).unwrap();

        assert_eq!(response.interval_length, "1h");
        assert_eq!(response.interval_label, "ending");
        assert_eq!(response.timezone, "UTC");
        let values: Vec<_> = response.values.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![Some(1.0), Some(1.0), Some(3.0), Some(3.0)]);
        let flags: Vec<_> = response.values.iter().map(|r| r.quality_flag).collect();
        assert_eq!(flags, vec![1, 1, 5, 5]);
    }

    #[test]
    fn test_run_aggregate_clips_window() {
        // ---
        let mut body = base_body();
        body["start"] = json!("2019-10-04T00:00:00Z");
        body["end"] = json!("2019-10-04T02:00:00Z");
        let response = run_aggregate(&Config::default(), request(body)).unwrap();

        // ending labels exclude the start, so the 00:00 samples are dropped
        let stamps: Vec<_> = response.values.iter().map(|r| r.timestamp.to_rfc3339()).collect();
        assert_eq!(stamps, vec!["2019-10-04T01:00:00+00:00", "2019-10-04T02:00:00+00:00"]);
    }

    #[test]
    fn test_run_aggregate_timezone() {
        // ---
        let mut body = base_body();
        body["timezone"] = json!("America/Denver");
        let response = run_aggregate(&Config::default(), request(body)).unwrap();

        assert_eq!(response.timezone, "America/Denver");
        assert_eq!(response.values[0].timestamp.to_rfc3339(), "2019-10-03T18:00:00-06:00");
    }

    #[test]
    fn test_run_aggregate_errors() {
        // ---
        let mut body = base_body();
        body["interval_length"] = json!("33min");
        let err = run_aggregate(&Config::default(), request(body)).unwrap_err();
        assert_eq!(err.kind, "value");

        let mut body = base_body();
        body["timezone"] = json!("Mars/Olympus_Mons");
        let err = run_aggregate(&Config::default(), request(body)).unwrap_err();
        assert_eq!(err.kind, "value");

        let mut body = base_body();
        body["data"] = json!({});
        let err = run_aggregate(&Config::default(), request(body)).unwrap_err();
        assert_eq!(err.kind, "key");

        let mut body = base_body();
        body["data"]["a"]["values"][0]["timestamp"] = json!("2019-10-04T00:00:00");
        let err = run_aggregate(&Config::default(), request(body)).unwrap_err();
        assert_eq!(err.kind, "type");
    }

    #[test]
    fn test_run_aggregate_observation_limit() {
        // ---
        let config = Config {
            max_observations: 1,
            ..Config::default()
        };
        let err = run_aggregate(&config, request(base_body())).unwrap_err();
        assert!(err.error.contains("limit 1"));
    }

    #[test]
    fn test_missing_data_override() {
        // ---
        let mut body = base_body();
        body["data"]["b"] = hourly_values(0..3, 2.0, 4);
        body["missing_data"] = json!("propagate");
        let response = run_aggregate(&Config::default(), request(body)).unwrap();
        assert_eq!(response.values[3].value, None);
    }
}
