use std::net::SocketAddr;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio_test::assert_ok;

use solarflow_aggregate::routes::{self, AggregateResponse, ErrorResponse};
use solarflow_aggregate::Config;

const IDS: [&str; 3] = [
    "f2844284-ea0a-11e9-a7da-f4939feddd82",
    "f3e310ba-ea0a-11e9-a7da-f4939feddd82",
    "09ed7cf6-ea0b-11e9-a7da-f4939feddd82",
];

/// Serve the router on an ephemeral loopback port, or `None` when the
/// environment does not allow binding.
async fn spawn_app() -> Option<SocketAddr> {
    // ---
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.ok()?;
    let addr = listener.local_addr().ok()?;
    let app = routes::router(Config::default());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Some(addr)
}

fn ten_hourly_ones() -> Value {
    let rows: Vec<Value> = (0..10)
        .map(|h| {
            json!({
                "timestamp": format!("2019-10-04T{h:02}:00:00Z"),
                "value": 1,
                "quality_flag": 0
            })
        })
        .collect();
    json!({ "values": rows })
}

fn lifecycle_body() -> Value {
    json!({
        "interval_length": "1h",
        "interval_label": "ending",
        "timezone": "UTC",
        "aggregate_function": "sum",
        "observations": [
            {"observation_id": IDS[0], "effective_from": "2019-10-01T11:00:00Z"},
            {"observation_id": IDS[1], "effective_from": "2019-10-04T05:01:00Z"},
            {"observation_id": IDS[2], "effective_from": "2019-10-01T11:00:00Z",
             "effective_until": "2019-10-04T04:00:00Z"},
            {"observation_id": IDS[2], "effective_from": "2019-10-04T07:00:00Z",
             "effective_until": "2019-10-04T08:00:00Z"},
            {"observation_id": IDS[2], "effective_from": "2019-10-04T08:01:00Z"}
        ],
        "data": {
            IDS[0]: ten_hourly_ones(),
            IDS[1]: ten_hourly_ones(),
            IDS[2]: ten_hourly_ones()
        }
    })
}

#[tokio::test]
async fn aggregate_endpoint_combines_lifecycles() -> Result<()> {
    // ---
    let Some(addr) = spawn_app().await else {
        eprintln!("skipping: cannot bind to loopback in this environment");
        return Ok(());
    };
    let client = Client::new();

    let health = assert_ok!(client.get(format!("http://{addr}/health")).send().await);
    assert_eq!(health.status(), StatusCode::OK);

    let resp = client
        .post(format!("http://{addr}/aggregate"))
        .json(&lifecycle_body())
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: AggregateResponse = resp.json().await?;
    assert_eq!(body.values.len(), 10);

    let values: Vec<Option<f64>> = body.values.iter().map(|r| r.value).collect();
    assert_eq!(
        values,
        [2.0, 2.0, 2.0, 2.0, 2.0, 1.0, 2.0, 3.0, 3.0, 3.0].map(Some).to_vec()
    );
    assert!(body.values.iter().all(|r| r.quality_flag == 0));
    assert_eq!(
        body.values[0].timestamp.to_rfc3339(),
        "2019-10-04T00:00:00+00:00"
    );

    Ok(())
}

#[tokio::test]
async fn aggregate_endpoint_reports_errors() -> Result<()> {
    // ---
    let Some(addr) = spawn_app().await else {
        eprintln!("skipping: cannot bind to loopback in this environment");
        return Ok(());
    };
    let client = Client::new();
    let url = format!("http://{addr}/aggregate");

    // deleted without being retired first
    let mut body = lifecycle_body();
    body["observations"]
        .as_array_mut()
        .unwrap()
        .push(json!({
            "observation_id": "0fe9f2ba-ea0b-11e9-a7da-f4939feddd82",
            "effective_from": "2019-10-01T11:00:00Z",
            "observation_deleted_at": "2019-10-05T00:00:00Z"
        }));
    let resp = client.post(&url).json(&body).send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: ErrorResponse = resp.json().await?;
    assert_eq!(err.kind, "value");

    let mut body = lifecycle_body();
    body["interval_label"] = json!("instant");
    let resp = client.post(&url).json(&body).send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: ErrorResponse = resp.json().await?;
    assert_eq!(err.kind, "value");

    let mut body = lifecycle_body();
    body["data"] = json!({});
    let resp = client.post(&url).json(&body).send().await?;
    let err: ErrorResponse = resp.json().await?;
    assert_eq!(err.kind, "key");

    Ok(())
}
