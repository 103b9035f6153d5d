use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::DateTime;
use loadline_ingestor_core::{
    FixedMemoryProbe, Ingress, IngressOptions, MemoryGate, TelemetryLog, WorkerPool,
    WorkerPoolClient, WorkerPoolOptions, run_worker_pool,
};
use loadline_ingestor_http::{
    ErrorResponse, HttpIngestor, OVERLOADED_MESSAGE, ServerStatus, StatusResponse, WriteReport,
};
use loadline_storage::{MemoryStorage, Point};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct TestServer {
    router: Router,
    probe: Arc<FixedMemoryProbe>,
    storage: MemoryStorage,
    client: WorkerPoolClient,
    _ct: tokio_util::sync::DropGuard,
}

fn create_server() -> TestServer {
    let storage = MemoryStorage::new();
    let options = WorkerPoolOptions::new(2, 100, Duration::from_secs(10));
    let pool = WorkerPool::new(options, Arc::new(storage.clone())).expect("worker pool");
    let client = pool.client();

    let ct = CancellationToken::new();
    tokio::spawn({
        let ct = ct.clone();
        async move {
            run_worker_pool(pool, ct).await.expect("worker pool run");
        }
    });

    let probe = Arc::new(FixedMemoryProbe::new(4096));
    let gate = MemoryGate::new(200, probe.clone()).expect("memory gate");
    let ingress = Ingress::new(
        IngressOptions::from(&options),
        gate,
        client.clone(),
        TelemetryLog::disabled(),
    );

    TestServer {
        router: HttpIngestor::new(ingress).into_router(),
        probe,
        storage,
        client,
        _ct: ct.drop_guard(),
    }
}

fn points(n: usize) -> Vec<Point> {
    let start = DateTime::from_timestamp_millis(1633046400000).expect("valid timestamp");
    (0..n)
        .map(|i| {
            Point::new(
                "humidity",
                format!("hum_{i:04}"),
                (i % 100) as f64,
                start + chrono::Duration::seconds(i as i64),
            )
        })
        .collect()
}

fn write_request(body: impl Into<Body>) -> Request<Body> {
    Request::post("/write-data")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .expect("request")
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec()
}

#[tokio::test]
async fn test_write_data() {
    let server = create_server();
    let body = serde_json::to_vec(&points(250)).unwrap();

    let response = server
        .router
        .clone()
        .oneshot(write_request(body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let report: WriteReport = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(report.workers_num, 2);
    assert_eq!(report.batch_size, 100);
    assert_eq!(report.rows_received, 250);
    assert_eq!(report.rows_written, 250);
    assert_eq!(server.storage.num_points().await, 250);
}

#[tokio::test]
async fn test_write_data_with_generator_format() {
    let server = create_server();
    let body = r#"[
        {"measurement":"CO2","tagId":"cdx_0042","value":"812.25","timestamp":1633046400000},
        {"measurement":"CO2","tagId":"cdx_0043","value":903.5,"timestamp":1633046401000}
    ]"#;

    let response = server
        .router
        .clone()
        .oneshot(write_request(body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let lines = server.storage.lines().await;
    assert_eq!(
        lines,
        vec![
            "CO2,tagId=cdx_0042 value=812.25 1633046400000000000".to_string(),
            "CO2,tagId=cdx_0043 value=903.5 1633046401000000000".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_overloaded() {
    let server = create_server();
    server.probe.set_free_memory_mb(150);

    let response = server
        .router
        .clone()
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status: StatusResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(status.status, ServerStatus::Overloaded);

    let body = serde_json::to_vec(&points(500)).unwrap();
    let response = server
        .router
        .clone()
        .oneshot(write_request(body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_bytes(response).await, OVERLOADED_MESSAGE.as_bytes());

    let pool_status = server.client.status().await.unwrap();
    assert_eq!(pool_status.queued_batches, 0);
    assert_eq!(pool_status.pending_payloads, 0);
    assert_eq!(server.storage.num_points().await, 0);
}

#[tokio::test]
async fn test_status_ready() {
    let server = create_server();

    let response = server
        .router
        .clone()
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, br#"{"status":"ready"}"#);
}

#[tokio::test]
async fn test_invalid_json() {
    let server = create_server();

    let response = server
        .router
        .clone()
        .oneshot(write_request("[{\"measurement\":"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.storage.num_points().await, 0);
}

#[tokio::test]
async fn test_pool_closed_is_internal_error() {
    let server = create_server();
    server.client.shutdown().await;

    let body = serde_json::to_vec(&points(10)).unwrap();
    let response = server
        .router
        .clone()
        .oneshot(write_request(body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(error.message.contains("worker pool is closed"));
}
