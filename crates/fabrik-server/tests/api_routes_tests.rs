//! Integration tests for the import-job routes
//!
//! Drives the axum router end to end against the in-memory store and a live
//! worker: tenant header handling, job creation defaults, row submission
//! (validation, stamping, auto-reset of failed jobs), and transition errors
//! surfacing as the right HTTP statuses.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use fabrik_server::api::{import_jobs_routes, ApiState};
use fabrik_server::import::memory::{MemoryJobStore, MemoryTelemetrySink};
use fabrik_server::import::types::{CreateJobParams, JobStatus, SourceType};
use fabrik_server::import::{ImportWorker, JobStore, WorkerConfig};

struct TestApp {
    router: Router,
    store: Arc<MemoryJobStore>,
    sink: Arc<MemoryTelemetrySink>,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryJobStore::new());
    let sink = Arc::new(MemoryTelemetrySink::new());
    let config = WorkerConfig {
        // Poll stays out of the way; jobs only run via direct submission.
        poll_interval: Duration::from_secs(3600),
        batch_throttle: Duration::ZERO,
        ..Default::default()
    };
    let (worker, handle) = ImportWorker::new(store.clone(), sink.clone(), config);
    worker.spawn();

    let state = ApiState {
        store: store.clone(),
        worker: handle,
    };
    TestApp {
        router: import_jobs_routes().with_state(state),
        store,
        sink,
    }
}

impl TestApp {
    async fn request(
        &self,
        method: &str,
        uri: &str,
        factory: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(factory) = factory {
            builder = builder.header("x-factory-id", factory.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn create_pending(&self, factory: Uuid, source_type: SourceType) -> Uuid {
        self.store
            .create(CreateJobParams {
                factory_id: factory,
                batch_size: Some(100),
                source_type: Some(source_type),
                ..Default::default()
            })
            .await
            .unwrap()
    }
}

fn rows_body(n: usize) -> Value {
    let base = Utc::now();
    let rows: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "ts": base + chrono::Duration::seconds(i as i64),
                "metric_key": "motor_temp",
                "metric_value": 20.0 + i as f64,
            })
        })
        .collect();
    json!({ "rows": rows })
}

#[tokio::test]
async fn test_missing_tenant_header_is_rejected() {
    let app = test_app();
    let (status, body) = app.request("GET", "/import-jobs", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("x-factory-id"));
}

#[tokio::test]
async fn test_create_applies_defaults() {
    let app = test_app();
    let factory = Uuid::new_v4();

    let (status, body) = app
        .request("POST", "/import-jobs", Some(factory), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["source_type"], "preloaded");
    assert_eq!(body["batch_size"], 1000);
    assert_eq!(body["factory_id"], factory.to_string());
    assert_eq!(body["progress_pct"], 0.0);
}

#[tokio::test]
async fn test_create_rejects_bad_input() {
    let app = test_app();
    let factory = Uuid::new_v4();

    let (status, _) = app
        .request(
            "POST",
            "/import-jobs",
            Some(factory),
            Some(json!({"source_type": "csv"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let start = Utc::now();
    let (status, _) = app
        .request(
            "POST",
            "/import-jobs",
            Some(factory),
            Some(json!({"period_start": start, "period_end": start})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_is_tenant_scoped() {
    let app = test_app();
    let factory = Uuid::new_v4();
    let id = app.create_pending(factory, SourceType::Preloaded).await;

    let (status, _) = app
        .request("GET", &format!("/import-jobs/{id}"), Some(factory), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // Another tenant must see a 404, not a 403.
    let (status, _) = app
        .request(
            "GET",
            &format!("/import-jobs/{id}"),
            Some(Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_returns_tenant_jobs_most_recent_first() {
    let app = test_app();
    let factory = Uuid::new_v4();
    let first = app.create_pending(factory, SourceType::Preloaded).await;
    let second = app.create_pending(factory, SourceType::Preloaded).await;
    app.create_pending(Uuid::new_v4(), SourceType::Preloaded)
        .await;

    let (status, body) = app
        .request("GET", "/import-jobs?limit=10", Some(factory), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["jobs"][0]["id"], second.to_string());
    assert_eq!(body["jobs"][1]["id"], first.to_string());
}

#[tokio::test]
async fn test_submit_rows_runs_job_and_stamps_rows() {
    let app = test_app();
    let factory = Uuid::new_v4();
    let id = app.create_pending(factory, SourceType::Preloaded).await;

    let (status, body) = app
        .request(
            "POST",
            &format!("/import-jobs/{id}/rows"),
            Some(factory),
            Some(rows_body(250)),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "done");
    assert_eq!(body["rows_total"], 250);
    assert_eq!(body["rows_done"], 250);
    assert_eq!(body["progress_pct"], 100.0);

    // Every written row carries the tenant, the default status, and the job
    // id as its correlation id.
    let written = app.sink.rows();
    assert_eq!(written.len(), 250);
    assert!(written
        .iter()
        .all(|r| r.factory_id == factory
            && r.status == "OK"
            && r.correlation_id.as_deref() == Some(id.to_string().as_str())));
}

#[tokio::test]
async fn test_submit_rows_resets_failed_job_before_running() {
    let app = test_app();
    let factory = Uuid::new_v4();
    let id = app.create_pending(factory, SourceType::Preloaded).await;

    // A prior run left the job failed; resubmission must just work.
    app.store.claim_pending_by_id(id, 100).await.unwrap();
    app.store.mark_failed(id, "source went away").await.unwrap();

    let (status, body) = app
        .request(
            "POST",
            &format!("/import-jobs/{id}/rows"),
            Some(factory),
            Some(rows_body(50)),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "done");
    assert_eq!(body["rows_done"], 50);
    assert!(body.get("error_message").is_none() || body["error_message"].is_null());
}

#[tokio::test]
async fn test_submit_rows_validation() {
    let app = test_app();
    let factory = Uuid::new_v4();
    let id = app.create_pending(factory, SourceType::Preloaded).await;

    // Empty row set.
    let (status, _) = app
        .request(
            "POST",
            &format!("/import-jobs/{id}/rows"),
            Some(factory),
            Some(json!({"rows": []})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Blank metric_key.
    let (status, body) = app
        .request(
            "POST",
            &format!("/import-jobs/{id}/rows"),
            Some(factory),
            Some(json!({"rows": [
                {"ts": Utc::now(), "metric_key": "  ", "metric_value": 1.0}
            ]})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("metric_key"));

    // Nothing ran; the job is still pending.
    let job = app.store.get(id, factory).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
}

#[tokio::test]
async fn test_submit_rows_rejected_for_non_preloaded_job() {
    let app = test_app();
    let factory = Uuid::new_v4();
    let id = app.create_pending(factory, SourceType::RemoteHttp).await;

    let (status, body) = app
        .request(
            "POST",
            &format!("/import-jobs/{id}/rows"),
            Some(factory),
            Some(rows_body(10)),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("preloaded"));
}

#[tokio::test]
async fn test_cancel_and_retry_transition_errors() {
    let app = test_app();
    let factory = Uuid::new_v4();
    let id = app.create_pending(factory, SourceType::Preloaded).await;

    // Pending jobs cannot be retried.
    let (status, _) = app
        .request(
            "POST",
            &format!("/import-jobs/{id}/retry"),
            Some(factory),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Pending jobs can be cancelled, once.
    let (status, body) = app
        .request(
            "POST",
            &format!("/import-jobs/{id}/cancel"),
            Some(factory),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, _) = app
        .request(
            "POST",
            &format!("/import-jobs/{id}/cancel"),
            Some(factory),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Cancelled jobs can be retried back to pending.
    let (status, body) = app
        .request(
            "POST",
            &format!("/import-jobs/{id}/retry"),
            Some(factory),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
}
