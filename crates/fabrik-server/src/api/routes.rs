//! Import job routes
//!
//! Tenant-scoped management surface for the import engine: create, list,
//! inspect, cancel, retry, and direct row submission for preloaded jobs. The
//! calling factory is identified by the `x-factory-id` header; jobs of other
//! factories are indistinguishable from non-existent ones.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiResult, AppError};
use crate::import::types::{CreateJobParams, JobProjection, JobStatus, SourceType, TelemetryRow};
use crate::import::{ImportError, JobStore, WorkerHandle};

/// Header carrying the calling factory's id.
pub const FACTORY_ID_HEADER: &str = "x-factory-id";

/// Shared state for the import-jobs routes.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn JobStore>,
    pub worker: WorkerHandle,
}

/// Create import job routes
pub fn import_jobs_routes() -> Router<ApiState> {
    Router::new()
        .route("/import-jobs", get(list_jobs).post(create_job))
        .route("/import-jobs/:job_id", get(get_job))
        .route("/import-jobs/:job_id/cancel", post(cancel_job))
        .route("/import-jobs/:job_id/retry", post(retry_job))
        .route("/import-jobs/:job_id/rows", post(submit_rows))
}

fn factory_id(headers: &HeaderMap) -> Result<Uuid, AppError> {
    let value = headers
        .get(FACTORY_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Validation(format!("{FACTORY_ID_HEADER} header is required"))
        })?;
    Uuid::parse_str(value)
        .map_err(|_| AppError::Validation(format!("{FACTORY_ID_HEADER} must be a UUID")))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobProjection>,
    pub count: usize,
}

/// List recent jobs for the calling factory
///
/// GET /import-jobs?limit=50
async fn list_jobs(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<impl IntoResponse> {
    let factory = factory_id(&headers)?;
    let jobs = state
        .store
        .list(factory, query.limit.unwrap_or(0))
        .await?;
    let jobs: Vec<JobProjection> = jobs.into_iter().map(JobProjection::from).collect();
    let count = jobs.len();
    Ok(Json(ListJobsResponse { jobs, count }))
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub asset_id: Option<Uuid>,
    pub requested_by: Option<Uuid>,
    pub source_type: Option<String>,
    pub source_config: Option<serde_json::Value>,
    pub batch_size: Option<i32>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

/// Create a new import job in `pending`
///
/// POST /import-jobs
async fn create_job(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<impl IntoResponse> {
    let factory = factory_id(&headers)?;

    let source_type = match request.source_type.as_deref() {
        None => None,
        Some(s) => Some(SourceType::parse(s).ok_or_else(|| {
            AppError::Validation(format!("unknown source_type '{s}'"))
        })?),
    };
    if let (Some(start), Some(end)) = (request.period_start, request.period_end) {
        if start >= end {
            return Err(AppError::Validation(
                "period_start must be before period_end".to_string(),
            ));
        }
    }

    let id = state
        .store
        .create(CreateJobParams {
            factory_id: factory,
            asset_id: request.asset_id,
            requested_by: request.requested_by,
            source_type,
            source_config: request.source_config,
            batch_size: request.batch_size,
            period_start: request.period_start,
            period_end: request.period_end,
        })
        .await?;

    let job = fetch_projection(&*state.store, id, factory).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// Get one job with computed progress
///
/// GET /import-jobs/:job_id
async fn get_job(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let factory = factory_id(&headers)?;
    let job = fetch_projection(&*state.store, job_id, factory).await?;
    Ok(Json(job))
}

/// Request cooperative cancellation of a pending or running job
///
/// POST /import-jobs/:job_id/cancel
async fn cancel_job(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let factory = factory_id(&headers)?;
    state.store.request_cancel(job_id, factory).await?;
    let job = fetch_projection(&*state.store, job_id, factory).await?;
    Ok(Json(job))
}

/// Reset a failed or cancelled job to `pending`
///
/// POST /import-jobs/:job_id/retry
async fn retry_job(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let factory = factory_id(&headers)?;
    state.store.retry(job_id, factory).await?;
    let job = fetch_projection(&*state.store, job_id, factory).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct SubmitRowInput {
    pub ts: DateTime<Utc>,
    pub asset_id: Option<Uuid>,
    pub metric_key: String,
    pub metric_value: f64,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRowsRequest {
    pub rows: Vec<SubmitRowInput>,
}

/// Hand a preloaded row set to the worker and wait for the job to finish
///
/// POST /import-jobs/:job_id/rows
///
/// The job must be a `pending` preloaded job; a `failed` one is reset to
/// `pending` first so a resubmission after a transient failure just works.
/// Each row is stamped with the calling factory and the job id as its
/// correlation id.
async fn submit_rows(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
    Json(request): Json<SubmitRowsRequest>,
) -> ApiResult<impl IntoResponse> {
    let factory = factory_id(&headers)?;
    if request.rows.is_empty() {
        return Err(AppError::Validation("rows must not be empty".to_string()));
    }

    let job = state
        .store
        .get(job_id, factory)
        .await?
        .ok_or(ImportError::NotFound)?;
    if job.source_type != SourceType::Preloaded {
        return Err(AppError::Validation(format!(
            "job source_type is '{}'; only preloaded jobs accept direct rows",
            job.source_type.as_str()
        )));
    }
    match job.status {
        JobStatus::Pending => {}
        JobStatus::Failed => state.store.retry(job_id, factory).await?,
        status => {
            return Err(AppError::Conflict(format!(
                "job in status '{status}' does not accept rows"
            )));
        }
    }

    let correlation_id = job_id.to_string();
    let mut rows = Vec::with_capacity(request.rows.len());
    for (i, input) in request.rows.into_iter().enumerate() {
        if input.metric_key.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "rows[{i}]: metric_key is required"
            )));
        }
        rows.push(TelemetryRow {
            ts: input.ts,
            factory_id: factory,
            asset_id: input.asset_id.or(job.asset_id),
            metric_key: input.metric_key,
            metric_value: input.metric_value,
            status: input.status.unwrap_or_else(|| "OK".to_string()),
            correlation_id: Some(correlation_id.clone()),
        });
    }

    state.worker.submit_preloaded(job_id, rows).await?;
    let job = fetch_projection(&*state.store, job_id, factory).await?;
    Ok(Json(job))
}

async fn fetch_projection(
    store: &dyn JobStore,
    id: Uuid,
    factory: Uuid,
) -> Result<JobProjection, AppError> {
    let job = store.get(id, factory).await?.ok_or(ImportError::NotFound)?;
    Ok(JobProjection::from(job))
}
