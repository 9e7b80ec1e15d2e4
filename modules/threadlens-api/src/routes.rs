use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use threadlens_common::{Job, JobProgress, JobStatus, SortMode, TimeWindow};
use threadlens_engine::runner::CANCELLED_MESSAGE;
use threadlens_engine::insights;

use crate::AppState;

// --- Request/response shapes ---

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub subreddits: Vec<String>,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub time_window: TimeWindow,
    #[serde(default)]
    pub sort: SortMode,
    #[serde(default = "default_post_limit")]
    pub post_limit: u32,
}

fn default_post_limit() -> u32 {
    50
}

#[derive(Serialize)]
pub struct CreateJobResponse {
    #[serde(flatten)]
    pub job: Job,
    /// Rough wall-clock estimate, seconds.
    pub estimated_seconds: u64,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// --- Helpers ---

fn internal_error(err: anyhow::Error) -> Response {
    warn!(error = %err, "Request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.to_string() })),
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Job not found" })),
    )
        .into_response()
}

fn conflict(message: &str) -> Response {
    (StatusCode::CONFLICT, Json(json!({ "error": message }))).into_response()
}

fn spawn_runner(state: &Arc<AppState>, job_id: Uuid) {
    let runner = state.runner.clone();
    tokio::spawn(async move {
        if let Err(e) = runner.run(job_id).await {
            tracing::error!(%job_id, error = %e, "Job run ended with error");
        }
    });
}

// --- Handlers ---

pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateJobRequest>,
) -> Response {
    // Invalid configuration is rejected before a job exists.
    if req.subreddits.is_empty() || req.keywords.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "subreddits and keywords must be non-empty" })),
        )
            .into_response();
    }
    if req.post_limit == 0 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "post_limit must be at least 1" })),
        )
            .into_response();
    }

    let job = Job::builder()
        .subreddits(req.subreddits)
        .keywords(req.keywords)
        .time_window(req.time_window)
        .sort(req.sort)
        .post_limit(req.post_limit)
        .progress(JobProgress::new(0, 0, "Queued", 0))
        .build();

    if let Err(e) = state.store.save_job(&job).await {
        return internal_error(e);
    }
    spawn_runner(&state, job.id);

    let total_searches = job.total_searches() as u64;
    let estimated_posts = total_searches * job.post_limit as u64 / 2;
    let estimated_seconds = total_searches * 3 + estimated_posts * 2;

    (
        StatusCode::CREATED,
        Json(CreateJobResponse {
            job,
            estimated_seconds,
        }),
    )
        .into_response()
}

pub async fn get_job(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match state.store.get_job(id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => not_found(),
        Err(e) => internal_error(e),
    }
}

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);

    match state.store.list_jobs(limit, offset).await {
        Ok((total, jobs)) => Json(json!({ "total": total, "jobs": jobs })).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn pause_job(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    let mut job = match state.store.get_job(id).await {
        Ok(Some(job)) => job,
        Ok(None) => return not_found(),
        Err(e) => return internal_error(e),
    };

    if !matches!(job.status, JobStatus::Running | JobStatus::Pending) {
        return conflict("Job is not running or pending");
    }

    job.status = JobStatus::Paused;
    if let Err(e) = state.store.save_job(&job).await {
        return internal_error(e);
    }
    Json(json!({ "status": "paused", "job_id": id })).into_response()
}

pub async fn resume_job(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    let mut job = match state.store.get_job(id).await {
        Ok(Some(job)) => job,
        Ok(None) => return not_found(),
        Err(e) => return internal_error(e),
    };

    if job.status != JobStatus::Paused {
        return conflict("Job is not paused");
    }

    // The runner re-enters from the last persisted progress; re-fetching
    // already committed pages is idempotent.
    job.status = JobStatus::Running;
    if let Err(e) = state.store.save_job(&job).await {
        return internal_error(e);
    }
    spawn_runner(&state, id);
    Json(json!({ "status": "resumed", "job_id": id })).into_response()
}

pub async fn cancel_job(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    let mut job = match state.store.get_job(id).await {
        Ok(Some(job)) => job,
        Ok(None) => return not_found(),
        Err(e) => return internal_error(e),
    };

    if job.status.is_terminal() {
        return conflict("Job is not active");
    }

    job.status = JobStatus::Failed;
    job.error_message = Some(CANCELLED_MESSAGE.to_string());
    if let Err(e) = state.store.save_job(&job).await {
        return internal_error(e);
    }
    Json(json!({ "status": "cancelled", "job_id": id })).into_response()
}

pub async fn delete_job(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match state.store.get_job(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found(),
        Err(e) => return internal_error(e),
    }

    match state.store.delete_job(id).await {
        Ok(()) => Json(json!({ "status": "deleted", "job_id": id })).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn list_posts(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match state.store.get_job(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found(),
        Err(e) => return internal_error(e),
    }

    match state.store.list_posts(id).await {
        Ok(posts) => Json(posts).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn get_insights(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match state.store.get_job(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found(),
        Err(e) => return internal_error(e),
    }

    let posts = match state.store.list_posts(id).await {
        Ok(posts) => posts,
        Err(e) => return internal_error(e),
    };
    let items = match state.store.list_action_items(id).await {
        Ok(items) => items,
        Err(e) => return internal_error(e),
    };

    let summary = insights::aggregate(&posts);
    Json(json!({ "summary": summary, "action_items": items })).into_response()
}

pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let model_available = state.model.healthy().await;
    Json(json!({ "status": "ok", "model_available": model_available })).into_response()
}
