use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{QueueError, StoreError};
use crate::intake::{LogicalClock, Submission};
use crate::queue::QueueRegistry;
use crate::scheduler::{Category, JobStore, ScheduleEntry, ScheduleReader};

#[derive(Clone)]
pub struct ApiState {
    pub queues: QueueRegistry,
    pub reader: ScheduleReader,
    pub jobs: Arc<dyn JobStore>,
    pub clock: Arc<LogicalClock>,
}

/// Body of submission responses and of every error response.
#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitJobResponse {
    pub accepted: bool,
    pub category: Option<String>,
    pub time_stamp: Option<i64>,
    pub error: Option<String>,
}

impl SubmitJobResponse {
    fn error(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            category: None,
            time_stamp: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Deserialize)]
pub struct ScheduleQuery {
    pub category: Option<String>,
}

#[derive(Serialize)]
struct ScheduleResponse {
    version: u64,
    jobs: Vec<ScheduleEntry>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    jobs: usize,
    schedule_version: u64,
}

/// All HTTP routes, without binding a listener.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/schedule", get(schedule_handler))
        .route("/api/jobs", get(list_jobs_handler))
        .route("/api/:category/jobs", post(submit_job_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_api(
    addr: SocketAddr,
    state: ApiState,
    shutdown: CancellationToken,
) -> crate::error::Result<()> {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn health_handler(State(state): State<ApiState>) -> Response {
    let status = async {
        let jobs = state.jobs.len().await?;
        let schedule = state.reader.current().await?;
        Ok::<_, StoreError>(HealthResponse {
            status: "ok",
            jobs,
            schedule_version: schedule.version,
        })
    }
    .await;

    match status {
        Ok(health) => (StatusCode::OK, Json(health)).into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

async fn schedule_handler(
    State(state): State<ApiState>,
    Query(query): Query<ScheduleQuery>,
) -> Response {
    let category = query
        .category
        .filter(|c| !c.is_empty())
        .map(Category::new);

    match state.reader.current().await {
        Ok(schedule) => Json(ScheduleResponse {
            version: schedule.version,
            jobs: schedule.filtered(category.as_ref()),
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read schedule");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn list_jobs_handler(State(state): State<ApiState>) -> Response {
    match state.jobs.list_ordered().await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list jobs");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Shape-check a submission, stamp it and enqueue it on its category queue.
///
/// The receipt stamp replaces any `time_stamp` in the body. Dependency checks
/// happen later in the consumer, so `202` only means the submission was
/// well-formed and queued.
async fn submit_job_handler(
    State(state): State<ApiState>,
    Path(category): Path<String>,
    body: Bytes,
) -> Response {
    let category = Category::new(category);

    let queue = match state.queues.get(&category) {
        Ok(queue) => queue,
        Err(e) => return error_response(StatusCode::NOT_FOUND, e.to_string()),
    };

    let submission = match Submission::from_json(&body) {
        Ok(submission) => submission,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    if let Err(e) = submission.normalize() {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }

    let time_stamp = state.clock.now();
    let submission = submission.stamped(time_stamp);

    match queue.publish(submission.to_json()).await {
        Ok(()) => {
            tracing::debug!(category = %category, time_stamp, "Submission enqueued");
            (
                StatusCode::ACCEPTED,
                Json(SubmitJobResponse {
                    accepted: true,
                    category: Some(category.to_string()),
                    time_stamp: Some(time_stamp),
                    error: None,
                }),
            )
                .into_response()
        }
        Err(e @ QueueError::Full { .. }) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e) => {
            tracing::error!(category = %category, error = %e, "Failed to enqueue submission");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(SubmitJobResponse::error(message))).into_response()
}
