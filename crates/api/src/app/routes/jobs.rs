use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;

use fynelo_core::{JobId, UserId};
use fynelo_queue::{QueueError, SharedQueueClient};

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/stats", get(queue_stats))
        .route("/:id", get(get_job))
        .route("/user/:user_id", get(list_user_jobs))
}

/// Run a synchronous queue call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, axum::response::Response>
where
    F: FnOnce() -> Result<T, QueueError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(errors::queue_error_to_response(e)),
        Err(e) => Err(errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            e.to_string(),
        )),
    }
}

pub async fn get_job(
    Extension(client): Extension<SharedQueueClient>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: JobId = match id.parse() {
        Ok(id) => id,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_job_id", e.to_string());
        }
    };

    match blocking(move || client.get_job_status(&id)).await {
        Ok(job) => Json(job).into_response(),
        Err(resp) => resp,
    }
}

pub async fn list_user_jobs(
    Extension(client): Extension<SharedQueueClient>,
    Path(user_id): Path<String>,
) -> axum::response::Response {
    let raw: u64 = match user_id.parse() {
        Ok(raw) => raw,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_user_id", e.to_string());
        }
    };
    // User 0 owns nothing; jobs without an owner are never indexed.
    let Some(user_id) = UserId::from_raw(raw) else {
        return Json(dto::UserJobsResponse::from(Vec::new())).into_response();
    };

    match blocking(move || client.get_user_jobs(user_id)).await {
        Ok(jobs) => Json(dto::UserJobsResponse::from(jobs)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn queue_stats(
    Extension(client): Extension<SharedQueueClient>,
) -> axum::response::Response {
    let stats = blocking(move || {
        client.ping()?;
        client.get_queue_length()
    })
    .await;

    match stats {
        Ok(queue_length) => Json(dto::QueueStatsResponse {
            available: true,
            queue_length,
            status: "healthy",
        })
        .into_response(),
        Err(resp) if resp.status() == StatusCode::SERVICE_UNAVAILABLE => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "queue_unavailable",
                "message": "queue service unavailable",
                "available": false,
            })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}
