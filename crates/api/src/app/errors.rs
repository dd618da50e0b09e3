use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use fynelo_queue::QueueError;

pub fn queue_error_to_response(err: QueueError) -> axum::response::Response {
    match err {
        QueueError::BrokerUnavailable(_) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "queue_unavailable",
            "queue service unavailable",
        ),
        QueueError::JobNotFound(id) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found"))
        }
        QueueError::Serialization(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        QueueError::InvalidTransition(msg) => {
            json_error(StatusCode::CONFLICT, "invalid_transition", msg)
        }
        QueueError::Store(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
