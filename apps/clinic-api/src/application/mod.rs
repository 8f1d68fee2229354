use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use core_lib::CoreError;
use serde_json::json;
use tracing::{error, warn};

// Declare sub-modules within the application layer
pub mod authz;
pub mod batches;
pub mod commands;
pub mod extract;
pub mod middleware;
pub mod products;
pub mod query;
pub mod session;
pub mod trial_sweeper;
pub mod webhooks;

/// Error returned by every handler. Renders as `{"error": message}`.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".into()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".into()),
            ApiError::Core(err) => match err {
                CoreError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                CoreError::AlreadyExists(_) => (StatusCode::CONFLICT, "Already exists".into()),
                CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
                CoreError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden".into()),
                CoreError::Upstream(_)
                | CoreError::Infrastructure(_)
                | CoreError::Configuration(_)
                | CoreError::Internal(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                ),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!("Request failed: {:?}", self);
        } else if status != StatusCode::NOT_FOUND {
            warn!(%status, "Request rejected: {}", self);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
