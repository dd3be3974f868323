use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::{ChatError, Entity};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("not logged in")]
    Unauthenticated,

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Chat(ChatError::Storage(err))
    }
}

const NOT_AUTHORIZED: &str = "not authorized";
const INTERNAL: &str = "an internal error occurred";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Chat(err) => match err {
                // a missing room or message answers exactly like a forbidden one
                ChatError::Unauthorized
                | ChatError::NotFound(Entity::Room)
                | ChatError::NotFound(Entity::Message) => {
                    (StatusCode::FORBIDDEN, NOT_AUTHORIZED.to_owned())
                }
                ChatError::NotFound(Entity::User) => (StatusCode::NOT_FOUND, err.to_string()),
                ChatError::Duplicate(_) => (StatusCode::CONFLICT, err.to_string()),
                ChatError::Invalid(_) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
                ChatError::InvalidCredentials => (StatusCode::UNAUTHORIZED, err.to_string()),
                ChatError::Throttled => (StatusCode::TOO_MANY_REQUESTS, err.to_string()),
                ChatError::Storage(_) | ChatError::Hash(_) => {
                    tracing::error!(error = %err, "request failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_owned())
                }
            },
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Session(err) => {
                tracing::error!(error = %err, "session store failed");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_owned())
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, backtrace = %err.backtrace(), "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_owned())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Fallback for routes that exist but not with the request's method.
pub async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "method not allowed" })),
    )
        .into_response()
}
