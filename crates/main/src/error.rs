use application::{ApplicationError, EventBusError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match &error {
            ApplicationError::Domain(_) | ApplicationError::Validation(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_MESSAGE", error.to_string())
            }
            ApplicationError::ChatNotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, "CHAT_NOT_FOUND", error.to_string())
            }
            ApplicationError::NotParticipant { .. } => {
                ApiError::new(StatusCode::FORBIDDEN, "NOT_PARTICIPANT", error.to_string())
            }
            ApplicationError::Persistence(_) => {
                tracing::error!(error = %error, "persistence failure");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PERSISTENCE_FAILED",
                    "message could not be stored",
                )
            }
            ApplicationError::EventBus(EventBusError::Closed) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "SHUTTING_DOWN",
                error.to_string(),
            ),
            ApplicationError::EventBus(_) => {
                tracing::error!(error = %error, "event dispatch failure");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "EVENT_DISPATCH_FAILED",
                    error.to_string(),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
