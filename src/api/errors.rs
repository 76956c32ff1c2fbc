use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::error::{EngineError, StoreError};

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Gone(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Gone(_) => StatusCode::GONE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(_) => ApiError::NotFound(err.to_string()),
            EngineError::NotStarted | EngineError::WindowClosed => {
                ApiError::Forbidden(err.to_string())
            }
            EngineError::AlreadyCompleted
            | EngineError::NotFinished
            | EngineError::NoChaptersDefined
            | EngineError::InsufficientQuestions { .. } => ApiError::Conflict(err.to_string()),
            EngineError::Expired => ApiError::Gone(err.to_string()),
            EngineError::MalformedAnswer(_) | EngineError::UnknownQuestion(_) => {
                ApiError::BadRequest(err.to_string())
            }
            EngineError::Store(inner) => ApiError::internal(inner, "Storage operation failed"),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::internal(err, "Storage operation failed")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::Unauthorized(message) => message.to_string(),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                message
            }
            ApiError::Forbidden(message)
            | ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message)
            | ApiError::Gone(message) => message,
        };

        let mut response =
            (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::Difficulty;

    #[test]
    fn engine_errors_map_to_http_statuses() {
        let cases = [
            (EngineError::NotFound("exam"), StatusCode::NOT_FOUND),
            (EngineError::WindowClosed, StatusCode::FORBIDDEN),
            (EngineError::AlreadyCompleted, StatusCode::CONFLICT),
            (EngineError::Expired, StatusCode::GONE),
            (EngineError::MalformedAnswer("x".to_string()), StatusCode::BAD_REQUEST),
            (
                EngineError::InsufficientQuestions {
                    chapter: 1,
                    difficulty: Difficulty::Hard,
                    requested: 3,
                    available: 1,
                },
                StatusCode::CONFLICT,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }

    #[test]
    fn every_variant_renders_its_status_in_the_body() {
        let cases = [
            (ApiError::Unauthorized("no token"), StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden("no".to_string()), StatusCode::FORBIDDEN),
            (ApiError::BadRequest("bad".to_string()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("gone".to_string()), StatusCode::NOT_FOUND),
            (ApiError::Conflict("busy".to_string()), StatusCode::CONFLICT),
            (ApiError::Gone("late".to_string()), StatusCode::GONE),
            (ApiError::Internal("boom".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let response = err.into_response();
            assert_eq!(response.status(), expected);
            assert_eq!(
                response.headers().contains_key(header::WWW_AUTHENTICATE),
                expected == StatusCode::UNAUTHORIZED
            );
        }
    }
}
