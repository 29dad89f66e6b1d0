use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::store::StoreError;

// ---------------------------------------------------------------------------
// Domain errors
// ---------------------------------------------------------------------------

/// Failure modes of the real-time core, shared by the gateway and HTTP surfaces.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conversation not found")]
    ConversationNotFound,

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("a request between these users already exists")]
    DuplicateRequest,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A result could not be encoded for the wire.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CoreError {
    /// Stable machine-readable code, used in HTTP bodies and gateway command results.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::ConversationNotFound => "CONVERSATION_NOT_FOUND",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::DuplicateRequest => "DUPLICATE_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Validation(_) => "BAD_REQUEST",
            Self::Store(e) if e.is_transient() => "UNAVAILABLE",
            Self::Store(_) | Self::Encode(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to clients. Store details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Store(e) if e.is_transient() => "Service temporarily unavailable".to_string(),
            Self::Store(_) | Self::Encode(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::ConversationNotFound => StatusCode::NOT_FOUND,
            Self::InvalidTransition(_) | Self::DuplicateRequest => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Store(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) | Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

// ---------------------------------------------------------------------------
// HTTP errors
// ---------------------------------------------------------------------------

/// Structured API error returned to clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// Application-level error type that converts into an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Store(ref e) => tracing::error!(error = %e, "store error"),
            CoreError::Encode(ref e) => tracing::error!(error = %e, "encode error"),
            _ => {}
        }
        Self::new(err.status(), err.code(), err.public_message())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        CoreError::Store(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses_line_up() {
        let cases = [
            (CoreError::NotFound("match"), "NOT_FOUND", StatusCode::NOT_FOUND),
            (
                CoreError::ConversationNotFound,
                "CONVERSATION_NOT_FOUND",
                StatusCode::NOT_FOUND,
            ),
            (
                CoreError::InvalidTransition("accepted -> accepted".into()),
                "INVALID_TRANSITION",
                StatusCode::CONFLICT,
            ),
            (CoreError::DuplicateRequest, "DUPLICATE_REQUEST", StatusCode::CONFLICT),
            (
                CoreError::Unauthorized("not yours".into()),
                "UNAUTHORIZED",
                StatusCode::FORBIDDEN,
            ),
            (
                CoreError::Validation("empty".into()),
                "BAD_REQUEST",
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.status(), status);
        }
    }

    #[test]
    fn store_errors_hide_details() {
        let transient = CoreError::Store(StoreError::Unavailable("pool timeout".into()));
        assert_eq!(transient.code(), "UNAVAILABLE");
        assert_eq!(transient.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!transient.public_message().contains("pool"));

        let fatal = CoreError::Store(StoreError::Corrupt("bad status".into()));
        assert_eq!(fatal.code(), "INTERNAL_ERROR");
        assert_eq!(fatal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn encode_errors_are_internal() {
        let err: CoreError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("EOF"));
    }
}
