//! API Error Types
//!
//! Maps service errors to HTTP responses. Every error body uses the
//! response envelope with `success: false`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::service::ServiceError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Error from the index service
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    pub request_id: String,
    /// Records committed before the operation stopped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed: Option<u64>,
}

impl ApiError {
    /// Malformed or incomplete request
    pub fn invalid_query(message: impl Into<String>) -> Self {
        ApiError::Service(ServiceError::InvalidQuery(message.into()))
    }

    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Service(e) => {
                let status = match e {
                    ServiceError::IndexNotFound(_) => StatusCode::NOT_FOUND,
                    ServiceError::AlreadyExists { .. } => StatusCode::CONFLICT,
                    ServiceError::Encoding(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    ServiceError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
                    ServiceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    ServiceError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.code())
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }

    fn committed(&self) -> Option<u64> {
        match self {
            ApiError::Service(ServiceError::Io { committed, .. })
            | ApiError::Service(ServiceError::Timeout { committed, .. }) => *committed,
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "API error occurred"
            );
        } else {
            tracing::warn!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: code.to_string(),
            request_id,
            committed: self.committed(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid_query(rejection.body_text())
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::EncodingError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ServiceError::IndexNotFound("x".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                ServiceError::AlreadyExists {
                    network: "n".into(),
                    index_id: "i".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::Encoding(EncodingError::MissingField("f".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ServiceError::InvalidQuery("q".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::Timeout {
                    operation: "search".into(),
                    elapsed_ms: 5,
                    committed: None,
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                ServiceError::io("idx", "disk gone"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let (status, _) = ApiError::from(err).status_and_code();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn test_committed_reported() {
        let err = ApiError::from(ServiceError::Timeout {
            operation: "insert".into(),
            elapsed_ms: 10,
            committed: Some(3),
        });
        assert_eq!(err.committed(), Some(3));
        assert_eq!(ApiError::invalid_query("v").committed(), None);
    }

    #[test]
    fn test_invalid_query_code() {
        let (status, code) = ApiError::invalid_query("missing IndexID").status_and_code();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "INVALID_QUERY");
    }
}
