//! Error types for the record store and the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the in-memory record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read data file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("data file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("data document must be a JSON object of collections")]
    NotAnObject,

    #[error("resource '{0}' not found")]
    UnknownResource(String),

    #[error("record '{id}' not found in '{resource}'")]
    RecordNotFound { resource: String, id: String },

    #[error("resource '{0}' does not support this operation")]
    UnsupportedOperation(String),

    #[error("record body must be a JSON object")]
    InvalidRecord,

    #[error("a record with id '{id}' already exists in '{resource}'")]
    DuplicateId { resource: String, id: String },
}

/// Errors returned to HTTP callers by the record router.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("the API is read-only")]
    ReadOnly,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Store(StoreError::UnknownResource(_))
            | ApiError::Store(StoreError::RecordNotFound { .. })
            | ApiError::Store(StoreError::UnsupportedOperation(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::InvalidRecord)
            | ApiError::Store(StoreError::DuplicateId { .. })
            | ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::ReadOnly => StatusCode::FORBIDDEN,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Missing records answer with an empty object, like conventional REST mocks
        let body = if status == StatusCode::NOT_FOUND {
            serde_json::json!({})
        } else {
            serde_json::json!({ "error": self.to_string() })
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "record router failure");
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = ApiError::from(StoreError::RecordNotFound {
            resource: "properties".to_string(),
            id: "9".to_string(),
        });
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(StoreError::InvalidRecord).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::ReadOnly.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(StoreError::NotAnObject).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_messages() {
        let err = StoreError::DuplicateId {
            resource: "bookings".to_string(),
            id: "1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "a record with id '1' already exists in 'bookings'"
        );
    }
}
