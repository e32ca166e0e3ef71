use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Errors surfaced by the collaboration core.
///
/// Every variant carries a stable `kind()` so clients can branch on it without
/// parsing the human-readable message.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CollabError {
    #[error("Authentication error: {0}")]
    AuthenticationFailed(String),

    #[error("Access denied: {0}")]
    PermissionDenied(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Matrix must be square")]
    NotSquare,

    #[error("Matrix is singular and cannot be inverted")]
    SingularMatrix,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CollabError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::PermissionDenied(_) => "permission_denied",
            Self::DimensionMismatch(_) => "dimension_mismatch",
            Self::NotSquare => "not_square",
            Self::SingularMatrix => "singular_matrix",
            Self::UnsupportedOperation(_) => "unsupported_operation",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::DimensionMismatch(_)
            | Self::NotSquare
            | Self::SingularMatrix
            | Self::UnsupportedOperation(_)
            | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<rusqlite::Error> for CollabError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => CollabError::NotFound("Record".to_string()),
            other => CollabError::Internal(format!("Database error: {}", other)),
        }
    }
}

impl From<tokio::task::JoinError> for CollabError {
    fn from(err: tokio::task::JoinError) -> Self {
        CollabError::Internal(format!("Task join: {}", err))
    }
}

impl From<serde_json::Error> for CollabError {
    fn from(err: serde_json::Error) -> Self {
        CollabError::Internal(format!("Serialization error: {}", err))
    }
}

impl IntoResponse for CollabError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type CollabResult<T> = Result<T, CollabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(CollabError::NotSquare.kind(), "not_square");
        assert_eq!(CollabError::SingularMatrix.kind(), "singular_matrix");
        assert_eq!(
            CollabError::DimensionMismatch("2x2 vs 3x3".into()).kind(),
            "dimension_mismatch"
        );
        assert_eq!(
            CollabError::AuthenticationFailed("Invalid token".into()).to_string(),
            "Authentication error: Invalid token"
        );
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        let err: CollabError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn algebra_errors_are_client_errors() {
        assert_eq!(CollabError::NotSquare.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            CollabError::PermissionDenied("edit".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }
}
