//! # HTTP Error Mapping
//!
//! Every handler returns `Result<_, ApiError>`. Validation and authorization
//! errors reach the client verbatim; store failures are logged here and
//! replaced with a generic message.

use super::types::ErrorResponse;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dealpipe_core::PipelineError;

/// A core error on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// HTTP status for the wrapped error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.0 {
            PipelineError::Unauthenticated => StatusCode::UNAUTHORIZED,
            PipelineError::Forbidden => StatusCode::FORBIDDEN,
            PipelineError::NotFound { .. } => StatusCode::NOT_FOUND,
            PipelineError::InvalidStage(_)
            | PipelineError::NoStagesConfigured
            | PipelineError::DuplicateName(_)
            | PipelineError::InvalidPermutation(_)
            | PipelineError::InvalidField { .. } => StatusCode::BAD_REQUEST,
            PipelineError::ConcurrentModification { .. } => StatusCode::CONFLICT,
            PipelineError::StoreFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            PipelineError::StoreFailure(detail) => {
                tracing::error!(
                    event = "store_failure",
                    detail = %detail,
                    "Record store failure"
                );
                "Internal storage error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: self.0.kind().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dealpipe_core::StageId;

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (PipelineError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (PipelineError::Forbidden, StatusCode::FORBIDDEN),
            (PipelineError::InvalidStage(StageId(3)), StatusCode::BAD_REQUEST),
            (PipelineError::NoStagesConfigured, StatusCode::BAD_REQUEST),
            (
                PipelineError::ConcurrentModification {
                    expected: 1,
                    actual: 2,
                },
                StatusCode::CONFLICT,
            ),
            (
                PipelineError::StoreFailure("disk".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn store_failure_is_internal_error() {
        let response = ApiError(PipelineError::StoreFailure("redb: page 7 corrupt".to_string()))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
