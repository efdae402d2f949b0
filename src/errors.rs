use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::bom::BomError;
use crate::bom::part_number::PartNumberError;
use crate::workflow::WorkflowError;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "message": "Invalid operation: cannot approve a quote in state draft",
    "request_id": "req-abc123xyz",
    "timestamp": "2026-10-16T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<WorkflowError> for ServiceError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::UnknownStatus(status) => ServiceError::InvalidStatus(status),
            WorkflowError::NotAuthorized { .. } => ServiceError::Forbidden(err.to_string()),
            WorkflowError::InvalidTransition { .. } => {
                ServiceError::InvalidOperation(err.to_string())
            }
            WorkflowError::InvalidDiscount(_) | WorkflowError::MissingNotes(_) => {
                ServiceError::ValidationError(err.to_string())
            }
        }
    }
}

impl From<PartNumberError> for ServiceError {
    fn from(err: PartNumberError) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<BomError> for ServiceError {
    fn from(err: BomError) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Failures whose details stay in the logs
    fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_)
                | Self::InternalError(_)
                | Self::SerializationError(_)
                | Self::MigrationError(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidOperation(_) | Self::InvalidStatus(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) | Self::JwtError(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the error body
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            err if err.is_internal() => "Internal server error".to_string(),
            Self::ConcurrentModification(id) => {
                format!("Quote {} was modified by another request", id)
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: None,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use rstest::rstest;

    #[tokio::test]
    async fn service_error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("missing".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
    }

    #[rstest]
    #[case(ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND)]
    #[case(ServiceError::ValidationError("x".into()), StatusCode::BAD_REQUEST)]
    #[case(ServiceError::Forbidden("x".into()), StatusCode::FORBIDDEN)]
    #[case(ServiceError::JwtError("x".into()), StatusCode::UNAUTHORIZED)]
    #[case(ServiceError::ConcurrentModification(Uuid::nil()), StatusCode::CONFLICT)]
    #[case(ServiceError::MigrationError("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn status_codes(#[case] err: ServiceError, #[case] expected: StatusCode) {
        assert_eq!(err.status_code(), expected);
    }

    #[test]
    fn internal_errors_hide_details() {
        assert_eq!(
            ServiceError::InternalError("db password leaked".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::NotFound("Quote not found".into()).response_message(),
            "Not found: Quote not found"
        );
    }

    #[test]
    fn workflow_errors_map_to_http_categories() {
        let err: ServiceError = WorkflowError::UnknownStatus("bogus".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: ServiceError = WorkflowError::MissingNotes("reject").into();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}
