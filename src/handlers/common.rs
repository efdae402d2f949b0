use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{errors::ServiceError, PaginatedResponse};

/// Optimistic-lock guard accepted by the workflow endpoints
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, ToSchema)]
pub struct VersionGuard {
    /// Version the caller last saw; stale versions are rejected with 409
    pub expected_version: Option<i32>,
}

impl VersionGuard {
    /// An empty body carries no guard; anything else must be a valid guard
    pub fn from_body(body: &[u8]) -> Result<Self, ServiceError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| ServiceError::ValidationError(format!("invalid request body: {}", e)))
    }
}

/// Extracts an optional [`VersionGuard`] body, rejecting malformed JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardBody(pub Option<i32>);

#[async_trait]
impl<S> FromRequest<S> for GuardBody
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| ServiceError::ValidationError(e.body_text()))?;
        VersionGuard::from_body(&body).map(|guard| GuardBody(guard.expected_version))
    }
}

pub fn total_pages(total: u64, limit: u64) -> u64 {
    if total == 0 || limit == 0 {
        0
    } else {
        (total + limit - 1) / limit
    }
}

pub fn paginated<T>(items: Vec<T>, total: u64, page: u64, limit: u64) -> PaginatedResponse<T> {
    PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages: total_pages(total, limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_guard_body_parsing() {
        assert_eq!(VersionGuard::from_body(b"").unwrap().expected_version, None);
        assert_eq!(VersionGuard::from_body(b"  \n").unwrap().expected_version, None);
        assert_eq!(VersionGuard::from_body(b"{}").unwrap().expected_version, None);
        assert_eq!(
            VersionGuard::from_body(br#"{"expected_version":7}"#)
                .unwrap()
                .expected_version,
            Some(7)
        );
        assert!(matches!(
            VersionGuard::from_body(br#"{"expected_version":"7"}"#),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(VersionGuard::from_body(b"not json").is_err());
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
    }
}
