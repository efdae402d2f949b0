use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser, entities::profile, errors::ServiceError, services::profiles::UpdateRoleInput,
    ApiResponse, AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<profile::Model> for ProfileResponse {
    fn from(p: profile::Model) -> Self {
        Self {
            id: p.id,
            email: p.email,
            full_name: p.full_name,
            role: p.role,
            active: p.active,
            created_at: p.created_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/profiles/me",
    summary = "Current user's profile",
    description = "Returns the caller's profile, creating it from the token on first use.",
    responses(
        (status = 200, description = "Profile", body = ApiResponse<ProfileResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<ProfileResponse>>, ServiceError> {
    let profile = state.services.profiles.me(&auth_user).await?;
    Ok(Json(ApiResponse::success(profile.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/profiles",
    summary = "List profiles",
    responses(
        (status = 200, description = "All profiles", body = ApiResponse<Vec<ProfileResponse>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_profiles(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<ProfileResponse>>>, ServiceError> {
    let profiles = state.services.profiles.list_profiles(&auth_user).await?;
    Ok(Json(ApiResponse::success(
        profiles.into_iter().map(Into::into).collect(),
    )))
}

#[utoipa::path(
    put,
    path = "/api/v1/profiles/{id}/role",
    summary = "Change a user's role",
    params(("id" = Uuid, Path, description = "Profile ID")),
    request_body = UpdateRoleInput,
    responses(
        (status = 200, description = "Role changed", body = ApiResponse<ProfileResponse>),
        (status = 400, description = "Cannot change own role", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Profile not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn set_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<UpdateRoleInput>,
) -> Result<Json<ApiResponse<ProfileResponse>>, ServiceError> {
    let profile = state
        .services
        .profiles
        .set_role(&auth_user, id, request.role)
        .await?;
    Ok(Json(ApiResponse::success(profile.into())))
}
