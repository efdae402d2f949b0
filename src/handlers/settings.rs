use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser, entities::margin_settings, errors::ServiceError,
    services::settings::UpdateMarginSettings, ApiResponse, AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MarginSettingsResponse {
    pub threshold_percent: Decimal,
    pub remote_display_suffix: String,
    pub empty_slot_code: String,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl From<margin_settings::Model> for MarginSettingsResponse {
    fn from(m: margin_settings::Model) -> Self {
        Self {
            threshold_percent: m.threshold_percent,
            remote_display_suffix: m.remote_display_suffix,
            empty_slot_code: m.empty_slot_code,
            updated_by: m.updated_by,
            updated_at: m.updated_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/settings/margin",
    summary = "Get margin settings",
    responses(
        (status = 200, description = "Current settings", body = ApiResponse<MarginSettingsResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_margin_settings(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<MarginSettingsResponse>>, ServiceError> {
    let settings = state
        .services
        .settings
        .get_margin_settings(&auth_user)
        .await?;
    Ok(Json(ApiResponse::success(settings.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/settings/margin",
    summary = "Update margin settings",
    description = "Changes apply to the next submission or decision; existing quote flags are left alone.",
    request_body = UpdateMarginSettings,
    responses(
        (status = 200, description = "Settings saved", body = ApiResponse<MarginSettingsResponse>),
        (status = 400, description = "Threshold out of range", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_margin_settings(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<UpdateMarginSettings>,
) -> Result<Json<ApiResponse<MarginSettingsResponse>>, ServiceError> {
    let settings = state
        .services
        .settings
        .update_margin_settings(&auth_user, request)
        .await?;
    Ok(Json(ApiResponse::success(settings.into())))
}
