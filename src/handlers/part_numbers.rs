use axum::{extract::State, response::Json};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::quotes::{LinePreview, QuoteLineInput},
    ApiResponse, AppState,
};

/// Price a single line and show the part number it would get, without saving anything
#[utoipa::path(
    post,
    path = "/api/v1/part-numbers/preview",
    summary = "Preview a configured line",
    request_body = QuoteLineInput,
    responses(
        (status = 200, description = "Line preview", body = ApiResponse<LinePreview>),
        (status = 400, description = "Invalid configuration", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn preview_part_number(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(line): Json<QuoteLineInput>,
) -> Result<Json<ApiResponse<LinePreview>>, ServiceError> {
    let preview = state.services.quotes.preview_line(&auth_user, line).await?;
    Ok(Json(ApiResponse::success(preview)))
}
