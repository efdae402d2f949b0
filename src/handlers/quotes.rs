use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::{paginated, GuardBody, VersionGuard};
use crate::{
    auth::AuthUser,
    entities::{bom_item, quote},
    errors::ServiceError,
    services::quotes::{
        actions_for, CreateQuoteInput, DecisionRequest, QuoteDetails, UpdateQuoteInput,
    },
    workflow::{QuoteAction, QuoteFinancials, WorkflowState},
    ApiResponse, AppState, PaginatedResponse,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BomItemResponse {
    pub id: Uuid,
    /// Chassis line this card is seated in
    pub parent_item_id: Option<Uuid>,
    pub product_id: Uuid,
    pub name: String,
    pub part_number: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub unit_cost: Decimal,
    pub total_price: Decimal,
    pub slot_number: Option<i32>,
    pub slot_span: Option<i32>,
    #[schema(value_type = Option<Object>)]
    pub configuration: Option<serde_json::Value>,
}

impl From<bom_item::Model> for BomItemResponse {
    fn from(item: bom_item::Model) -> Self {
        Self {
            id: item.id,
            parent_item_id: item.parent_item_id,
            product_id: item.product_id,
            name: item.name,
            part_number: item.part_number,
            quantity: item.quantity,
            unit_price: item.unit_price,
            unit_cost: item.unit_cost,
            total_price: item.total_price,
            slot_number: item.slot_number,
            slot_span: item.slot_span,
            configuration: item.configuration,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QuoteResponse {
    pub id: Uuid,
    pub quote_number: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub oracle_customer_id: Option<String>,
    pub sfdc_opportunity: Option<String>,
    /// Legacy status string
    pub status: String,
    pub workflow_state: WorkflowState,
    pub requires_finance_approval: bool,
    pub financials: QuoteFinancials,
    pub discount_justification: Option<String>,
    pub currency: String,
    pub shipping_terms: Option<String>,
    pub payment_terms: Option<String>,
    pub created_by: Uuid,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub finance_reviewed_by: Option<Uuid>,
    pub finance_reviewed_at: Option<DateTime<Utc>>,
    pub finance_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<BomItemResponse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_actions: Vec<QuoteAction>,
}

impl TryFrom<quote::Model> for QuoteResponse {
    type Error = ServiceError;

    fn try_from(quote: quote::Model) -> Result<Self, Self::Error> {
        let workflow_state = quote.derived_state()?;
        let financials = quote.financials();
        Ok(Self {
            id: quote.id,
            quote_number: quote.quote_number,
            customer_name: quote.customer_name,
            customer_email: quote.customer_email,
            oracle_customer_id: quote.oracle_customer_id,
            sfdc_opportunity: quote.sfdc_opportunity,
            status: quote.status,
            workflow_state,
            requires_finance_approval: quote.requires_finance_approval,
            financials,
            discount_justification: quote.discount_justification,
            currency: quote.currency,
            shipping_terms: quote.shipping_terms,
            payment_terms: quote.payment_terms,
            created_by: quote.created_by,
            submitted_at: quote.submitted_at,
            reviewed_by: quote.reviewed_by,
            reviewed_at: quote.reviewed_at,
            review_notes: quote.review_notes,
            finance_reviewed_by: quote.finance_reviewed_by,
            finance_reviewed_at: quote.finance_reviewed_at,
            finance_notes: quote.finance_notes,
            created_at: quote.created_at,
            updated_at: quote.updated_at,
            version: quote.version,
            items: Vec::new(),
            allowed_actions: Vec::new(),
        })
    }
}

impl TryFrom<QuoteDetails> for QuoteResponse {
    type Error = ServiceError;

    fn try_from(details: QuoteDetails) -> Result<Self, Self::Error> {
        let mut response = QuoteResponse::try_from(details.quote)?;
        response.items = details.items.into_iter().map(Into::into).collect();
        response.allowed_actions = details.allowed_actions;
        Ok(response)
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct QuoteListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Only quotes currently in this workflow state
    pub state: Option<WorkflowState>,
}

/// Response for `quote` with the actions open to `actor`
fn with_actions(actor: &AuthUser, quote: quote::Model) -> Result<QuoteResponse, ServiceError> {
    let allowed_actions = actions_for(actor, &quote)?;
    let mut response = QuoteResponse::try_from(quote)?;
    response.allowed_actions = allowed_actions;
    Ok(response)
}

/// List quotes
#[utoipa::path(
    get,
    path = "/api/v1/quotes",
    summary = "List quotes",
    description = "Paginated quotes, newest first. Sales users only see their own quotes.",
    params(QuoteListQuery),
    responses(
        (status = 200, description = "Quotes retrieved", body = ApiResponse<PaginatedResponse<QuoteResponse>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_quotes(
    State(state): State<AppState>,
    Query(query): Query<QuoteListQuery>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<PaginatedResponse<QuoteResponse>>>, ServiceError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = state.config.page_size(query.limit);
    let (quotes, total) = state
        .services
        .quotes
        .list_quotes(&auth_user, query.state, page, limit)
        .await?;
    let items = quotes
        .into_iter()
        .map(|quote| with_actions(&auth_user, quote))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(ApiResponse::success(paginated(items, total, page, limit))))
}

/// Create a draft quote
#[utoipa::path(
    post,
    path = "/api/v1/quotes",
    summary = "Create quote",
    description = "Creates a draft quote. Chassis lines get their part numbers assembled and every line is priced from the catalog.",
    request_body = CreateQuoteInput,
    responses(
        (status = 201, description = "Quote created", body = ApiResponse<QuoteResponse>),
        (status = 400, description = "Invalid lines or discount", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_quote(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateQuoteInput>,
) -> Result<(StatusCode, Json<ApiResponse<QuoteResponse>>), ServiceError> {
    let svc = state.services.quotes.clone();
    let created = svc.create_quote(&auth_user, request).await?;
    let details = svc.get_quote(&auth_user, created.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(QuoteResponse::try_from(details)?)),
    ))
}

/// Get a quote with its line items
#[utoipa::path(
    get,
    path = "/api/v1/quotes/{id}",
    summary = "Get quote",
    params(("id" = Uuid, Path, description = "Quote ID")),
    responses(
        (status = 200, description = "Quote retrieved", body = ApiResponse<QuoteResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Quote not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<QuoteResponse>>, ServiceError> {
    let details = state.services.quotes.get_quote(&auth_user, id).await?;
    Ok(Json(ApiResponse::success(QuoteResponse::try_from(details)?)))
}

/// Update an editable quote
#[utoipa::path(
    put,
    path = "/api/v1/quotes/{id}",
    summary = "Update quote",
    description = "Edits customer fields, discount or line items of a draft or revision-requested quote.",
    params(("id" = Uuid, Path, description = "Quote ID")),
    request_body = UpdateQuoteInput,
    responses(
        (status = 200, description = "Quote updated", body = ApiResponse<QuoteResponse>),
        (status = 400, description = "Quote not editable or invalid input", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Quote not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stale version", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<UpdateQuoteInput>,
) -> Result<Json<ApiResponse<QuoteResponse>>, ServiceError> {
    let svc = state.services.quotes.clone();
    svc.update_quote(&auth_user, id, request).await?;
    let details = svc.get_quote(&auth_user, id).await?;
    Ok(Json(ApiResponse::success(QuoteResponse::try_from(details)?)))
}

/// Delete a draft quote
#[utoipa::path(
    delete,
    path = "/api/v1/quotes/{id}",
    summary = "Delete draft quote",
    params(("id" = Uuid, Path, description = "Quote ID")),
    responses(
        (status = 204, description = "Quote deleted"),
        (status = 400, description = "Quote is not a draft", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Quote not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn delete_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    state.services.quotes.delete_quote(&auth_user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Submit a quote for review
#[utoipa::path(
    post,
    path = "/api/v1/quotes/{id}/submit",
    summary = "Submit quote",
    description = "Moves a draft or revision-requested quote to submitted, re-running the margin gate.",
    params(("id" = Uuid, Path, description = "Quote ID")),
    request_body(content = VersionGuard, description = "Optional version guard"),
    responses(
        (status = 200, description = "Quote submitted", body = ApiResponse<QuoteResponse>),
        (status = 400, description = "Invalid transition or empty quote", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stale version", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn submit_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    GuardBody(expected_version): GuardBody,
) -> Result<Json<ApiResponse<QuoteResponse>>, ServiceError> {
    let quote = state
        .services
        .quotes
        .submit_quote(&auth_user, id, expected_version)
        .await?;
    Ok(Json(ApiResponse::success(with_actions(&auth_user, quote)?)))
}

/// Admin picks up a submitted quote
#[utoipa::path(
    post,
    path = "/api/v1/quotes/{id}/start-review",
    summary = "Start admin review",
    params(("id" = Uuid, Path, description = "Quote ID")),
    request_body(content = VersionGuard, description = "Optional version guard"),
    responses(
        (status = 200, description = "Review started", body = ApiResponse<QuoteResponse>),
        (status = 400, description = "Invalid transition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stale version", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn start_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    GuardBody(expected_version): GuardBody,
) -> Result<Json<ApiResponse<QuoteResponse>>, ServiceError> {
    let quote = state
        .services
        .quotes
        .start_review(&auth_user, id, expected_version)
        .await?;
    Ok(Json(ApiResponse::success(with_actions(&auth_user, quote)?)))
}

/// Admin-stage decision
#[utoipa::path(
    post,
    path = "/api/v1/quotes/{id}/admin-decision",
    summary = "Admin decision",
    description = "Approve, reject or request revision. Approvals whose discounted margin is below the threshold are routed to finance unless a finance user decides.",
    params(("id" = Uuid, Path, description = "Quote ID")),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Decision applied", body = ApiResponse<QuoteResponse>),
        (status = 400, description = "Invalid transition, discount or missing notes", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stale version", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn admin_decision(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<ApiResponse<QuoteResponse>>, ServiceError> {
    let quote = state
        .services
        .quotes
        .admin_decision(&auth_user, id, request)
        .await?;
    Ok(Json(ApiResponse::success(with_actions(&auth_user, quote)?)))
}

/// Finance-stage decision
#[utoipa::path(
    post,
    path = "/api/v1/quotes/{id}/finance-decision",
    summary = "Finance decision",
    params(("id" = Uuid, Path, description = "Quote ID")),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Decision applied", body = ApiResponse<QuoteResponse>),
        (status = 400, description = "Quote is not awaiting finance", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stale version", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn finance_decision(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<ApiResponse<QuoteResponse>>, ServiceError> {
    let quote = state
        .services
        .quotes
        .finance_decision(&auth_user, id, request)
        .await?;
    Ok(Json(ApiResponse::success(with_actions(&auth_user, quote)?)))
}

/// Close an approved or rejected quote
#[utoipa::path(
    post,
    path = "/api/v1/quotes/{id}/close",
    summary = "Close quote",
    params(("id" = Uuid, Path, description = "Quote ID")),
    request_body(content = VersionGuard, description = "Optional version guard"),
    responses(
        (status = 200, description = "Quote closed", body = ApiResponse<QuoteResponse>),
        (status = 400, description = "Invalid transition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn close_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    GuardBody(expected_version): GuardBody,
) -> Result<Json<ApiResponse<QuoteResponse>>, ServiceError> {
    let quote = state
        .services
        .quotes
        .close_quote(&auth_user, id, expected_version)
        .await?;
    Ok(Json(ApiResponse::success(with_actions(&auth_user, quote)?)))
}
