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

use crate::{
    auth::AuthUser,
    entities::product,
    errors::ServiceError,
    services::catalog::{CreateProductInput, ProductFilter, ProductNode},
    ApiResponse, AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    /// 1 asset family, 2 chassis, 3 card, 4 option set
    pub level: i32,
    pub name: String,
    pub description: Option<String>,
    pub part_number_code: Option<String>,
    pub slot_count: Option<i32>,
    pub slot_span: Option<i32>,
    pub input_count: Option<i32>,
    pub bushing_count: Option<i32>,
    pub price: Decimal,
    pub cost: Decimal,
    pub enabled: bool,
    /// False when this product or any ancestor is disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_enabled: Option<bool>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<product::Model> for ProductResponse {
    fn from(p: product::Model) -> Self {
        Self {
            id: p.id,
            parent_id: p.parent_id,
            level: p.level,
            name: p.name,
            description: p.description,
            part_number_code: p.part_number_code,
            slot_count: p.slot_count,
            slot_span: p.slot_span,
            input_count: p.input_count,
            bushing_count: p.bushing_count,
            price: p.price,
            cost: p.cost,
            enabled: p.enabled,
            effective_enabled: None,
            sort_order: p.sort_order,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductTreeNode {
    pub product: ProductResponse,
    #[schema(no_recursion)]
    pub children: Vec<ProductTreeNode>,
}

impl From<ProductNode> for ProductTreeNode {
    fn from(node: ProductNode) -> Self {
        let mut product = ProductResponse::from(node.product);
        product.effective_enabled = Some(node.effective_enabled);
        Self {
            product,
            children: node.children.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TreeQuery {
    /// Include disabled branches (flagged through `effective_enabled`)
    #[serde(default)]
    pub include_disabled: bool,
}

#[utoipa::path(
    get,
    path = "/api/v1/products",
    summary = "List products",
    params(ProductFilter),
    responses(
        (status = 200, description = "Products", body = ApiResponse<Vec<ProductResponse>>),
        (status = 400, description = "Invalid level", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<ProductResponse>>>, ServiceError> {
    let products = state
        .services
        .catalog
        .list_products(&auth_user, filter)
        .await?;
    Ok(Json(ApiResponse::success(
        products.into_iter().map(Into::into).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/products",
    summary = "Create product",
    description = "Adds a product under a parent exactly one level up. Asset families have no parent.",
    request_body = CreateProductInput,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid hierarchy or fields", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Parent not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_product(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateProductInput>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    let product = state
        .services
        .catalog
        .create_product(&auth_user, request)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(product.into())),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    summary = "Get product",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product", body = ApiResponse<ProductResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    let (product, effective) = state.services.catalog.get_product(&auth_user, id).await?;
    let mut response = ProductResponse::from(product);
    response.effective_enabled = Some(effective);
    Ok(Json(ApiResponse::success(response)))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/children",
    summary = "List child products",
    params(("id" = Uuid, Path, description = "Parent product ID")),
    responses(
        (status = 200, description = "Direct children", body = ApiResponse<Vec<ProductResponse>>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_children(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<ProductResponse>>>, ServiceError> {
    let children = state.services.catalog.list_children(&auth_user, id).await?;
    Ok(Json(ApiResponse::success(
        children.into_iter().map(Into::into).collect(),
    )))
}

#[utoipa::path(
    put,
    path = "/api/v1/products/{id}/enabled",
    summary = "Enable or disable a product",
    description = "Disabling a product also makes its whole subtree unusable on new quotes.",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = SetEnabledRequest,
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<ProductResponse>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn set_enabled(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<SetEnabledRequest>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    let product = state
        .services
        .catalog
        .set_enabled(&auth_user, id, request.enabled)
        .await?;
    Ok(Json(ApiResponse::success(product.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/tree",
    summary = "Product hierarchy",
    params(TreeQuery),
    responses(
        (status = 200, description = "Nested hierarchy", body = ApiResponse<Vec<ProductTreeNode>>),
    ),
    security(("Bearer" = []))
)]
pub async fn product_tree(
    State(state): State<AppState>,
    Query(query): Query<TreeQuery>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<ProductTreeNode>>>, ServiceError> {
    let tree = state
        .services
        .catalog
        .tree(&auth_user, query.include_disabled)
        .await?;
    Ok(Json(ApiResponse::success(
        tree.into_iter().map(Into::into).collect(),
    )))
}
