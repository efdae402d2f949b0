//! Quote Workflow API
//!
//! Quoting backend for transformer-monitoring hardware: a four-level product
//! catalog, chassis slot layout with part-number assembly, and the sales,
//! admin and finance review workflow gated on discounted margin.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod bom;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;
pub mod workflow;

use axum::{
    extract::{FromRef, State},
    http::HeaderValue,
    response::Json,
    routing::{get, post, put},
    Extension, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use utoipa::ToSchema;

use crate::auth::consts as perm;
use crate::auth::{AuthRouterExt, AuthService};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Wires services and auth from an open connection and event channel
    pub fn new(
        db: Arc<db::DbPool>,
        config: config::AppConfig,
        event_sender: Arc<events::EventSender>,
    ) -> Self {
        let services = handlers::AppServices::new(db.clone(), event_sender.clone(), &config);
        let auth = Arc::new(AuthService::new(auth::AuthConfig::from_app_config(&config)));
        Self {
            db,
            config,
            event_sender,
            services,
            auth,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

// Common response wrappers
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!response.success);
    }

    #[test]
    fn meta_without_request_scope_has_no_id() {
        let response = ApiResponse::success(1);
        assert!(response.meta.expect("metadata expected").request_id.is_none());
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{part_numbers, products, profiles, quotes, settings};

    // Reads are scoped per quote inside the service (own vs all)
    let quotes_read = Router::new()
        .route("/quotes", get(quotes::list_quotes))
        .route("/quotes/:id", get(quotes::get_quote))
        .with_auth();

    let quotes_write = Router::new()
        .route("/quotes", post(quotes::create_quote))
        .route(
            "/quotes/:id",
            put(quotes::update_quote).delete(quotes::delete_quote),
        )
        .route("/quotes/:id/submit", post(quotes::submit_quote))
        .route("/quotes/:id/close", post(quotes::close_quote))
        .with_permission(perm::QUOTES_CREATE);

    let quotes_review = Router::new()
        .route("/quotes/:id/start-review", post(quotes::start_review))
        .route("/quotes/:id/admin-decision", post(quotes::admin_decision))
        .with_permission(perm::QUOTES_REVIEW);

    let quotes_finance = Router::new()
        .route(
            "/quotes/:id/finance-decision",
            post(quotes::finance_decision),
        )
        .with_permission(perm::QUOTES_FINANCE);

    let products_read = Router::new()
        .route("/products", get(products::list_products))
        .route("/products/tree", get(products::product_tree))
        .route("/products/:id", get(products::get_product))
        .route("/products/:id/children", get(products::list_children))
        .route(
            "/part-numbers/preview",
            post(part_numbers::preview_part_number),
        )
        .with_permission(perm::PRODUCTS_READ);

    let products_manage = Router::new()
        .route("/products", post(products::create_product))
        .route("/products/:id/enabled", put(products::set_enabled))
        .with_permission(perm::PRODUCTS_MANAGE);

    let settings_read = Router::new()
        .route("/settings/margin", get(settings::get_margin_settings))
        .with_permission(perm::SETTINGS_READ);

    let settings_manage = Router::new()
        .route("/settings/margin", put(settings::update_margin_settings))
        .with_permission(perm::SETTINGS_MANAGE);

    let profiles_self = Router::new()
        .route("/profiles/me", get(profiles::me))
        .with_auth();

    let profiles_manage = Router::new()
        .route("/profiles", get(profiles::list_profiles))
        .route("/profiles/:id/role", put(profiles::set_role))
        .with_permission(perm::PROFILES_MANAGE);

    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(quotes_read)
        .merge(quotes_write)
        .merge(quotes_review)
        .merge(quotes_finance)
        .merge(products_read)
        .merge(products_manage)
        .merge(settings_read)
        .merge(settings_manage)
        .merge(profiles_self)
        .merge(profiles_manage)
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            environment = %cfg.environment,
            "Using permissive CORS because explicit origins were not configured"
        );
        CorsLayer::permissive()
    } else {
        // config validation rejects this outside development; same-origin only
        CorsLayer::new()
    }
}

/// Full application router: `/api/v1`, the OpenAPI document and the
/// request-id, auth, tracing, CORS and timeout layers.
pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs.max(1));
    let cors = cors_layer(&state.config);
    let auth = state.auth.clone();

    Router::<AppState>::new()
        .route("/", get(|| async { "quote-workflow-api up" }))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::docs_routes())
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(crate::tracing::configure_http_tracing())
        // AuthService for the route-level auth layers
        .layer(Extension(auth))
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "quote-workflow-api",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.environment,
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(e) => {
            ::tracing::warn!(error = %e, "database health check failed");
            "unhealthy"
        }
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
