use axum::{response::Json, routing::get, Router};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Quote Workflow API",
        version = "0.1.0",
        description = r#"
# Quote Workflow API

Quoting backend for transformer-monitoring hardware.

- **Catalog**: four-level product hierarchy (asset family, chassis, card, option set)
- **BOM**: chassis slot layout and part-number assembly
- **Workflow**: sales, admin and finance review with a margin gate

## Authentication

Every endpoint except `/status` and `/health` needs a bearer token:

```
Authorization: Bearer <jwt>
```

## Concurrency

Workflow actions accept `expected_version`. A stale version is rejected with `409 Conflict`.
        "#,
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Quotes", description = "Quote lifecycle"),
        (name = "Products", description = "Product catalog"),
        (name = "Settings", description = "Margin and part-number settings"),
        (name = "Profiles", description = "Users and roles")
    ),
    paths(
        crate::handlers::quotes::list_quotes,
        crate::handlers::quotes::create_quote,
        crate::handlers::quotes::get_quote,
        crate::handlers::quotes::update_quote,
        crate::handlers::quotes::delete_quote,
        crate::handlers::quotes::submit_quote,
        crate::handlers::quotes::start_review,
        crate::handlers::quotes::admin_decision,
        crate::handlers::quotes::finance_decision,
        crate::handlers::quotes::close_quote,
        crate::handlers::part_numbers::preview_part_number,

        crate::handlers::products::list_products,
        crate::handlers::products::create_product,
        crate::handlers::products::get_product,
        crate::handlers::products::list_children,
        crate::handlers::products::set_enabled,
        crate::handlers::products::product_tree,

        crate::handlers::settings::get_margin_settings,
        crate::handlers::settings::update_margin_settings,

        crate::handlers::profiles::me,
        crate::handlers::profiles::list_profiles,
        crate::handlers::profiles::set_role,
    ),
    components(
        schemas(
            crate::handlers::quotes::QuoteResponse,
            crate::handlers::quotes::BomItemResponse,
            crate::handlers::common::VersionGuard,
            crate::services::quotes::CreateQuoteInput,
            crate::services::quotes::UpdateQuoteInput,
            crate::services::quotes::QuoteLineInput,
            crate::services::quotes::CardInput,
            crate::services::quotes::DecisionRequest,
            crate::services::quotes::LinePreview,
            crate::services::quotes::PreviewComponent,
            crate::workflow::WorkflowState,
            crate::workflow::QuoteAction,
            crate::workflow::QuoteFinancials,
            crate::workflow::Decision,

            crate::handlers::products::ProductResponse,
            crate::handlers::products::ProductTreeNode,
            crate::handlers::products::SetEnabledRequest,
            crate::services::catalog::CreateProductInput,

            crate::handlers::settings::MarginSettingsResponse,
            crate::services::settings::UpdateMarginSettings,

            crate::handlers::profiles::ProfileResponse,
            crate::services::profiles::UpdateRoleInput,
            crate::auth::Role,

            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

/// Registers the `Bearer` scheme the handlers reference in `security(...)`
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}

/// Serves the generated document at `/api-docs/openapi.json`
pub fn docs_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/api-docs/openapi.json", get(openapi_json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_workflow_paths_and_bearer_scheme() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Quote Workflow API"));
        assert!(json.contains("/api/v1/quotes/{id}/finance-decision"));
        assert!(json.contains("/api/v1/part-numbers/preview"));
        assert!(json.contains("\"Bearer\""));
    }
}
