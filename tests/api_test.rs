mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn status_and_health_are_public() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["environment"], "test");

    let response = app.request(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["checks"]["database"], "healthy");
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/quotes", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, "/api/v1/quotes", None, Some("not-a-jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn request_id_is_echoed_or_generated() {
    let app = TestApp::new().await;

    let request = axum::http::Request::builder()
        .uri("/api/v1/status")
        .header("x-request-id", "trace-me-123")
        .body(axum::body::Body::empty())
        .expect("request");
    let response = tower::ServiceExt::oneshot(app_router(&app), request)
        .await
        .expect("response");
    assert_eq!(
        response.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
        Some("trace-me-123")
    );

    let response = app.request(Method::GET, "/api/v1/status", None, None).await;
    let generated = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(!generated.is_empty());
}

fn app_router(app: &TestApp) -> axum::Router {
    quote_workflow_api::build_router(app.state.clone())
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = response_json(response).await;
    assert!(doc["paths"]["/api/v1/quotes/{id}/finance-decision"].is_object());
    assert!(doc["components"]["securitySchemes"]["Bearer"].is_object());
}

#[tokio::test]
async fn margin_settings_are_readable_by_all_and_managed_by_admin() {
    let app = TestApp::new().await;

    let (status, current) = app
        .call(&app.sales, Method::GET, "/api/v1/settings/margin", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&current["data"]["threshold_percent"]), dec!(25));
    assert_eq!(current["data"]["remote_display_suffix"], "-RD");
    assert_eq!(current["data"]["empty_slot_code"], "X");

    let (status, _) = app
        .call(
            &app.sales,
            Method::PUT,
            "/api/v1/settings/margin",
            Some(json!({ "threshold_percent": "10" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            &app.admin,
            Method::PUT,
            "/api/v1/settings/margin",
            Some(json!({ "threshold_percent": "150" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, saved) = app
        .call(
            &app.admin,
            Method::PUT,
            "/api/v1/settings/margin",
            Some(json!({ "threshold_percent": "30.5", "empty_slot_code": "0" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", saved);
    assert_eq!(decimal(&saved["data"]["threshold_percent"]), dec!(30.5));
    assert_eq!(saved["data"]["empty_slot_code"], "0");
    assert_eq!(saved["data"]["updated_by"], json!(app.admin.id));

    let (_, reread) = app
        .call(&app.finance, Method::GET, "/api/v1/settings/margin", None)
        .await;
    assert_eq!(decimal(&reread["data"]["threshold_percent"]), dec!(30.5));
    assert_eq!(reread["data"]["remote_display_suffix"], "-RD");
}

#[tokio::test]
async fn profiles_are_created_on_first_visit_and_managed_by_admin() {
    let app = TestApp::new().await;

    let (status, me) = app
        .call(&app.sales, Method::GET, "/api/v1/profiles/me", None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", me);
    assert_eq!(me["data"]["id"], json!(app.sales.id));
    assert_eq!(me["data"]["role"], "sales");
    assert_eq!(me["data"]["email"], app.sales.email.as_str());

    // second visit returns the same row
    let (_, again) = app
        .call(&app.sales, Method::GET, "/api/v1/profiles/me", None)
        .await;
    assert_eq!(again["data"]["created_at"], me["data"]["created_at"]);

    let (status, _) = app
        .call(&app.sales, Method::GET, "/api/v1/profiles", None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, list) = app
        .call(&app.admin, Method::GET, "/api/v1/profiles", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["data"].as_array().map(Vec::len), Some(1));

    let (status, changed) = app
        .call(
            &app.admin,
            Method::PUT,
            &format!("/api/v1/profiles/{}/role", app.sales.id),
            Some(json!({ "role": "finance" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", changed);
    assert_eq!(changed["data"]["role"], "finance");

    let (status, _) = app
        .call(
            &app.admin,
            Method::PUT,
            &format!("/api/v1/profiles/{}/role", app.admin.id),
            Some(json!({ "role": "sales" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            &app.admin,
            Method::PUT,
            &format!("/api/v1/profiles/{}/role", uuid::Uuid::new_v4()),
            Some(json!({ "role": "sales" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
