//! Product hierarchy endpoints and part-number preview.

mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn admin_builds_hierarchy_and_sales_cannot() {
    let app = TestApp::new().await;

    let (status, family) = app
        .call(
            &app.admin,
            Method::POST,
            "/api/v1/products",
            Some(json!({ "level": 1, "name": "Transformer monitoring" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", family);
    let family_id = family["data"]["id"].clone();

    let (status, chassis) = app
        .call(
            &app.admin,
            Method::POST,
            "/api/v1/products",
            Some(json!({
                "parent_id": family_id,
                "level": 2,
                "name": "QTMS 8-slot",
                "part_number_code": "QTMS-",
                "slot_count": 8,
                "price": "1800.00",
                "cost": "700.00"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", chassis);
    assert_eq!(chassis["data"]["slot_count"], 8);
    assert_eq!(decimal(&chassis["data"]["price"]), dec!(1800));

    let (status, _) = app
        .call(
            &app.sales,
            Method::POST,
            "/api/v1/products",
            Some(json!({ "level": 1, "name": "Unauthorized family" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn hierarchy_rules_are_enforced() {
    let app = TestApp::new().await;
    let catalog = app.seed_catalog().await;

    // cards hang off a chassis, not a family
    let (status, _) = app
        .call(
            &app.admin,
            Method::POST,
            "/api/v1/products",
            Some(json!({
                "parent_id": catalog.family.id,
                "level": 3,
                "name": "Misplaced card",
                "part_number_code": "M"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // slot_count belongs to chassis only
    let (status, _) = app
        .call(
            &app.admin,
            Method::POST,
            "/api/v1/products",
            Some(json!({
                "parent_id": catalog.chassis.id,
                "level": 3,
                "name": "Odd card",
                "part_number_code": "O",
                "slot_count": 2
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            &app.admin,
            Method::POST,
            "/api/v1/products",
            Some(json!({
                "parent_id": catalog.chassis.id,
                "level": 3,
                "name": "Bad template",
                "part_number_code": "T{voltage}"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            &app.admin,
            Method::POST,
            "/api/v1/products",
            Some(json!({
                "parent_id": uuid::Uuid::new_v4(),
                "level": 2,
                "name": "Orphan",
                "part_number_code": "ORP-",
                "slot_count": 2
            })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tree_and_children_reflect_enablement() {
    let app = TestApp::new().await;
    let catalog = app.seed_catalog().await;

    let (status, children) = app
        .call(
            &app.sales,
            Method::GET,
            &format!("/api/v1/products/{}/children", catalog.chassis.id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = children["data"]
        .as_array()
        .expect("children")
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Analog card", "Bushing monitor"]);

    let (status, _) = app
        .call(
            &app.admin,
            Method::PUT,
            &format!("/api/v1/products/{}/enabled", catalog.analog.id),
            Some(json!({ "enabled": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // options under a disabled card are unusable even though they are enabled
    let (_, option) = app
        .call(
            &app.sales,
            Method::GET,
            &format!("/api/v1/products/{}", catalog.inputs_4.id),
            None,
        )
        .await;
    assert_eq!(option["data"]["enabled"], true);
    assert_eq!(option["data"]["effective_enabled"], false);

    let (_, tree) = app
        .call(&app.sales, Method::GET, "/api/v1/products/tree", None)
        .await;
    let chassis = &tree["data"][0]["children"][0];
    assert_eq!(chassis["product"]["name"], "QTMS 4-slot");
    assert_eq!(chassis["children"].as_array().map(Vec::len), Some(1));

    let (_, full) = app
        .call(
            &app.sales,
            Method::GET,
            "/api/v1/products/tree?include_disabled=true",
            None,
        )
        .await;
    let cards = full["data"][0]["children"][0]["children"]
        .as_array()
        .expect("cards");
    assert_eq!(cards.len(), 2);
    assert_eq!(cards[0]["product"]["effective_enabled"], false);

    let (_, enabled) = app
        .call(
            &app.sales,
            Method::GET,
            "/api/v1/products?level=4&enabled_only=true",
            None,
        )
        .await;
    assert_eq!(enabled["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn disabled_products_cannot_be_quoted() {
    let app = TestApp::new().await;
    let catalog = app.seed_catalog().await;

    app.call(
        &app.admin,
        Method::PUT,
        &format!("/api/v1/products/{}/enabled", catalog.chassis.id),
        Some(json!({ "enabled": false })),
    )
    .await;

    let (status, body) = app
        .call(
            &app.sales,
            Method::POST,
            "/api/v1/quotes",
            Some(json!({
                "customer_name": "Late order",
                "lines": [{ "product_id": catalog.wide.id, "option_ids": [catalog.bushings_3.id] }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap_or_default().contains("disabled"));
}

#[tokio::test]
async fn preview_assembles_part_number_without_saving() {
    let app = TestApp::new().await;
    let catalog = app.seed_catalog().await;

    let (status, preview) = app
        .call(
            &app.sales,
            Method::POST,
            "/api/v1/part-numbers/preview",
            Some(json!({
                "product_id": catalog.chassis.id,
                "remote_display": true,
                "cards": [
                    { "product_id": catalog.wide.id, "slot": 3, "option_ids": [catalog.bushings_3.id] },
                    { "product_id": catalog.analog.id, "slot": 1, "option_ids": [catalog.inputs_4.id] }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", preview);
    assert_eq!(preview["data"]["part_number"], "QTMS-A4XB3-RD");
    assert_eq!(decimal(&preview["data"]["unit_price"]), dec!(1750));
    let slots: Vec<u64> = preview["data"]["components"]
        .as_array()
        .expect("components")
        .iter()
        .filter_map(|c| c["slot"].as_u64())
        .collect();
    assert_eq!(slots, vec![1, 3]);

    let (_, list) = app.call(&app.admin, Method::GET, "/api/v1/quotes", None).await;
    assert_eq!(list["data"]["total"], 0);
}

#[tokio::test]
async fn overlapping_cards_are_rejected() {
    let app = TestApp::new().await;
    let catalog = app.seed_catalog().await;

    // the bushing card spans slots 2-3, colliding with the card in slot 3
    let (status, body) = app
        .call(
            &app.sales,
            Method::POST,
            "/api/v1/part-numbers/preview",
            Some(json!({
                "product_id": catalog.chassis.id,
                "cards": [
                    { "product_id": catalog.wide.id, "slot": 2 },
                    { "product_id": catalog.analog.id, "slot": 3 }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (status, _) = app
        .call(
            &app.sales,
            Method::POST,
            "/api/v1/part-numbers/preview",
            Some(json!({
                "product_id": catalog.chassis.id,
                "cards": [{ "product_id": catalog.wide.id, "slot": 4 }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
