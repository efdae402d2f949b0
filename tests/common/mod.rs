#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use quote_workflow_api::{
    auth::{AuthUser, Role},
    config::AppConfig,
    db,
    entities::product,
    events::{self, EventSender},
    services::catalog::{CreateProductInput, ProductLevel},
    AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

/// A caller with a bearer token
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub token: String,
}

impl TestUser {
    pub fn actor(&self) -> AuthUser {
        AuthUser {
            user_id: self.id,
            email: Some(self.email.clone()),
            role: self.role,
        }
    }
}

/// Ids of the demo catalog seeded by [`TestApp::seed_catalog`]
#[derive(Debug, Clone)]
pub struct Catalog {
    pub family: product::Model,
    pub chassis: product::Model,
    pub analog: product::Model,
    pub wide: product::Model,
    pub inputs_4: product::Model,
    pub bushings_3: product::Model,
}

/// Application router over a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub sales: TestUser,
    pub other_sales: TestUser,
    pub admin: TestUser,
    pub finance: TestUser,
    _event_task: tokio::task::JoinHandle<()>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("quotes.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test_secret_key_for_quote_workflow_tests_0123456789".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, Arc::new(event_sender));
        let router = quote_workflow_api::build_router(state.clone());

        let user = |name: &str, role: Role| {
            let id = Uuid::new_v4();
            let email = format!("{}@example.com", name);
            let token = state
                .auth
                .issue_token(id, Some(email.clone()), role)
                .expect("issue token");
            TestUser {
                id,
                email,
                role,
                token,
            }
        };
        let sales = user("sally", Role::Sales);
        let other_sales = user("sam", Role::Sales);
        let admin = user("ada", Role::Admin);
        let finance = user("fin", Role::Finance);

        Self {
            router,
            state,
            sales,
            other_sales,
            admin,
            finance,
            _event_task: event_task,
            _dir: dir,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Request as `user`, returning status and parsed JSON body
    pub async fn call(
        &self,
        user: &TestUser,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, Some(&user.token)).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    async fn create(&self, input: CreateProductInput) -> product::Model {
        self.state
            .services
            .catalog
            .create_product(&self.admin.actor(), input)
            .await
            .expect("seed product")
    }

    /// Transformer-monitoring family with a 4-slot chassis, a single-slot
    /// analog card and a two-slot bushing card, each with one option set.
    pub async fn seed_catalog(&self) -> Catalog {
        let family = self
            .create(product_input(None, ProductLevel::AssetFamily, "Transformer monitoring"))
            .await;

        let mut chassis = product_input(Some(family.id), ProductLevel::Chassis, "QTMS 4-slot");
        chassis.part_number_code = Some("QTMS-".into());
        chassis.slot_count = Some(4);
        chassis.price = dec!(1000);
        chassis.cost = dec!(400);
        let chassis = self.create(chassis).await;

        let mut analog = product_input(Some(chassis.id), ProductLevel::Card, "Analog card");
        analog.part_number_code = Some("A{inputs}".into());
        analog.price = dec!(200);
        analog.cost = dec!(80);
        let analog = self.create(analog).await;

        let mut wide = product_input(Some(chassis.id), ProductLevel::Card, "Bushing monitor");
        wide.part_number_code = Some("B{bushings}".into());
        wide.slot_span = Some(2);
        wide.price = dec!(500);
        wide.cost = dec!(250);
        let wide = self.create(wide).await;

        let mut inputs_4 = product_input(Some(analog.id), ProductLevel::OptionSet, "4 inputs");
        inputs_4.input_count = Some(4);
        inputs_4.price = dec!(50);
        inputs_4.cost = dec!(10);
        let inputs_4 = self.create(inputs_4).await;

        let mut bushings_3 = product_input(Some(wide.id), ProductLevel::OptionSet, "3 bushings");
        bushings_3.bushing_count = Some(3);
        let bushings_3 = self.create(bushings_3).await;

        Catalog {
            family,
            chassis,
            analog,
            wide,
            inputs_4,
            bushings_3,
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn product_input(parent_id: Option<Uuid>, level: ProductLevel, name: &str) -> CreateProductInput {
    CreateProductInput {
        parent_id,
        level: level.as_i32(),
        name: name.to_string(),
        description: None,
        part_number_code: None,
        slot_count: None,
        slot_span: None,
        input_count: None,
        bushing_count: None,
        price: Decimal::ZERO,
        cost: Decimal::ZERO,
        enabled: None,
        sort_order: None,
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json response")
}

/// Reads a decimal that may have been serialized as a string or a number
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("expected decimal, got {}", other),
    }
}
