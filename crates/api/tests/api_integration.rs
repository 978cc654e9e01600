//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::ProductId;
use domain::{ItemSource, Money, OrderStatus};
use fulfillment::{CatalogEntry, InMemoryCatalog, InMemoryVendorClient};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{InMemoryStore, OrderStore, OrderUpdate};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    store: InMemoryStore,
    vendor: InMemoryVendorClient,
}

async fn setup() -> TestApp {
    let store = InMemoryStore::new();
    let vendor = InMemoryVendorClient::new();
    let catalog = InMemoryCatalog::from_entries([
        CatalogEntry {
            product_id: ProductId::new("P1"),
            sku: "SKU-1".to_string(),
            name: "Desk Lamp".to_string(),
            unit_price: Money::from_cents(1999),
            source: ItemSource::Vendor {
                article_id: "ART-778".to_string(),
            },
            initial_stock: 10,
        },
        CatalogEntry {
            product_id: ProductId::new("P2"),
            sku: "SKU-2".to_string(),
            name: "Mug".to_string(),
            unit_price: Money::from_cents(499),
            source: ItemSource::Own,
            initial_stock: 5,
        },
    ]);
    api::register_catalog_stock(&store, &catalog).await.unwrap();

    let mut config = Config::default();
    config.orders.flat_shipping = Money::from_cents(500);
    let state = api::create_state(store.clone(), Arc::new(vendor.clone()), catalog, &config);

    TestApp {
        app: api::create_app(state, get_metrics_handle()),
        store,
        vendor,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn post(&self, uri: &str, role: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(role) = role {
            builder = builder.header("x-caller-role", role);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn get(&self, uri: &str, role: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(role) = role {
            builder = builder.header("x-caller-role", role);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn create_order(&self, lines: Value) -> String {
        let (status, json) = self.post("/orders", None, checkout(lines)).await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["order_id"].as_str().unwrap().to_string()
    }

    async fn pay(&self, order_id: &str) -> (StatusCode, Value) {
        self.post(
            &format!("/orders/{order_id}/payment/success"),
            Some("system"),
            json!({ "transaction_id": "tx-1" }),
        )
        .await
    }
}

fn checkout(lines: Value) -> Value {
    json!({
        "customer": { "type": "guest", "email": "guest@example.com" },
        "lines": lines,
        "shipping_address": {
            "name": "Ada Lovelace",
            "line1": "1 Analytical Way",
            "postal_code": "10115",
            "city": "Berlin",
            "country": "DE"
        },
        "payment_method": "card"
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;

    let (status, json) = app.get("/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_order() {
    let app = setup().await;

    let (status, json) = app
        .post(
            "/orders",
            None,
            checkout(json!([
                { "product_id": "P1", "quantity": 2 },
                { "product_id": "P2", "quantity": 1 }
            ])),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["total"], 2 * 1999 + 499 + 500);
    assert!(json["order_number"].as_str().unwrap().starts_with("ORD-"));
}

#[tokio::test]
async fn test_create_order_rejects_unknown_product() {
    let app = setup().await;

    let (status, json) = app
        .post(
            "/orders",
            None,
            checkout(json!([{ "product_id": "nope", "quantity": 1 }])),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_get_order_invalid_id() {
    let app = setup().await;

    let (status, _) = app.get("/orders/not-a-uuid", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_order_not_found() {
    let app = setup().await;

    let (status, json) = app
        .get(&format!("/orders/{}", uuid::Uuid::new_v4()), None)
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_order_details_hide_vendor_data_from_customers() {
    let app = setup().await;
    let order_id = app.create_order(json!([{ "product_id": "P1", "quantity": 1 }])).await;
    app.pay(&order_id).await;

    let (status, public) = app.get(&format!("/orders/{order_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public["status"], "reserved");
    assert!(public.get("fulfillment_status").is_none());
    assert!(public["items"][0].get("vendor_article_id").is_none());
    assert!(!public.to_string().contains("ART-778"));

    let (status, internal) = app.get(&format!("/orders/{order_id}"), Some("admin")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(internal["fulfillment_status"], "vendor_pending");
    assert_eq!(internal["items"][0]["vendor_article_id"], "ART-778");
}

#[tokio::test]
async fn test_other_customers_cannot_see_order() {
    let app = setup().await;
    let order_id = app.create_order(json!([{ "product_id": "P2", "quantity": 1 }])).await;

    let request = Request::builder()
        .uri(format!("/orders/{order_id}"))
        .header("x-customer-id", uuid::Uuid::new_v4().to_string())
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payment_success_requires_privileged_caller() {
    let app = setup().await;
    let order_id = app.create_order(json!([{ "product_id": "P2", "quantity": 1 }])).await;

    let (status, _) = app
        .post(
            &format!("/orders/{order_id}/payment/success"),
            None,
            json!({ "transaction_id": "tx-1" }),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_payment_success_secures_stock() {
    let app = setup().await;
    let order_id = app
        .create_order(json!([
            { "product_id": "P1", "quantity": 2 },
            { "product_id": "P2", "quantity": 1 }
        ]))
        .await;

    let (status, json) = app.pay(&order_id).await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["status"], "processing");
    assert_eq!(json["fulfillment_status"], "partially_fulfilled");
    assert!(json["order_number"].as_str().unwrap().starts_with("ORD-"));
    assert!(json.get("failures").is_none());

    let (status, _) = app.pay(&order_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_payment_success_aborts_when_nothing_can_be_secured() {
    let app = setup().await;
    app.vendor.fail_article("ART-778").await;
    let order_id = app
        .create_order(json!([
            { "product_id": "P1", "quantity": 2 },
            { "product_id": "P2", "quantity": 1 }
        ]))
        .await;

    let (status, json) = app.pay(&order_id).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("fulfillment failed"));

    let (_, order) = app.get(&format!("/orders/{order_id}"), Some("admin")).await;
    assert_eq!(order["status"], "payment_pending");
    assert_eq!(order["payment_status"], "paid");
    assert_eq!(order["fulfillment_status"], "failed");
}

#[tokio::test]
async fn test_payment_failure_cancels_order() {
    let app = setup().await;
    let order_id = app.create_order(json!([{ "product_id": "P2", "quantity": 1 }])).await;

    let (status, _) = app
        .post(
            &format!("/orders/{order_id}/payment/failure"),
            Some("system"),
            json!({ "reason": "card declined" }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, order) = app.get(&format!("/orders/{order_id}"), None).await;
    assert_eq!(order["status"], "cancelled");
    assert_eq!(order["payment_status"], "failed");
    assert_eq!(order["cancellation_reason"], "card declined");
}

#[tokio::test]
async fn test_cancel_paid_order_refunds_and_releases() {
    let app = setup().await;
    let order_id = app.create_order(json!([{ "product_id": "P1", "quantity": 3 }])).await;
    app.pay(&order_id).await;

    let (status, _) = app
        .post(
            &format!("/orders/{order_id}/cancel"),
            None,
            json!({ "reason": "changed my mind" }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, order) = app.get(&format!("/orders/{order_id}"), None).await;
    assert_eq!(order["status"], "cancelled");
    assert_eq!(order["payment_status"], "refunded");

    let (_, reservations) = app
        .get(&format!("/orders/{order_id}/reservations"), Some("admin"))
        .await;
    assert_eq!(reservations["summary"]["unreserved"], 1);
    assert_eq!(app.vendor.active_holds().await, 0);
}

#[tokio::test]
async fn test_cancel_shipped_order_conflicts() {
    let app = setup().await;
    let order_id = app.create_order(json!([{ "product_id": "P2", "quantity": 1 }])).await;
    let id = common::OrderId::from_uuid(uuid::Uuid::parse_str(&order_id).unwrap());
    app.store
        .update_order(id, &[], OrderUpdate::new().status(OrderStatus::Shipped))
        .await
        .unwrap();

    let (status, json) = app
        .post(
            &format!("/orders/{order_id}/cancel"),
            None,
            json!({ "reason": "too late" }),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("shipped"));
    let order = app.store.get_order(id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Shipped);
}

#[tokio::test]
async fn test_reservations_endpoint_is_privileged() {
    let app = setup().await;
    let order_id = app.create_order(json!([{ "product_id": "P1", "quantity": 1 }])).await;
    app.pay(&order_id).await;

    let (status, _) = app.get(&format!("/orders/{order_id}/reservations"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = app
        .get(&format!("/orders/{order_id}/reservations"), Some("admin"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["summary"]["reserved"], 1);
    assert_eq!(json["summary"]["all_reserved"], true);
    assert_eq!(json["reservations"][0]["vendor_article_id"], "ART-778");
}

#[tokio::test]
async fn test_vendor_batch_run() {
    let app = setup().await;
    let order_id = app.create_order(json!([{ "product_id": "P1", "quantity": 2 }])).await;
    app.pay(&order_id).await;

    let (status, _) = app.post("/admin/vendor-orders/run", None, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, report) = app
        .post("/admin/vendor-orders/run", Some("admin"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["orders_processed"], 1);
    assert_eq!(report["errors"], json!([]));

    let (_, order) = app.get(&format!("/orders/{order_id}"), Some("admin")).await;
    assert_eq!(order["status"], "processing");
    assert_eq!(order["fulfillment_status"], "vendor_fulfilled");
    assert!(order["vendor_order_id"].is_string());

    let (_, report) = app
        .post("/admin/vendor-orders/run", Some("admin"), json!({}))
        .await;
    assert_eq!(report["orders_processed"], 0);
    assert_eq!(app.vendor.sales_order_count().await, 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup().await;

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}
