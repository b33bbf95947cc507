//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain::{
    Branch, BranchCodes, City, PaymentMode, PaymentModeCode, Plan, Product, ProductCategory,
    ProductType, SkuMapping,
};
use issuance::{IssuanceConfig, OutboxSignal};
use metrics_exporter_prometheus::PrometheusHandle;
use policy_store::{InMemoryPolicyStore, ReferenceData};
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

async fn seeded_store() -> InMemoryPolicyStore {
    let store = InMemoryPolicyStore::new();
    store
        .insert_branch(Branch {
            id: 1,
            name: "Direct".to_string(),
            codes: BranchCodes::new("DIR", "DIT"),
        })
        .await;
    for (id, name, code) in [
        (1, "Cash on delivery", PaymentModeCode::Cod),
        (2, "B2B", PaymentModeCode::B2b),
        (3, "Credit card", PaymentModeCode::Other("CC".to_string())),
    ] {
        store
            .insert_payment_mode(PaymentMode {
                id,
                name: name.to_string(),
                code,
            })
            .await;
    }
    store
        .insert_city(City {
            id: 1,
            name: "Karachi".to_string(),
        })
        .await;
    store
        .insert_product(Product {
            id: 1,
            name: "Personal Care".to_string(),
            product_type: ProductType::Health,
            category: ProductCategory {
                id: 1,
                name: "Health".to_string(),
                code: 1,
            },
        })
        .await;
    store
        .insert_product(Product {
            id: 2,
            name: "Student Travel".to_string(),
            product_type: ProductType::Travel,
            category: ProductCategory {
                id: 2,
                name: "Travel".to_string(),
                code: 4,
            },
        })
        .await;
    store
        .insert_plan(Plan {
            id: 1,
            name: "Gold".to_string(),
        })
        .await;
    for (parent, child, product_id) in [("HLT", "HLT-GOLD", 1), ("TRV", "TRV-STD", 2)] {
        store
            .insert_sku_mapping(SkuMapping {
                parent_sku: parent.to_string(),
                child_sku: child.to_string(),
                plan_id: 1,
                product_id,
                option_id: 1,
            })
            .await;
    }
    store
}

async fn setup() -> axum::Router {
    let store = seeded_store().await;
    let state = api::create_default_state(store, IssuanceConfig::default(), OutboxSignal::new());
    api::create_app(state, get_metrics_handle())
}

fn order_body(order_code: &str, payment_method_id: i64) -> serde_json::Value {
    serde_json::json!({
        "order_code": order_code,
        "customer_name": "Ayesha Khan",
        "customer_phone": "03001234567",
        "customer_city": 1,
        "payment_method_id": payment_method_id,
        "received_premium": 250000,
        "shipping": {
            "recipient_name": "Ayesha Khan",
            "address": "House 1, Street 2, Clifton",
            "phone": "03001234567"
        },
        "product_details": {
            "parent_sku": "HLT",
            "sku": "HLT-GOLD",
            "item_price": 250000,
            "sum_insured": 50000000,
            "product_type": "health"
        },
        "customer_details": [
            { "type": "customer", "insurance_name": "Ayesha Khan", "insurance_dob": "1990-01-31" }
        ]
    })
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_b2b_order_returns_policy_code() {
    let app = setup().await;

    let response = app
        .oneshot(post_json("/orders", &order_body("ORD-1", 2)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert_eq!(json["policy_code"], "910510000001");
}

#[tokio::test]
async fn test_duplicate_order_code_is_conflict() {
    let app = setup().await;

    let first = app
        .clone()
        .oneshot(post_json("/orders", &order_body("ORD-DUP", 2)))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .oneshot(post_json("/orders", &order_body("ORD-DUP", 2)))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let json = json_body(second).await;
    assert!(json["error"].as_str().unwrap().contains("ORD-DUP"));
}

#[tokio::test]
async fn test_invalid_travel_window_is_unprocessable() {
    let app = setup().await;
    let mut body = order_body("ORD-TRV", 2);
    body["product_details"]["parent_sku"] = "TRV".into();
    body["product_details"]["sku"] = "TRV-STD".into();
    body["travel_details"] = serde_json::json!({
        "origin": "Karachi",
        "destination": "London",
        "travel_days": 10,
        "tuition_fee": false,
        "travel_start_date": "2025-03-10",
        "travel_end_date": "2025-03-01"
    });

    let response = app.oneshot(post_json("/orders", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("travel_details"));
}

#[tokio::test]
async fn test_unknown_sku_is_not_found() {
    let app = setup().await;
    let mut body = order_body("ORD-SKU", 2);
    body["product_details"]["sku"] = "HLT-PLATINUM".into();

    let response = app.oneshot(post_json("/orders", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_card_flow_over_http() {
    let app = setup().await;

    let created = app
        .clone()
        .oneshot(post_json("/orders", &order_body("ORD-CC", 3)))
        .await
        .unwrap();
    let issued = json_body(created).await;

    let declined = app
        .clone()
        .oneshot(post_json(
            "/orders/cc-transaction",
            &serde_json::json!({ "order_code": "ORD-CC", "reason_code": "481" }),
        ))
        .await
        .unwrap();
    assert_eq!(declined.status(), StatusCode::OK);
    assert!(json_body(declined).await["policy_code"].is_null());

    let approved = app
        .clone()
        .oneshot(post_json(
            "/orders/cc-transaction",
            &serde_json::json!({
                "order_code": "ORD-CC",
                "transaction_id": "TXN-1",
                "approval_code": "APR-1",
                "reason_code": "100"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(approved.status(), StatusCode::OK);
    assert_eq!(json_body(approved).await["policy_code"], issued["policy_code"]);

    let summary = app.oneshot(get("/orders/ORD-CC")).await.unwrap();
    assert_eq!(summary.status(), StatusCode::OK);
    let json = json_body(summary).await;
    assert_eq!(json["order"]["status"], "verified");
    assert_eq!(json["policy"]["status"], "pendingCBO");
}

#[tokio::test]
async fn test_card_callback_for_unknown_order_is_not_found() {
    let app = setup().await;

    let response = app
        .oneshot(post_json(
            "/orders/cc-transaction",
            &serde_json::json!({ "order_code": "ORD-NONE", "reason_code": "100" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_nonexistent_order() {
    let app = setup().await;

    let response = app.oneshot(get("/orders/ORD-MISSING")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cod_order_is_queued_and_can_be_repushed() {
    let app = setup().await;

    let created = app
        .clone()
        .oneshot(post_json("/orders", &order_body("ORD-COD", 1)))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let summary = json_body(app.clone().oneshot(get("/orders/ORD-COD")).await.unwrap()).await;
    assert_eq!(summary["order"]["status"], "unverified");
    assert_eq!(summary["tasks"].as_array().unwrap().len(), 1);
    assert_eq!(summary["tasks"][0]["status"], "pending");

    let response = app
        .oneshot(post_json(
            "/orders/ORD-COD/courier/repush",
            &serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = json_body(response).await;
    assert_eq!(json["status"], "pending");
    assert_eq!(json["attempts"], 0);
}

#[tokio::test]
async fn test_repush_of_card_order_is_conflict() {
    let app = setup().await;
    app.clone()
        .oneshot(post_json("/orders", &order_body("ORD-NOTCOD", 3)))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/orders/ORD-NOTCOD/courier/repush",
            &serde_json::json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_card_callback_for_cod_order_is_conflict() {
    let app = setup().await;
    app.clone()
        .oneshot(post_json("/orders", &order_body("ORD-CODCC", 1)))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            "/orders/cc-transaction",
            &serde_json::json!({ "order_code": "ORD-CODCC", "reason_code": "100" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let summary = json_body(app.oneshot(get("/orders/ORD-CODCC")).await.unwrap()).await;
    assert_eq!(summary["order"]["status"], "unverified");
    assert_eq!(summary["tasks"][0]["status"], "pending");
}

#[tokio::test]
async fn test_shipped_reference_fixture_serves_orders() {
    let data = ReferenceData::from_json(include_str!("../../../fixtures/reference_data.json"))
        .unwrap();
    let store = InMemoryPolicyStore::new();
    store.seed(data).await;
    let state = api::create_default_state(store, IssuanceConfig::default(), OutboxSignal::new());
    let app = api::create_app(state, get_metrics_handle());

    let response = app
        .clone()
        .oneshot(post_json("/orders", &order_body("ORD-FIX", 2)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await["policy_code"], "910510000001");

    let mut body = order_body("ORD-FIX-PP", 2);
    body["product_details"]["parent_sku"] = "PPR".into();
    body["product_details"]["sku"] = "PPR-12M".into();
    body["purchase_protection"] = serde_json::json!({
        "name": "Galaxy S24",
        "duration": 12,
        "duration_type": "month",
        "total_price": 25000000
    });
    let response = app.oneshot(post_json("/orders", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await["policy_code"], "DIR-009-0000002");
}

#[tokio::test]
async fn test_metrics_endpoint_reports_issuance() {
    let app = setup().await;
    app.clone()
        .oneshot(post_json("/orders", &order_body("ORD-MET", 2)))
        .await
        .unwrap();

    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("policies_issued_total"));
}
