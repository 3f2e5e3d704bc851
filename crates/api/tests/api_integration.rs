//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{BookId, Discount, Money, UserId};
use domain::RecordingNotifier;
use metrics_exporter_prometheus::PrometheusHandle;
use persistence::{BookRecord, InMemoryStore};
use serde_json::{Value, json};
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
    router: axum::Router,
    store: InMemoryStore,
    notifier: RecordingNotifier,
}

impl TestApp {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let notifier = RecordingNotifier::new();
        let state = api::create_state(store.clone(), Arc::new(notifier.clone()));
        Self {
            router: api::create_app(state, get_metrics_handle()),
            store,
            notifier,
        }
    }

    async fn book(&self, price_cents: i64, discount_percent: u32, stock: u32) -> BookId {
        let id = BookId::new();
        self.store
            .insert_book(BookRecord {
                id,
                name: "A Wizard of Earthsea".to_string(),
                author_name: "Ursula K. Le Guin".to_string(),
                image_url: None,
                price: Money::from_cents(price_cents),
                discount: Discount::from_percent(discount_percent).unwrap(),
                available_stock: stock,
                is_active: true,
            })
            .await;
        id
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        user: Option<(UserId, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((user_id, role)) = user {
            builder = builder
                .header("x-user-id", user_id.to_string())
                .header("x-user-role", role);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

fn user() -> Option<(UserId, &'static str)> {
    Some((UserId::new(), "USER"))
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let (status, json) = app.send("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new();

    let response = app
        .router
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
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let app = TestApp::new();

    let (status, json) = app.send("GET", "/cart", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].as_str().unwrap().contains("x-user-id"));
}

#[tokio::test]
async fn test_add_item_returns_cart_view() {
    let app = TestApp::new();
    let book = app.book(5000, 20, 10).await;
    let caller = user();

    let (status, json) = app
        .send(
            "POST",
            "/cart/items",
            caller,
            Some(json!({ "book_id": book, "count": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["subtotal"], 8000);
    assert_eq!(json["total_items"], 2);
    assert_eq!(json["items"][0]["unit_price"], 4000);

    let (status, json) = app
        .send(
            "PUT",
            "/cart/items",
            caller,
            Some(json!({ "book_id": book, "count": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_items"], 1);

    let (_, json) = app.send("GET", "/cart", caller, None).await;
    assert_eq!(json["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cart_validation_errors() {
    let app = TestApp::new();
    let book = app.book(1000, 0, 2).await;

    let (status, json) = app
        .send(
            "POST",
            "/cart/items",
            user(),
            Some(json!({ "book_id": book, "count": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Invalid count"));

    let (status, _) = app
        .send(
            "POST",
            "/cart/items",
            user(),
            Some(json!({ "book_id": BookId::new(), "count": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            "POST",
            "/cart/items",
            user(),
            Some(json!({ "book_id": book, "count": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_remove_and_clear_cart() {
    let app = TestApp::new();
    let first = app.book(1000, 0, 5).await;
    let second = app.book(2000, 0, 5).await;
    let caller = user();
    for book in [first, second] {
        app.send(
            "POST",
            "/cart/items",
            caller,
            Some(json!({ "book_id": book, "count": 1 })),
        )
        .await;
    }

    let (status, json) = app
        .send("DELETE", &format!("/cart/items/{first}"), caller, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["items"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .send("DELETE", &format!("/cart/items/{first}"), caller, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send("DELETE", "/cart", caller, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, json) = app.send("GET", "/cart", caller, None).await;
    assert_eq!(json["total_items"], 0);
}

#[tokio::test]
async fn test_checkout_empty_cart_conflicts() {
    let app = TestApp::new();

    let (status, json) = app
        .send(
            "POST",
            "/orders/checkout",
            user(),
            Some(json!({ "payment_method": "UPI" })),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("Cart is empty"));
}

#[tokio::test]
async fn test_checkout_and_payment_flow() {
    let app = TestApp::new();
    let a = app.book(5000, 20, 10).await;
    let b = app.book(1550, 0, 5).await;
    let caller = user();
    app.send(
        "POST",
        "/cart/items",
        caller,
        Some(json!({ "book_id": a, "count": 2 })),
    )
    .await;
    app.send(
        "POST",
        "/cart/items",
        caller,
        Some(json!({ "book_id": b, "count": 1 })),
    )
    .await;

    let (status, order) = app
        .send(
            "POST",
            "/orders/checkout",
            caller,
            Some(json!({ "payment_method": "CREDIT_CARD" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["total_price"], 9550);
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["payment_status"], "PENDING");
    assert_eq!(order["payment_method"], "CREDIT_CARD");
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, paid) = app
        .send(
            "POST",
            "/orders/payment",
            caller,
            Some(json!({ "order_id": order_id, "success": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "COMPLETED");
    assert_eq!(paid["payment_status"], "PAID");
    assert_eq!(app.store.book(a).await.unwrap().available_stock, 8);
    assert_eq!(app.store.book(b).await.unwrap().available_stock, 4);

    let (_, cart) = app.send("GET", "/cart", caller, None).await;
    assert_eq!(cart["total_items"], 0);

    let (status, _) = app
        .send(
            "POST",
            "/orders/payment",
            caller,
            Some(json!({ "order_id": order_id, "success": false })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, fetched) = app
        .send("GET", &format!("/orders/{order_id}"), caller, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["order_number"], order["order_number"]);

    let (status, listed) = app.send("GET", "/orders?limit=5", caller, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    assert_eq!(app.notifier.sent().len(), 2);
}

#[tokio::test]
async fn test_other_users_order_is_forbidden() {
    let app = TestApp::new();
    let book = app.book(1000, 0, 5).await;
    let owner = user();
    app.send(
        "POST",
        "/cart/items",
        owner,
        Some(json!({ "book_id": book, "count": 1 })),
    )
    .await;
    let (_, order) = app
        .send(
            "POST",
            "/orders/checkout",
            owner,
            Some(json!({ "payment_method": "COD" })),
        )
        .await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let intruder = user();
    let (status, _) = app
        .send(
            "POST",
            "/orders/payment",
            intruder,
            Some(json!({ "order_id": order_id, "success": true })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send("GET", &format!("/orders/{order_id}"), intruder, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_list_all_orders_requires_admin() {
    let app = TestApp::new();

    let (status, _) = app.send("GET", "/orders/all", user(), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = Some((UserId::new(), "ADMIN"));
    let (status, json) = app
        .send("GET", "/orders/all?limit=10&offset=0", admin, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let app = TestApp::new();

    let (status, _) = app
        .send(
            "GET",
            &format!("/orders/{}", uuid::Uuid::new_v4()),
            user(),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = TestApp::new();
    let book = app.book(1000, 0, 5).await;

    let (status, json) = app
        .send(
            "POST",
            "/cart/items",
            user(),
            Some(json!({ "book_id": book })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("count"));

    let (status, json) = app
        .send(
            "POST",
            "/orders/checkout",
            user(),
            Some(json!({ "payment_method": "BITCOIN" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_malformed_path_and_query_are_bad_request() {
    let app = TestApp::new();

    let (status, json) = app
        .send("DELETE", "/cart/items/not-a-uuid", user(), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, json) = app
        .send("GET", "/orders/not-a-uuid", user(), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, json) = app.send("GET", "/orders?limit=many", user(), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}
