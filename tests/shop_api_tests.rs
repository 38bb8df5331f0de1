use coursework::apps::shop;
use coursework::orm::{self, Db};
use coursework::router::{AppState, Method, Request, Response, Router};
use coursework::settings::Settings;
use serde_json::{Value, json};
use std::sync::Arc;

async fn api() -> Router {
    let db = Arc::new(Db::connect("sqlite::memory:").await.unwrap());
    orm::auto_migrate(db.clone()).await.unwrap();
    shop::router(AppState::new(Settings::default()).with_db(db))
}

fn body(resp: &Response) -> Value {
    serde_json::from_str(&resp.body).unwrap()
}

async fn send(router: &Router, method: Method, path: &str, payload: Option<Value>) -> Response {
    let mut req = Request::new(method, path);
    if let Some(payload) = payload {
        req = req.with_json(&payload);
    }
    router.handle(req).await
}

async fn seed_user(router: &Router) -> i64 {
    let resp = send(
        router,
        Method::POST,
        "/users",
        Some(json!({
            "first_name": "Grace",
            "last_name": "Hopper",
            "email": "grace@example.com",
            "password": "cobol1959",
        })),
    )
    .await;
    assert_eq!(resp.status_code, 201);
    body(&resp)["id"].as_i64().unwrap()
}

async fn seed_product(router: &Router) -> i64 {
    let resp = send(
        router,
        Method::POST,
        "/products",
        Some(json!({"name": "Keyboard", "description": "Mechanical", "price": 49.99})),
    )
    .await;
    assert_eq!(resp.status_code, 201);
    body(&resp)["id"].as_i64().unwrap()
}

#[tokio::test]
async fn products_full_lifecycle() {
    let router = api().await;

    let resp = send(&router, Method::GET, "/products", None).await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(body(&resp), json!([]));

    let id = seed_product(&router).await;

    let resp = send(&router, Method::GET, &format!("/products/{}", id), None).await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(
        body(&resp),
        json!({"id": id, "name": "Keyboard", "description": "Mechanical", "price": 49.99})
    );
    assert_eq!(
        resp.header("content-type"),
        Some("application/json; charset=utf-8")
    );

    let resp = send(
        &router,
        Method::PUT,
        &format!("/products/{}", id),
        Some(json!({"price": 39.5})),
    )
    .await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(body(&resp)["price"], 39.5);
    assert_eq!(body(&resp)["name"], "Keyboard");

    let resp = send(&router, Method::GET, "/products", None).await;
    assert_eq!(body(&resp).as_array().unwrap().len(), 1);

    let resp = send(&router, Method::DELETE, &format!("/products/{}", id), None).await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(body(&resp)["id"], id);

    let resp = send(&router, Method::GET, &format!("/products/{}", id), None).await;
    assert_eq!(resp.status_code, 404);
    assert_eq!(body(&resp), json!({"error": "Product not found"}));
}

#[tokio::test]
async fn missing_rows_are_404_for_every_verb() {
    let router = api().await;
    for (method, label, path) in [
        (Method::GET, "Order", "/orders/7"),
        (Method::DELETE, "User", "/users/7"),
        (Method::GET, "Product", "/products/abc"),
    ] {
        let resp = send(&router, method, path, None).await;
        assert_eq!(resp.status_code, 404, "{} {}", method, path);
        assert_eq!(body(&resp)["error"], format!("{} not found", label));
    }

    let resp = send(&router, Method::PUT, "/products/7", Some(json!({"price": 1}))).await;
    assert_eq!(resp.status_code, 404);
}

#[tokio::test]
async fn bad_payloads_are_400_with_detail() {
    let router = api().await;

    let resp = send(
        &router,
        Method::POST,
        "/products",
        Some(json!({"name": "No price", "description": "d"})),
    )
    .await;
    assert_eq!(resp.status_code, 400);
    let err = body(&resp);
    assert_eq!(err["error"], "Product creation failed");
    assert!(err["detail"].as_str().unwrap().contains("missing field `price`"));

    let resp = router
        .handle(
            Request::new(Method::POST, "/products")
                .with_header("Content-Type", "application/json")
                .with_body("{not json"),
        )
        .await;
    assert_eq!(resp.status_code, 400);
    assert_eq!(body(&resp)["error"], "Product creation failed");

    let resp = router
        .handle(Request::new(Method::POST, "/products").with_form(&[("name", "x")]))
        .await;
    assert_eq!(resp.status_code, 400);

    let id = seed_product(&router).await;
    let resp = send(
        &router,
        Method::PUT,
        &format!("/products/{}", id),
        Some(json!({"stock": 3})),
    )
    .await;
    assert_eq!(resp.status_code, 400);
    assert_eq!(body(&resp)["error"], "Product update failed");
}

#[tokio::test]
async fn users_never_expose_passwords() {
    let router = api().await;
    let id = seed_user(&router).await;

    let resp = send(&router, Method::GET, &format!("/users/{}", id), None).await;
    let user = body(&resp);
    assert_eq!(user["email"], "grace@example.com");
    assert!(user.get("password").is_none());

    let resp = send(&router, Method::GET, "/users", None).await;
    assert!(!resp.body.contains("cobol1959"));
    assert!(!resp.body.contains("argon2"));

    let resp = send(
        &router,
        Method::POST,
        "/users",
        Some(json!({
            "first_name": "Other",
            "last_name": "Grace",
            "email": "grace@example.com",
            "password": "pw",
        })),
    )
    .await;
    assert_eq!(resp.status_code, 400);
    assert_eq!(body(&resp)["error"], "User creation failed");
}

#[tokio::test]
async fn orders_link_users_and_products() {
    let router = api().await;
    let user_id = seed_user(&router).await;
    let product_id = seed_product(&router).await;

    let resp = send(
        &router,
        Method::POST,
        "/orders",
        Some(json!({
            "user_id": user_id,
            "product_id": product_id,
            "order_date": "2024-05-17",
            "status": "pending",
        })),
    )
    .await;
    assert_eq!(resp.status_code, 201);
    let order_id = body(&resp)["id"].as_i64().unwrap();

    let resp = send(
        &router,
        Method::PUT,
        &format!("/orders/{}", order_id),
        Some(json!({"status": "shipped"})),
    )
    .await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(body(&resp)["status"], "shipped");
    assert_eq!(body(&resp)["order_date"], "2024-05-17");

    let resp = send(
        &router,
        Method::POST,
        "/orders",
        Some(json!({
            "user_id": user_id,
            "product_id": 999,
            "order_date": "2024-05-17",
            "status": "pending",
        })),
    )
    .await;
    assert_eq!(resp.status_code, 400);

    let resp = send(
        &router,
        Method::POST,
        "/orders",
        Some(json!({
            "user_id": user_id,
            "product_id": product_id,
            "order_date": "next tuesday",
            "status": "pending",
        })),
    )
    .await;
    assert_eq!(resp.status_code, 400);
    assert!(body(&resp)["detail"].as_str().unwrap().contains("order_date"));

    let resp = send(&router, Method::DELETE, &format!("/products/{}", product_id), None).await;
    assert_eq!(resp.status_code, 400);
    assert_eq!(body(&resp)["error"], "Product deletion failed");
}

#[tokio::test]
async fn unsupported_methods_are_405() {
    let router = api().await;
    let resp = send(&router, Method::PATCH, "/products", None).await;
    assert_eq!(resp.status_code, 405);
    let resp = send(&router, Method::GET, "/customers", None).await;
    assert_eq!(resp.status_code, 404);
}
