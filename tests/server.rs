//! HTTP contract tests against a live router on an ephemeral port.

use serde_json::{json, Value};
use std::sync::Arc;

use catalog_assist::assistant::Assistant;
use catalog_assist::catalog::MemoryCatalog;
use catalog_assist::config::Config;
use catalog_assist::model::DisabledBackend;
use catalog_assist::models::CatalogProduct;
use catalog_assist::server::router;

const CONFIG: &str = r#"
[db]
path = "unused.sqlite"

[rate_limit]
max_tokens = 3
refill_per_minute = 3

[server]
bind = "127.0.0.1:0"
"#;

fn product(id: &str, name: &str, category: &str, sold: i64) -> CatalogProduct {
    CatalogProduct {
        product_id: id.into(),
        name: name.into(),
        category: category.into(),
        price: 99_000.0,
        stock: 4,
        size: "M".into(),
        condition: None,
        description: "Kaos katun combed keren".into(),
        rating: Some(4.6),
        units_sold: Some(sold),
    }
}

async fn spawn_server() -> String {
    let config: Config = toml::from_str(CONFIG).unwrap();
    let catalog = Arc::new(MemoryCatalog::new(vec![
        product("TS001", "Kaos Polos Hitam", "Kaos", 120),
        product("TS002", "Kaos Oversize Putih", "Kaos", 60),
        product("DP001", "Celana Jeans Slim", "Celana", 80),
    ]));
    let assistant = Arc::new(Assistant::new(&config, catalog, Arc::new(DisabledBackend)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(assistant)).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health_reports_bucket() {
    let base = spawn_server().await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "disabled");
    assert_eq!(body["rate_limit"]["max_tokens"], 3);
}

#[tokio::test]
async fn test_short_query_is_bad_request() {
    let base = spawn_server().await;
    let res = reqwest::Client::new()
        .post(format!("{}/api/recommendations", base))
        .json(&json!({ "query": "ab" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("at least 3"));
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let base = spawn_server().await;
    let res = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_recommendations_fall_back_when_model_disabled() {
    let base = spawn_server().await;
    let body: Value = reqwest::Client::new()
        .post(format!("{}/api/recommendations", base))
        .json(&json!({ "query": "kaos keren", "limit": 2 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["fallback"], true);
    let products = body["products"].as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[0]["productId"], "TS001");
    assert!(products[0]["reason"].as_str().is_some());
}

#[tokio::test]
async fn test_suggestions_correct_typos() {
    let base = spawn_server().await;
    let body: Value = reqwest::Client::new()
        .post(format!("{}/api/suggestions", base))
        .json(&json!({ "query": "koas" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["fallback"], true);
    assert_eq!(body["correctedQuery"], "kaos");
    assert!(!body["suggestions"].as_array().unwrap().is_empty());
}
