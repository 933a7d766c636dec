//! End-to-end pipeline behavior against stub model backends and an
//! in-memory catalog.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use catalog_assist::assistant::Assistant;
use catalog_assist::catalog::MemoryCatalog;
use catalog_assist::config::Config;
use catalog_assist::error::AssistError;
use catalog_assist::extract::{ProductCard, ProposedProduct};
use catalog_assist::fallback::{score_product, QueryTerms};
use catalog_assist::model::{
    CompletionOptions, CompletionRequest, DisabledBackend, GenerationConfig, ModelBackend,
    ModelClient, RetryPolicy,
};
use catalog_assist::models::{CatalogProduct, RecommendRequest};
use catalog_assist::reconcile::{MatchOutcome, ProductReconciler};

const CONFIG: &str = r#"
[db]
path = "unused.sqlite"

[model]
max_retries = 0
retry_delay_ms = 1

[server]
bind = "127.0.0.1:0"
"#;

fn config() -> Config {
    toml::from_str(CONFIG).unwrap()
}

fn product(id: &str, name: &str, category: &str, sold: i64) -> CatalogProduct {
    CatalogProduct {
        product_id: id.into(),
        name: name.into(),
        category: category.into(),
        price: 150_000.0,
        stock: 3,
        size: "L".into(),
        condition: Some("Baru".into()),
        description: "Bahan katun".into(),
        rating: Some(4.0),
        units_sold: Some(sold),
    }
}

fn catalog() -> Arc<MemoryCatalog> {
    Arc::new(MemoryCatalog::new(vec![
        product("KM001", "Kemeja Flanel Kotak", "Kemeja", 40),
        product("CL001", "Celana Chino Krem", "Celana", 40),
        product("JK001", "Jaket (Black)", "Jaket", 10),
        product("JK002", "Jaket Bomber", "Jaket", 12),
        product("JK003", "Jaket Denim", "Jaket", 8),
    ]))
}

/// Replays scripted results in order and records when each call arrived.
struct Scripted {
    results: Mutex<VecDeque<Result<String, AssistError>>>,
    calls: AtomicUsize,
    seen_at: Mutex<Vec<tokio::time::Instant>>,
}

impl Scripted {
    fn new(results: Vec<Result<String, AssistError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
            seen_at: Mutex::new(Vec::new()),
        })
    }

    fn throttled_then_ok(throttled: usize) -> Arc<Self> {
        let mut results: Vec<Result<String, AssistError>> = (0..throttled)
            .map(|_| {
                Err(AssistError::from_status(
                    429,
                    "RESOURCE_EXHAUSTED".to_string(),
                ))
            })
            .collect();
        results.push(Ok("siap".to_string()));
        Self::new(results)
    }
}

#[async_trait]
impl ModelBackend for Scripted {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, _request: &CompletionRequest) -> Result<String, AssistError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_at.lock().unwrap().push(tokio::time::Instant::now());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AssistError::UpstreamTimeout))
    }
}

fn options(max_retries: u32, base_delay: Duration) -> CompletionOptions {
    CompletionOptions {
        generation: GenerationConfig {
            temperature: 0.4,
            top_p: None,
            top_k: None,
            max_output_tokens: 256,
        },
        timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_retries,
            base_delay,
        },
    }
}

#[tokio::test]
async fn test_identical_requests_call_model_once() {
    let reply = r#"{"queryAnalysis":"Mencari celana","recommendedProducts":[{"id":"CL001","reason":"Nyaman"}]}"#;
    let backend = Scripted::new(vec![Ok(reply.to_string())]);
    let assistant = Assistant::new(&config(), catalog(), backend.clone());

    let request = RecommendRequest {
        query: "celana santai".into(),
        limit: Some(2),
    };
    let first = assistant.recommend(request.clone()).await.unwrap();
    let second = assistant
        .recommend(RecommendRequest {
            query: "  CELANA   santai ".into(),
            limit: Some(2),
        })
        .await
        .unwrap();

    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    assert!(!first.fallback);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.products, second.products);
    assert_eq!(first.products[0].product.product_id, "CL001");
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_before_success() {
    let backend = Scripted::throttled_then_ok(3);
    let client = ModelClient::new(backend.clone());

    let err = client
        .complete_prompt("halo", &options(2, Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AssistError::UpstreamServerError { status: 429, .. }
    ));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retries_back_off_exponentially() {
    let base = Duration::from_millis(100);
    let backend = Scripted::throttled_then_ok(3);
    let client = ModelClient::new(backend.clone());

    let text = client.complete_prompt("halo", &options(3, base)).await.unwrap();
    assert_eq!(text, "siap");
    assert_eq!(backend.calls.load(Ordering::SeqCst), 4);

    let seen = backend.seen_at.lock().unwrap().clone();
    let gaps: Vec<Duration> = seen.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(gaps.len(), 3);
    for (attempt, gap) in gaps.iter().enumerate() {
        assert!(*gap >= base * 2u32.pow(attempt as u32), "gap {} too short: {:?}", attempt, gap);
    }
    assert!(gaps.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_fallback_ranks_category_matches_first() {
    let assistant = Assistant::new(&config(), catalog(), Arc::new(DisabledBackend));
    let res = assistant
        .recommend(RecommendRequest {
            query: "celana jeans bagus".into(),
            limit: None,
        })
        .await
        .unwrap();

    assert!(res.fallback);
    assert!(!res.products.is_empty());
    assert!(res.query_analysis.contains("celana"));

    let terms = QueryTerms::parse("celana jeans bagus");
    let scores: Vec<f64> = res
        .products
        .iter()
        .map(|p| score_product(&terms, &p.product))
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));

    let position = |id: &str| {
        res.products
            .iter()
            .position(|p| p.product.product_id == id)
            .unwrap()
    };
    // Same popularity and rating; only the category differs.
    assert!(position("CL001") < position("KM001"));
}

#[tokio::test]
async fn test_three_proposals_reconcile_to_two() {
    let reconciler = ProductReconciler::new(catalog());
    let card = ProductCard {
        products: ["Jaket (Black)", "Jaket Bomber", "Jaket Denim"]
            .iter()
            .map(|name| ProposedProduct {
                name: name.to_string(),
                ..ProposedProduct::default()
            })
            .collect(),
        category: "Jaket".into(),
    };

    let result = reconciler.reconcile(&card, &[]).await;
    assert_eq!(result.outcome, MatchOutcome::Matched);
    assert_eq!(result.products.len(), 2);
    assert_eq!(result.products[0].name(), "Jaket (Black)");
}

#[tokio::test]
async fn test_metacharacter_names_match_literally() {
    let reconciler = ProductReconciler::new(catalog());
    let found = reconciler
        .find_by_names(&["Jaket (Black)".to_string(), "Jaket [".to_string()])
        .await
        .unwrap();
    let ids: Vec<&str> = found.iter().map(|p| p.product_id.as_str()).collect();
    assert_eq!(ids, vec!["JK001"]);
}
