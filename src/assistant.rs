//! The recommendation pipeline.
//!
//! [`Assistant`] owns every piece of shared state (token bucket, result
//! caches, conversation sessions) and is built once at startup, then shared
//! behind an `Arc`. Each operation walks the same state machine:
//!
//! ```text
//! CacheCheck → RateGate → Calling → Extracting → Reconciling → Done
//!                  │          │                       │
//!                  └──────────┴───────→ Fallback ←────┘
//!                                          │
//!                                          └──→ Done
//! ```
//!
//! Only request validation can fail; past that point every path ends in a
//! response, degraded to the deterministic [`fallback`](crate::fallback)
//! engine when the model is denied, down, or unhelpful.

use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{cache_key, normalize_query, ResponseCache};
use crate::carousel::{CarouselTopic, APOLOGY};
use crate::catalog::{literal_matcher, CatalogFilter, CatalogStore};
use crate::config::{ChatConfig, Config, ModelConfig};
use crate::error::AssistError;
use crate::extract::{
    self, lenient_opt_string, parse_json_reply, ProductDetail, DEFAULT_CATEGORY,
};
use crate::fallback::{self, QueryTerms};
use crate::history::ConversationStore;
use crate::model::{create_backend, ChatTurn, CompletionOptions, ModelBackend, ModelClient};
use crate::models::{
    CatalogProduct, ChatRequest, ChatResponse, RecommendRequest, RecommendResponse,
    RecommendedProduct, SuggestRequest, SuggestResponse,
};
use crate::prompts;
use crate::rate_limit::{RateBucket, RateLimiter};
use crate::reconcile::{normalize, MatchOutcome, ProductReconciler};

pub const MIN_RECOMMEND_QUERY_CHARS: usize = 3;
pub const MIN_SUGGEST_QUERY_CHARS: usize = 2;
pub const DEFAULT_RECOMMEND_LIMIT: usize = 10;
pub const DEFAULT_SUGGEST_LIMIT: usize = 5;

/// In-stock products sampled (by units sold) for recommendation context.
const CATALOG_SAMPLE: usize = 100;
/// Products actually listed inside a prompt.
const PROMPT_SAMPLE: usize = 40;
const RELEVANT_LIMIT: usize = 15;
const DIRECT_MATCH_LIMIT: usize = 50;
const MAX_CARDS: usize = 4;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiRecommendation {
    #[serde(default)]
    query_analysis: String,
    #[serde(default)]
    recommended_products: Vec<AiPick>,
}

#[derive(Debug, Deserialize)]
struct AiPick {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiSuggestions {
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    corrected_query: Option<String>,
    #[serde(default)]
    related_terms: Vec<String>,
}

/// Products relevant to a chat input: the input names the product or its
/// category, or the description contains the input.
pub fn relevant_products(input: &str, catalog: &[CatalogProduct]) -> Vec<CatalogProduct> {
    let lower = input.to_lowercase();
    catalog
        .iter()
        .filter(|p| {
            let name = p.name.to_lowercase();
            let category = p.category.to_lowercase();
            (!name.is_empty() && lower.contains(&name))
                || (!category.is_empty() && lower.contains(&category))
                || p.description.to_lowercase().contains(&lower)
        })
        .take(RELEVANT_LIMIT)
        .cloned()
        .collect()
}

fn validate_limit(limit: Option<usize>) -> Result<(), AssistError> {
    if limit == Some(0) {
        return Err(AssistError::InvalidRequest(
            "Limit must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn detail_block(name: &str, description: &str, reason: &str, tips: Option<&str>) -> String {
    let mut block = format!(
        "**{}**\n\n{}\n\n**Alasan rekomendasi**: {}",
        name, description, reason
    );
    if let Some(tips) = tips.filter(|t| !t.is_empty()) {
        block.push_str("\n**Tips**: ");
        block.push_str(tips);
    }
    block
}

/// Markdown for model-authored details whose product was retained.
pub fn render_detail_blocks(details: &[ProductDetail], products: &[RecommendedProduct]) -> String {
    details
        .iter()
        .filter(|d| {
            let lower = d.name.to_lowercase();
            products.iter().any(|p| p.name().to_lowercase() == lower)
        })
        .map(|d| detail_block(&d.name, &d.description, &d.reason, d.tips.as_deref()))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Markdown for products carrying their own reasons.
pub fn render_reason_blocks(products: &[RecommendedProduct]) -> String {
    products
        .iter()
        .map(|p| {
            detail_block(
                p.name(),
                &p.product.description,
                p.reason.as_deref().unwrap_or_default(),
                p.tips.as_deref(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

pub struct Assistant {
    model_config: ModelConfig,
    chat_config: ChatConfig,
    catalog: Arc<dyn CatalogStore>,
    reconciler: ProductReconciler,
    client: ModelClient,
    limiter: RateLimiter,
    chat_cache: ResponseCache<ChatResponse>,
    recommend_cache: ResponseCache<RecommendResponse>,
    suggest_cache: ResponseCache<SuggestResponse>,
    conversations: ConversationStore,
}

impl Assistant {
    pub fn new(config: &Config, catalog: Arc<dyn CatalogStore>, backend: Arc<dyn ModelBackend>) -> Self {
        let capacity = config.cache.capacity;
        let ttl = config.cache.ttl();
        Self {
            model_config: config.model.clone(),
            chat_config: config.chat.clone(),
            reconciler: ProductReconciler::new(catalog.clone()),
            catalog,
            client: ModelClient::new(backend),
            limiter: RateLimiter::new(config.rate_limit.max_tokens, config.rate_limit.refill_per_minute),
            chat_cache: ResponseCache::new(capacity, ttl),
            recommend_cache: ResponseCache::new(capacity, ttl),
            suggest_cache: ResponseCache::new(capacity, ttl),
            conversations: ConversationStore::new(
                config.chat.max_sessions,
                config.chat.history_limit,
                prompts::CHAT_SYSTEM_PROMPT,
            ),
        }
    }

    /// Build an assistant with the backend named in `[model]`.
    pub fn from_config(config: &Config, catalog: Arc<dyn CatalogStore>) -> Result<Self> {
        if !config.model.is_enabled() {
            info!("Model provider disabled, every answer comes from the fallback engine");
        }
        let backend = create_backend(&config.model)?;
        Ok(Self::new(config, catalog, backend))
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    pub fn rate_bucket(&self) -> RateBucket {
        self.limiter.snapshot()
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// Rate gate plus retrying model call.
    async fn call_model(&self, turns: Vec<ChatTurn>, options: &CompletionOptions) -> Result<String, AssistError> {
        if !self.limiter.try_acquire() {
            info!(model = self.model_name(), "Rate limit reached, skipping model call");
            return Err(AssistError::RateLimited);
        }
        self.client.complete(turns, options).await
    }

    /// Catalog query where a store failure reads as "no products".
    async fn load(&self, filter: &CatalogFilter, purpose: &str) -> Vec<CatalogProduct> {
        match self.catalog.find(filter).await {
            Ok(products) => products,
            Err(e) => {
                warn!(purpose, error = %e, "Catalog query failed, continuing without products");
                Vec::new()
            }
        }
    }

    // ============ Chat ============

    fn validate_chat(&self, request: &ChatRequest) -> Result<(), AssistError> {
        if request.input.trim().is_empty() {
            return Err(AssistError::InvalidRequest(
                "Pertanyaan tidak boleh kosong".to_string(),
            ));
        }
        if request.input.chars().count() > self.chat_config.max_input_chars {
            return Err(AssistError::InvalidRequest(format!(
                "Pertanyaan tidak boleh lebih dari {} karakter",
                self.chat_config.max_input_chars
            )));
        }
        Ok(())
    }

    /// Answer one conversational turn.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, AssistError> {
        self.validate_chat(&request)?;

        let carousel = request.is_carousel();
        let topic = CarouselTopic::detect(&request.input);
        let key = carousel.then(|| format!("{}_carousel", normalize_query(&request.input)));
        if let Some(key) = &key {
            if let Some(hit) = self.chat_cache.get(key).await {
                info!(key = %key, "Chat cache hit");
                return Ok(hit);
            }
        }

        let catalog = self
            .load(
                &CatalogFilter::in_stock().limit(self.chat_config.catalog_context_limit),
                "chat context",
            )
            .await;
        let relevant = relevant_products(&request.input, &catalog);
        let greeting = prompts::greeting(request.timestamp.as_deref());
        let session = request.session_id.as_deref();

        let turns = self
            .conversations
            .update(session, |conv| {
                if conv.is_fresh() {
                    conv.push(ChatTurn::user(prompts::opening_question(greeting)));
                    conv.push(ChatTurn::model(prompts::GREETING_REPLY));
                    conv.push(ChatTurn::system(prompts::catalog_context(&catalog, false)));
                }
                match &request.product {
                    Some(product) => {
                        conv.push(ChatTurn::user(prompts::product_question(
                            &product.name,
                            &request.input,
                        )));
                        let known = catalog.iter().find(|p| {
                            p.name == product.name || product.id.as_deref() == Some(p.product_id.as_str())
                        });
                        if let Some(known) = known {
                            conv.push(ChatTurn::system(prompts::product_detail_context(known)));
                        }
                    }
                    None => {
                        conv.push(ChatTurn::user(request.input.clone()));
                        if carousel {
                            conv.push(ChatTurn::system(prompts::CAROUSEL_NOTICE));
                            if let Some(steering) = topic.steering() {
                                conv.push(ChatTurn::system(steering));
                            }
                        }
                        if !relevant.is_empty() {
                            conv.push(ChatTurn::system(prompts::relevant_products_context(&relevant)));
                        }
                    }
                }
                if conv.needs_refresh() {
                    conv.push(ChatTurn::system(prompts::catalog_context(&catalog, true)));
                }
            })
            .await;

        let options = CompletionOptions::for_chat(&self.model_config);
        let response = match self.call_model(turns, &options).await {
            Ok(raw) => self.answer_from_model(&request, topic, &raw, &catalog).await,
            Err(e) => {
                warn!(error = %e, carousel, "Chat model unavailable, answering from fallback");
                self.chat_fallback(&request, topic, &catalog).await
            }
        };

        self.conversations.record_reply(session, &response.response).await;

        match key {
            Some(key) => Ok(self.chat_cache.insert_if_absent(key, response).await),
            None => Ok(response),
        }
    }

    async fn answer_from_model(
        &self,
        request: &ChatRequest,
        topic: CarouselTopic,
        raw: &str,
        catalog: &[CatalogProduct],
    ) -> ChatResponse {
        let payload = extract::extract(raw);
        let reconciled = self.reconciler.reconcile(&payload.card, &payload.details).await;
        let mut products = reconciled.products;
        let mut fallback = false;
        let mut details_message = match reconciled.outcome {
            MatchOutcome::Matched => render_detail_blocks(&payload.details, &products),
            _ => render_reason_blocks(&products),
        };

        if products.is_empty() && request.is_carousel() {
            products = self.carousel_defaults(topic).await;
            if !products.is_empty() && payload.details.is_empty() {
                details_message = render_reason_blocks(&products);
            }
        }

        if products.is_empty() && reconciled.outcome == MatchOutcome::NoCatalogMatch {
            products = engine_products(&request.input, catalog);
            if !products.is_empty() {
                info!(count = products.len(), "Proposals unmatched, using scored catalog products");
                details_message = render_reason_blocks(&products);
                fallback = true;
            }
        }

        let category = if payload.card.category.trim().is_empty() {
            DEFAULT_CATEGORY.to_string()
        } else {
            payload.card.category
        };

        debug!(
            products = products.len(),
            degraded = payload.degraded,
            outcome = ?reconciled.outcome,
            "Chat answered by model"
        );

        ChatResponse {
            response: payload.clean_text,
            products,
            category,
            details_message,
            fallback,
        }
    }

    async fn chat_fallback(
        &self,
        request: &ChatRequest,
        topic: CarouselTopic,
        catalog: &[CatalogProduct],
    ) -> ChatResponse {
        let (text, products) = if request.is_carousel() {
            (topic.failure_text(), self.carousel_defaults(topic).await)
        } else {
            (APOLOGY, engine_products(&request.input, catalog))
        };
        ChatResponse {
            response: text.to_string(),
            details_message: render_reason_blocks(&products),
            products,
            category: DEFAULT_CATEGORY.to_string(),
            fallback: true,
        }
    }

    /// Canned catalog picks for carousel topics, with topic reasons.
    async fn carousel_defaults(&self, topic: CarouselTopic) -> Vec<RecommendedProduct> {
        let mut picked: Vec<CatalogProduct> = Vec::new();
        for filter in topic.default_filters() {
            picked.extend(self.load(&filter, "carousel defaults").await);
        }
        picked.truncate(MAX_CARDS);
        normalize(picked)
            .into_iter()
            .map(|p| {
                let reason = topic.auto_reason(&p);
                RecommendedProduct::with_reason(p, reason)
            })
            .collect()
    }

    // ============ Recommendations ============

    /// Recommend catalog products for a free-text, possibly subjective query.
    pub async fn recommend(&self, request: RecommendRequest) -> Result<RecommendResponse, AssistError> {
        let query = request.query.trim();
        if query.chars().count() < MIN_RECOMMEND_QUERY_CHARS {
            return Err(AssistError::InvalidRequest(format!(
                "Query must be at least {} characters",
                MIN_RECOMMEND_QUERY_CHARS
            )));
        }
        validate_limit(request.limit)?;
        let limit = request.limit.unwrap_or(DEFAULT_RECOMMEND_LIMIT).min(CATALOG_SAMPLE);
        let key = cache_key(query, limit, &[]);

        if let Some(mut hit) = self.recommend_cache.get(&key).await {
            info!(key = %key, "Recommendation cache hit");
            hit.cached = true;
            return Ok(hit);
        }

        let sample = self
            .load(
                &CatalogFilter::in_stock().best_selling().limit(CATALOG_SAMPLE),
                "recommendation sample",
            )
            .await;
        if sample.is_empty() {
            warn!(query, "No products available for recommendations");
            return Ok(RecommendResponse {
                query_analysis: fallback::query_analysis(&QueryTerms::parse(query)),
                products: Vec::new(),
                fallback: true,
                cached: false,
            });
        }

        let response = match self.ai_recommend(query, limit, &sample).await {
            Ok(response) => response,
            Err(e) => {
                warn!(query, error = %e, "AI recommendations failed, using fallback");
                let scored = fallback::recommend(query, &sample, limit);
                RecommendResponse {
                    query_analysis: scored.query_analysis,
                    products: scored.products,
                    fallback: true,
                    cached: false,
                }
            }
        };

        Ok(self.recommend_cache.insert_if_absent(key, response).await)
    }

    async fn ai_recommend(
        &self,
        query: &str,
        limit: usize,
        sample: &[CatalogProduct],
    ) -> Result<RecommendResponse, AssistError> {
        let prompt = prompts::recommendation_prompt(query, sample, PROMPT_SAMPLE);
        let options = CompletionOptions::for_prompt(&self.model_config);
        let raw = self.call_model(vec![ChatTurn::user(prompt)], &options).await?;
        let parsed: AiRecommendation = parse_json_reply(&raw)?;

        let ids: Vec<String> = parsed
            .recommended_products
            .iter()
            .filter_map(|p| p.id.clone())
            .collect();
        let by_id = self.reconciler.find_by_ids(&ids).await?;

        let names: Vec<String> = parsed
            .recommended_products
            .iter()
            .filter(|p| {
                p.id.as_deref()
                    .map(|id| !by_id.iter().any(|c| c.product_id == id))
                    .unwrap_or(true)
            })
            .filter_map(|p| p.name.clone())
            .collect();
        let by_name: Vec<CatalogProduct> = self
            .reconciler
            .find_by_names(&names)
            .await?
            .into_iter()
            .filter(CatalogProduct::is_in_stock)
            .collect();

        let mut products: Vec<RecommendedProduct> = Vec::new();
        for pick in &parsed.recommended_products {
            let found = pick
                .id
                .as_deref()
                .and_then(|id| by_id.iter().find(|c| c.product_id == id))
                .or_else(|| {
                    let name = pick.name.as_deref()?.trim();
                    let matcher = literal_matcher(name).ok()?;
                    by_name.iter().find(|c| matcher.is_match(&c.name))
                });
            let Some(found) = found else { continue };
            if products.iter().any(|p| p.product.product_id == found.product_id) {
                continue;
            }
            let reason = pick
                .reason
                .clone()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| fallback::GENERIC_REASON.to_string());
            products.push(RecommendedProduct::with_reason(found.clone(), reason));
        }

        if products.is_empty() {
            return Err(AssistError::NoCatalogMatch);
        }

        let terms = QueryTerms::parse(query);
        for product in sample {
            if products.len() >= limit {
                break;
            }
            if products.iter().any(|p| p.product.product_id == product.product_id) {
                continue;
            }
            products.push(RecommendedProduct::with_reason(
                product.clone(),
                fallback::reason_for(&terms, product),
            ));
        }
        products.truncate(limit);

        let query_analysis = if parsed.query_analysis.trim().is_empty() {
            fallback::query_analysis(&terms)
        } else {
            parsed.query_analysis
        };

        Ok(RecommendResponse {
            query_analysis,
            products,
            fallback: false,
            cached: false,
        })
    }

    // ============ Search assist ============

    /// Search suggestions, typo correction, and related terms.
    pub async fn suggest(&self, request: SuggestRequest) -> Result<SuggestResponse, AssistError> {
        let query = request.query.trim();
        if query.chars().count() < MIN_SUGGEST_QUERY_CHARS {
            return Err(AssistError::InvalidRequest(format!(
                "Query must be at least {} characters",
                MIN_SUGGEST_QUERY_CHARS
            )));
        }
        validate_limit(request.limit)?;
        let limit = request.limit.unwrap_or(DEFAULT_SUGGEST_LIMIT);
        let include_related = request.include_related_terms.unwrap_or(true);
        let key = cache_key(query, limit, &[include_related]);

        if let Some(mut hit) = self.suggest_cache.get(&key).await {
            info!(key = %key, "Suggestion cache hit");
            hit.cached = true;
            return Ok(hit);
        }

        let in_stock = match self.catalog.find(&CatalogFilter::in_stock()).await {
            Ok(products) => Some(products),
            Err(e) => {
                warn!(error = %e, "Catalog query failed during suggestions");
                None
            }
        };

        if let (Some(products), Ok(matcher)) = (&in_stock, literal_matcher(query)) {
            let direct: Vec<&CatalogProduct> = products
                .iter()
                .filter(|p| {
                    matcher.is_match(&p.name)
                        || matcher.is_match(&p.category)
                        || matcher.is_match(&p.description)
                })
                .take(DIRECT_MATCH_LIMIT)
                .collect();
            if direct.len() >= limit && !include_related {
                debug!(query, matches = direct.len(), "Answering suggestions from direct matches");
                let response = SuggestResponse {
                    suggestions: direct.iter().take(limit).map(|p| p.name.clone()).collect(),
                    ..SuggestResponse::default()
                };
                return Ok(self.suggest_cache.insert_if_absent(key, response).await);
            }
        }

        let sample = in_stock
            .as_ref()
            .map(|products| {
                CatalogFilter::in_stock()
                    .best_selling()
                    .limit(CATALOG_SAMPLE)
                    .apply(products.clone())
            })
            .unwrap_or_default();

        let response = match self.ai_suggest(query, limit, include_related, &sample).await {
            Ok(response) => response,
            Err(e) => {
                warn!(query, error = %e, "AI suggestions failed, using fallback");
                match in_stock {
                    Some(_) => {
                        let mut response = fallback::suggest(query, &sample, limit);
                        if !include_related {
                            response.related_terms.clear();
                        }
                        response
                    }
                    None => fallback::emergency_suggestions(query, include_related),
                }
            }
        };

        Ok(self.suggest_cache.insert_if_absent(key, response).await)
    }

    async fn ai_suggest(
        &self,
        query: &str,
        limit: usize,
        include_related: bool,
        sample: &[CatalogProduct],
    ) -> Result<SuggestResponse, AssistError> {
        let prompt = prompts::suggestion_prompt(query, sample, PROMPT_SAMPLE, limit, include_related);
        let options = CompletionOptions::for_prompt(&self.model_config);
        let raw = self.call_model(vec![ChatTurn::user(prompt)], &options).await?;
        let parsed: AiSuggestions = parse_json_reply(&raw)?;

        let suggestions: Vec<String> = parsed
            .suggestions
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if suggestions.is_empty() {
            return Err(AssistError::MalformedUpstreamResponse(
                "reply contained no suggestions".to_string(),
            ));
        }

        let corrected_query = parsed
            .corrected_query
            .map(|c| c.trim().to_string())
            .filter(|c| !c.eq_ignore_ascii_case(query))
            .unwrap_or_default();

        Ok(SuggestResponse {
            suggestions,
            corrected_query,
            related_terms: if include_related {
                parsed.related_terms
            } else {
                Vec::new()
            },
            ai_generated: true,
            fallback: false,
            cached: false,
        })
    }
}

/// Best term-matched products from the scoring engine, normalized.
fn engine_products(input: &str, catalog: &[CatalogProduct]) -> Vec<RecommendedProduct> {
    let matched: Vec<RecommendedProduct> = fallback::score(input, catalog, catalog.len())
        .into_iter()
        .filter(|s| s.term_matched)
        .take(MAX_CARDS)
        .map(|s| RecommendedProduct::with_reason(s.product, s.reason))
        .collect();
    normalize(matched)
}
