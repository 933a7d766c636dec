//! Core data models used throughout the assistant.
//!
//! Catalog records are owned by the [`catalog`](crate::catalog) store and are
//! only ever read; responses carry [`RecommendedProduct`] copies with derived
//! fields attached.

use serde::{Deserialize, Serialize};

/// A product record as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    pub product_id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub description: String,
    /// 0–5 when present.
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub units_sold: Option<i64>,
}

impl CatalogProduct {
    pub fn units_sold(&self) -> i64 {
        self.units_sold.unwrap_or(0)
    }

    pub fn is_in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// A single customer review; only the rating is consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub product_name: String,
    pub rating: f64,
}

/// A response-side copy of a catalog product with AI- or rule-authored
/// metadata attached. The stored record is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedProduct {
    #[serde(flatten)]
    pub product: CatalogProduct,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tips: Option<String>,
}

impl RecommendedProduct {
    pub fn new(product: CatalogProduct) -> Self {
        Self {
            product,
            reason: None,
            tips: None,
        }
    }

    pub fn with_reason(product: CatalogProduct, reason: impl Into<String>) -> Self {
        Self {
            product,
            reason: Some(reason.into()),
            tips: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.product.name
    }
}

/// Product the user is asking about from a product page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRef {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

/// Inbound conversational request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub input: String,
    /// `"carousel"` marks guided requests from the storefront carousel.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, alias = "productContext")]
    pub product: Option<ProductRef>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Client clock (RFC 3339), used to pick the greeting.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ChatRequest {
    pub fn is_carousel(&self) -> bool {
        self.source.as_deref() == Some("carousel")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub products: Vec<RecommendedProduct>,
    pub category: String,
    pub details_message: String,
    #[serde(default)]
    pub fallback: bool,
}

/// Inbound query-based recommendation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendResponse {
    pub query_analysis: String,
    pub products: Vec<RecommendedProduct>,
    pub fallback: bool,
    #[serde(default)]
    pub cached: bool,
}

/// Inbound search-assist request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub include_related_terms: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestResponse {
    pub suggestions: Vec<String>,
    pub corrected_query: String,
    pub related_terms: Vec<String>,
    pub ai_generated: bool,
    #[serde(default)]
    pub fallback: bool,
    #[serde(default)]
    pub cached: bool,
}
