//! Validation and repair of model-proposed products.
//!
//! Model output is treated as untrusted proposals. Every proposed name is
//! resolved against the catalog with an escaped, case-insensitive substring
//! match; only real catalog records survive. The surviving list is then
//! forced into a layout-compatible size by [`normalize_cardinality`]:
//!
//! | matches | returned |
//! |---------|----------|
//! | 0, 1, 2, 4 | unchanged |
//! | 3 | first 2 |
//! | > 4 | first 4 |
//!
//! When nothing matches, the proposals' categories (explicit, or inferred
//! from "top"/"bottom" keywords in the names) are used to offer up to four
//! in-stock alternatives. Store errors degrade to "no match" and are logged.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::{literal_matcher, CatalogFilter, CatalogStore};
use crate::error::AssistError;
use crate::extract::{ProductCard, ProductDetail, ProposedProduct};
use crate::models::{CatalogProduct, RecommendedProduct};

pub const ALTERNATIVE_REASON: &str = "Produk alternatif yang tersedia di kategori ini";
pub const DEFAULT_RATING: f64 = 5.0;
const ALTERNATIVE_LIMIT: usize = 4;

/// Map a match count onto the allowed card counts {0, 1, 2, 4}.
pub fn normalize_cardinality(n: usize) -> usize {
    match n {
        0 | 1 | 2 | 4 => n,
        3 => 2,
        _ => 4,
    }
}

/// Truncate a list to its normalized cardinality, keeping the head.
pub fn normalize<T>(mut items: Vec<T>) -> Vec<T> {
    items.truncate(normalize_cardinality(items.len()));
    items
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Infer a catalog category from a proposed name.
pub fn infer_category(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    if lower.contains("kaos") || lower.contains("t-shirt") {
        Some("T-Shirt")
    } else if lower.contains("celana") || lower.contains("pants") {
        Some("Pants")
    } else {
        None
    }
}

/// Distinct categories for a set of proposals, in first-seen order.
pub fn proposal_categories(proposals: &[ProposedProduct]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for proposal in proposals {
        let category = proposal
            .category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string)
            .or_else(|| infer_category(&proposal.name).map(str::to_string));
        if let Some(category) = category {
            if !out.contains(&category) {
                out.push(category);
            }
        }
    }
    out
}

/// Attach model-authored details to products whose name matches exactly,
/// ignoring case. A non-empty detail description replaces the catalog one.
pub fn merge_details(products: Vec<CatalogProduct>, details: &[ProductDetail]) -> Vec<RecommendedProduct> {
    products
        .into_iter()
        .map(|mut product| {
            let lower = product.name.to_lowercase();
            match details.iter().find(|d| d.name.to_lowercase() == lower) {
                Some(detail) => {
                    if !detail.description.is_empty() {
                        product.description = detail.description.clone();
                    }
                    RecommendedProduct {
                        product,
                        reason: Some(detail.reason.clone()).filter(|r| !r.is_empty()),
                        tips: detail.tips.clone().filter(|t| !t.is_empty()),
                    }
                }
                None => RecommendedProduct::new(product),
            }
        })
        .collect()
}

/// How a reconciliation produced its products.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The model proposed nothing.
    NoProposals,
    /// At least one proposal resolved to a catalog record.
    Matched,
    /// Nothing resolved; products are category alternatives.
    CategoryAlternatives,
    /// Nothing resolved and no category could be inferred or queried.
    NoCatalogMatch,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub products: Vec<RecommendedProduct>,
    pub outcome: MatchOutcome,
}

pub struct ProductReconciler {
    catalog: Arc<dyn CatalogStore>,
}

impl ProductReconciler {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Catalog records whose name contains any of `names`, in catalog
    /// order, with missing ratings derived from reviews.
    pub async fn find_by_names(&self, names: &[String]) -> Result<Vec<CatalogProduct>, AssistError> {
        let mut patterns = Vec::with_capacity(names.len());
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            match literal_matcher(name) {
                Ok(re) => patterns.push(re),
                Err(e) => warn!(name, error = %e, "Skipping unmatchable product name"),
            }
        }
        if patterns.is_empty() {
            return Ok(Vec::new());
        }

        let found = self.catalog.find(&CatalogFilter::all().names(patterns)).await?;
        let mut rated = Vec::with_capacity(found.len());
        for product in found {
            rated.push(self.with_rating(product).await);
        }
        Ok(rated)
    }

    /// In-stock catalog records with the given ids, in catalog order.
    pub async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<CatalogProduct>, AssistError> {
        let ids: Vec<String> = ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.catalog.find(&CatalogFilter::in_stock().ids(ids)).await
    }

    /// Fill a missing rating with the review average (one decimal), or
    /// [`DEFAULT_RATING`] when there are no reviews.
    pub async fn with_rating(&self, mut product: CatalogProduct) -> CatalogProduct {
        if product.rating.is_some() {
            return product;
        }
        let reviews = match self.catalog.find_reviews(&product.name).await {
            Ok(reviews) => reviews,
            Err(e) => {
                warn!(product = %product.name, error = %e, "Review lookup failed, using default rating");
                Vec::new()
            }
        };
        product.rating = Some(if reviews.is_empty() {
            DEFAULT_RATING
        } else {
            let sum: f64 = reviews.iter().map(|r| r.rating).sum();
            round_one_decimal(sum / reviews.len() as f64)
        });
        product
    }

    /// Up to four in-stock products from any of `categories`.
    pub async fn category_alternatives(
        &self,
        categories: &[String],
    ) -> Result<Vec<RecommendedProduct>, AssistError> {
        let patterns = categories
            .iter()
            .filter_map(|c| literal_matcher(c).ok())
            .collect::<Vec<_>>();
        if patterns.is_empty() {
            return Ok(Vec::new());
        }
        let filter = CatalogFilter::in_stock()
            .categories(patterns)
            .limit(ALTERNATIVE_LIMIT);
        let products = self.catalog.find(&filter).await?;
        Ok(normalize(
            products
                .into_iter()
                .map(|p| RecommendedProduct::with_reason(p, ALTERNATIVE_REASON))
                .collect(),
        ))
    }

    /// Resolve a product card against the catalog.
    pub async fn reconcile(&self, card: &ProductCard, details: &[ProductDetail]) -> Reconciliation {
        if card.products.is_empty() {
            return Reconciliation {
                products: Vec::new(),
                outcome: MatchOutcome::NoProposals,
            };
        }

        let names: Vec<String> = card.products.iter().map(|p| p.name.clone()).collect();
        let matched = match self.find_by_names(&names).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Catalog lookup failed during reconciliation");
                Vec::new()
            }
        };
        debug!(proposed = names.len(), matched = matched.len(), "Reconciled product names");

        if !matched.is_empty() {
            return Reconciliation {
                products: merge_details(normalize(matched), details),
                outcome: MatchOutcome::Matched,
            };
        }

        let categories = proposal_categories(&card.products);
        if !categories.is_empty() {
            match self.category_alternatives(&categories).await {
                Ok(products) if !products.is_empty() => {
                    debug!(?categories, count = products.len(), "Using category alternatives");
                    return Reconciliation {
                        products,
                        outcome: MatchOutcome::CategoryAlternatives,
                    };
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Category alternative lookup failed"),
            }
        }

        warn!(error = %AssistError::NoCatalogMatch, proposed = names.len(), "No proposal resolved");
        Reconciliation {
            products: Vec::new(),
            outcome: MatchOutcome::NoCatalogMatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::models::Review;

    fn product(id: &str, name: &str, category: &str, stock: i64, rating: Option<f64>) -> CatalogProduct {
        CatalogProduct {
            product_id: id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            price: 150_000.0,
            stock,
            size: "L".to_string(),
            condition: None,
            description: format!("Deskripsi {}", name),
            rating,
            units_sold: Some(10),
        }
    }

    fn reconciler() -> ProductReconciler {
        let catalog = MemoryCatalog::new(vec![
            product("TS001", "Erigo T-Shirt Skye Black", "T-Shirt", 5, None),
            product("TS002", "Erigo T-Shirt Selkie Olive", "T-Shirt", 3, Some(4.2)),
            product("DP001", "Erigo Denim Pants Edwin", "Pants", 4, Some(4.8)),
            product("JK001", "Jaket (Black)", "Jaket", 2, Some(4.0)),
            product("TP001", "Topi Baseball", "Aksesoris", 9, None),
        ])
        .with_reviews(vec![
            Review { product_name: "Erigo T-Shirt Skye Black".into(), rating: 4.0 },
            Review { product_name: "Erigo T-Shirt Skye Black".into(), rating: 5.0 },
            Review { product_name: "Erigo T-Shirt Skye Black".into(), rating: 4.0 },
        ]);
        ProductReconciler::new(Arc::new(catalog))
    }

    fn card(names: &[&str]) -> ProductCard {
        ProductCard {
            products: names
                .iter()
                .map(|n| ProposedProduct { name: n.to_string(), ..Default::default() })
                .collect(),
            category: "Casual".into(),
        }
    }

    #[test]
    fn test_normalize_cardinality_law() {
        for n in 0..50 {
            let out = normalize_cardinality(n);
            assert!([0, 1, 2, 4].contains(&out));
        }
        assert_eq!(normalize_cardinality(3), 2);
        assert_eq!(normalize_cardinality(5), 4);
        assert_eq!(normalize_cardinality(4), 4);
        assert_eq!(normalize(vec![1, 2, 3]), vec![1, 2]);
    }

    #[test]
    fn test_infer_category() {
        assert_eq!(infer_category("Kaos Polos Putih"), Some("T-Shirt"));
        assert_eq!(infer_category("Celana Chino"), Some("Pants"));
        assert_eq!(infer_category("Sepatu Lari"), None);
    }

    #[tokio::test]
    async fn test_three_matches_become_two() {
        let r = reconciler();
        let out = r
            .reconcile(&card(&["Skye Black", "Selkie Olive", "Denim Pants Edwin"]), &[])
            .await;
        assert_eq!(out.outcome, MatchOutcome::Matched);
        let ids: Vec<&str> = out.products.iter().map(|p| p.product.product_id.as_str()).collect();
        assert_eq!(ids, vec!["TS001", "TS002"]);
    }

    #[tokio::test]
    async fn test_metacharacters_match_literally() {
        let out = reconciler().reconcile(&card(&["Jaket (Black)"]), &[]).await;
        assert_eq!(out.products.len(), 1);
        assert_eq!(out.products[0].name(), "Jaket (Black)");
    }

    #[tokio::test]
    async fn test_rating_from_reviews_and_default() {
        let r = reconciler();
        let found = r
            .find_by_names(&["skye".to_string(), "topi".to_string(), "edwin".to_string()])
            .await
            .unwrap();
        let ratings: Vec<Option<f64>> = found.iter().map(|p| p.rating).collect();
        assert_eq!(ratings, vec![Some(4.3), Some(4.8), Some(5.0)]);
    }

    #[tokio::test]
    async fn test_details_merged_case_insensitively() {
        let details = vec![ProductDetail {
            name: "erigo t-shirt skye black".into(),
            description: "Katun combed 30s".into(),
            reason: "Nyaman".into(),
            tips: Some("Cuci terbalik".into()),
        }];
        let out = reconciler().reconcile(&card(&["Skye Black"]), &details).await;
        let p = &out.products[0];
        assert_eq!(p.product.description, "Katun combed 30s");
        assert_eq!(p.reason.as_deref(), Some("Nyaman"));
        assert_eq!(p.tips.as_deref(), Some("Cuci terbalik"));
    }

    #[tokio::test]
    async fn test_category_alternatives_on_zero_matches() {
        let out = reconciler()
            .reconcile(&card(&["Kaos Oversize Putih", "Kaos Polo Navy"]), &[])
            .await;
        assert_eq!(out.outcome, MatchOutcome::CategoryAlternatives);
        assert_eq!(out.products.len(), 2);
        assert!(out
            .products
            .iter()
            .all(|p| p.reason.as_deref() == Some(ALTERNATIVE_REASON)));
    }

    #[tokio::test]
    async fn test_no_match_without_category() {
        let out = reconciler().reconcile(&card(&["Sepatu Lari Ultra"]), &[]).await;
        assert_eq!(out.outcome, MatchOutcome::NoCatalogMatch);
        assert!(out.products.is_empty());
    }

    #[tokio::test]
    async fn test_empty_card() {
        let out = reconciler().reconcile(&ProductCard::default(), &[]).await;
        assert_eq!(out.outcome, MatchOutcome::NoProposals);
    }
}
