//! Deterministic, AI-free answers.
//!
//! Used whenever the model is unavailable or untrustworthy: rate-limit
//! denial, exhausted retries, malformed replies, or reconciliation that
//! found nothing. Every function here is total.
//!
//! # Scoring
//!
//! The query is tokenized on whitespace and its tokens are classified
//! against two fixed vocabularies ([`CATEGORY_TERMS`] and
//! [`DESCRIPTIVE_TERMS`]). Each product scores:
//!
//! - +5 per category term found in its category, +3 per category term in
//!   its name
//! - +4 per descriptive term in its name, +2 per descriptive term in its
//!   description
//! - `min(3, units_sold / 50)` for popularity
//! - its rating, unchanged
//!
//! Products are ordered by descending score (ties keep catalog order).

use crate::models::{CatalogProduct, RecommendedProduct, SuggestResponse};

pub const DESCRIPTIVE_TERMS: &[&str] = &[
    "keren", "bagus", "cantik", "stylish", "trendi", "trendy", "modern", "casual", "elegant",
    "elegan", "mewah", "simple", "simpel", "unik", "vintage", "retro", "klasik", "minimalis",
    "populer", "terbaru", "hits", "terbaik", "favorit", "recommended", "murah", "mahal",
    "terjangkau", "branded", "original", "berkualitas", "premium",
];

pub const CATEGORY_TERMS: &[&str] = &[
    "baju", "kaos", "t-shirt", "kemeja", "celana", "jeans", "jaket", "hoodie", "sepatu", "tas",
    "topi", "dress", "rok",
];

pub const COMMON_TYPOS: &[(&str, &str)] = &[
    ("bsju", "baju"),
    ("koas", "kaos"),
    ("cealana", "celana"),
    ("celna", "celana"),
    ("jket", "jaket"),
    ("sptau", "sepatu"),
    ("seperti", "sepatu"),
    ("topu", "topi"),
];

pub const FASHION_TERMS: &[&str] = &[
    "baju", "kaos", "celana", "jaket", "sepatu", "tas", "topi", "kemeja", "jeans", "hoodie",
    "dress", "rok", "sweater",
];

pub const RELATED_TERMS: &[(&str, &[&str])] = &[
    ("baju", &["kaos", "t-shirt", "kemeja"]),
    ("kaos", &["baju", "t-shirt", "polo"]),
    ("celana", &["jeans", "chino", "cargo"]),
    ("jaket", &["hoodie", "sweater", "cardigan"]),
    ("sepatu", &["sneakers", "boots", "sandal"]),
    ("tas", &["backpack", "tote bag", "sling bag"]),
    ("topi", &["cap", "hat", "beanie"]),
];

pub const DEFAULT_RELATED_TERMS: &[&str] = &["baju", "celana", "sepatu", "tas"];

const SUGGESTION_QUALIFIERS: &[&str] =
    &["Pria", "Wanita", "Casual", "Formal", "Premium", "Terbaru", "Murah"];
const EMERGENCY_QUALIFIERS: &[&str] = &["Pria", "Wanita", "Premium", "Terbaru", "Terlaris"];
const PRODUCT_SUGGESTION_LIMIT: usize = 5;

pub const GENERIC_REASON: &str = "Produk yang mungkin sesuai dengan pencarian Anda.";

/// Query tokens split by vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTerms {
    pub categories: Vec<String>,
    pub descriptors: Vec<String>,
}

impl QueryTerms {
    pub fn parse(query: &str) -> Self {
        let mut terms = Self::default();
        for word in query.to_lowercase().split_whitespace() {
            if CATEGORY_TERMS.contains(&word) {
                terms.categories.push(word.to_string());
            }
            if DESCRIPTIVE_TERMS.contains(&word) {
                terms.descriptors.push(word.to_string());
            }
        }
        terms
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.descriptors.is_empty()
    }

    fn matches_category(&self, product: &CatalogProduct) -> bool {
        let category = product.category.to_lowercase();
        let name = product.name.to_lowercase();
        self.categories
            .iter()
            .any(|c| category.contains(c.as_str()) || name.contains(c.as_str()))
    }
}

/// "Pencarian untuk <categories> [dengan karakteristik: <descriptors>]".
pub fn query_analysis(terms: &QueryTerms) -> String {
    let mut analysis = String::from("Pencarian untuk ");
    if terms.categories.is_empty() {
        analysis.push_str("produk fashion");
    } else {
        analysis.push_str(&terms.categories.join(", "));
    }
    if !terms.descriptors.is_empty() {
        analysis.push_str(" dengan karakteristik: ");
        analysis.push_str(&terms.descriptors.join(", "));
    }
    analysis
}

/// Points earned from query terms alone.
pub fn term_score(terms: &QueryTerms, product: &CatalogProduct) -> f64 {
    let name = product.name.to_lowercase();
    let category = product.category.to_lowercase();
    let description = product.description.to_lowercase();
    let mut score = 0.0;
    for term in &terms.categories {
        if category.contains(term.as_str()) {
            score += 5.0;
        }
        if name.contains(term.as_str()) {
            score += 3.0;
        }
    }
    for term in &terms.descriptors {
        if name.contains(term.as_str()) {
            score += 4.0;
        }
        if description.contains(term.as_str()) {
            score += 2.0;
        }
    }
    score
}

pub fn popularity_score(product: &CatalogProduct) -> f64 {
    (product.units_sold().max(0) as f64 / 50.0).min(3.0)
}

pub fn score_product(terms: &QueryTerms, product: &CatalogProduct) -> f64 {
    term_score(terms, product) + popularity_score(product) + product.rating.unwrap_or(0.0)
}

/// Human-readable reason built from the clauses that apply, in order:
/// category match, descriptor, popularity, high rating.
pub fn reason_for(terms: &QueryTerms, product: &CatalogProduct) -> String {
    let mut clauses: Vec<String> = Vec::new();
    if terms.matches_category(product) {
        clauses.push("Sesuai dengan kategori yang Anda cari.".to_string());
    }
    if let Some(first) = terms.descriptors.first() {
        clauses.push(format!("Produk ini {} berdasarkan ulasan pembeli.", first));
    }
    if product.units_sold() > 50 {
        clauses.push(format!(
            "Telah terjual {} kali dan populer di kalangan pembeli.",
            product.units_sold()
        ));
    }
    if let Some(rating) = product.rating.filter(|r| *r >= 4.5) {
        clauses.push(format!("Memiliki rating tinggi {}.", rating));
    }
    if clauses.is_empty() {
        GENERIC_REASON.to_string()
    } else {
        clauses.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProduct {
    pub product: CatalogProduct,
    pub score: f64,
    /// True when any query term contributed to the score.
    pub term_matched: bool,
    pub reason: String,
}

/// Score every product and keep the best `limit`.
pub fn score(query: &str, products: &[CatalogProduct], limit: usize) -> Vec<ScoredProduct> {
    let terms = QueryTerms::parse(query);
    let mut scored: Vec<ScoredProduct> = products
        .iter()
        .map(|p| ScoredProduct {
            product: p.clone(),
            score: score_product(&terms, p),
            term_matched: term_score(&terms, p) > 0.0,
            reason: String::new(),
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);
    for entry in &mut scored {
        entry.reason = reason_for(&terms, &entry.product);
    }
    scored
}

/// Scored recommendations plus a query analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackRecommendation {
    pub query_analysis: String,
    pub products: Vec<RecommendedProduct>,
}

pub fn recommend(query: &str, products: &[CatalogProduct], limit: usize) -> FallbackRecommendation {
    FallbackRecommendation {
        query_analysis: query_analysis(&QueryTerms::parse(query)),
        products: score(query, products, limit)
            .into_iter()
            .map(|s| RecommendedProduct::with_reason(s.product, s.reason))
            .collect(),
    }
}

// ============ Search assist ============

fn typo_fix(word: &str) -> Option<&'static str> {
    COMMON_TYPOS
        .iter()
        .find(|(typo, _)| *typo == word)
        .map(|(_, fixed)| *fixed)
}

fn similar_term(word: &str) -> Option<&'static str> {
    if word.chars().count() < 3 {
        return None;
    }
    let prefix: String = word.chars().take(3).collect();
    FASHION_TERMS
        .iter()
        .find(|term| term.contains(prefix.as_str()))
        .copied()
}

/// Corrected query, or `None` when no correction changes it.
pub fn correct_query(query: &str) -> Option<String> {
    let lower = query.trim().to_lowercase();
    if let Some(fixed) = typo_fix(&lower) {
        return Some(fixed.to_string());
    }
    let words: Vec<&str> = lower.split_whitespace().collect();
    let corrected = words
        .iter()
        .map(|w| typo_fix(w).or_else(|| similar_term(w)).unwrap_or(w))
        .collect::<Vec<_>>()
        .join(" ");
    (corrected != words.join(" ")).then_some(corrected)
}

/// Related search terms for a query, or a generic fashion set.
pub fn related_terms(query: &str) -> Vec<String> {
    let lower = query.trim().to_lowercase();
    let terms = RELATED_TERMS
        .iter()
        .find(|(key, _)| lower.contains(key) || (!lower.is_empty() && key.contains(lower.as_str())))
        .map(|(_, terms)| *terms)
        .unwrap_or(DEFAULT_RELATED_TERMS);
    terms.iter().map(|t| t.to_string()).collect()
}

/// Rule-based suggestions: catalog names containing the main term, then
/// qualifier variants, deduplicated and cut to `limit`.
pub fn suggest(query: &str, products: &[CatalogProduct], limit: usize) -> SuggestResponse {
    let corrected = correct_query(query);
    let base = corrected
        .clone()
        .unwrap_or_else(|| query.trim().to_lowercase());
    let main_term = base.split_whitespace().next().unwrap_or_default().to_string();

    let mut suggestions: Vec<String> = Vec::new();
    let product_names = products
        .iter()
        .filter(|p| p.name.to_lowercase().contains(main_term.as_str()))
        .take(PRODUCT_SUGGESTION_LIMIT)
        .map(|p| p.name.clone());
    let qualified = SUGGESTION_QUALIFIERS
        .iter()
        .map(|q| format!("{} {}", main_term, q));
    for candidate in product_names.chain(qualified) {
        if !suggestions.contains(&candidate) {
            suggestions.push(candidate);
        }
    }
    suggestions.truncate(limit);

    SuggestResponse {
        suggestions,
        corrected_query: corrected.unwrap_or_default(),
        related_terms: related_terms(&base),
        ai_generated: false,
        fallback: true,
        cached: false,
    }
}

/// Last-resort suggestions that need no catalog at all.
pub fn emergency_suggestions(query: &str, include_related_terms: bool) -> SuggestResponse {
    let keyword = query.split_whitespace().last().unwrap_or_default();
    SuggestResponse {
        suggestions: EMERGENCY_QUALIFIERS
            .iter()
            .map(|q| format!("{} {}", keyword, q))
            .collect(),
        corrected_query: String::new(),
        related_terms: if include_related_terms {
            related_terms(query)
        } else {
            Vec::new()
        },
        ai_generated: false,
        fallback: true,
        cached: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, category: &str, sold: i64, rating: Option<f64>) -> CatalogProduct {
        CatalogProduct {
            product_id: name.to_lowercase().replace(' ', "-"),
            name: name.to_string(),
            category: category.to_string(),
            price: 120_000.0,
            stock: 5,
            size: "M".to_string(),
            condition: None,
            description: String::new(),
            rating,
            units_sold: Some(sold),
        }
    }

    #[test]
    fn test_query_terms_and_analysis() {
        let terms = QueryTerms::parse("Celana jeans BAGUS buat kuliah");
        assert_eq!(terms.categories, vec!["celana", "jeans"]);
        assert_eq!(terms.descriptors, vec!["bagus"]);
        assert_eq!(
            query_analysis(&terms),
            "Pencarian untuk celana, jeans dengan karakteristik: bagus"
        );
        assert_eq!(
            query_analysis(&QueryTerms::parse("hadiah ulang tahun")),
            "Pencarian untuk produk fashion"
        );
    }

    #[test]
    fn test_score_weights() {
        let terms = QueryTerms::parse("celana bagus");
        let mut p = product("Celana Bagus", "Celana", 100, Some(4.0));
        p.description = "Bahan bagus".to_string();
        // 5 + 3 + 4 + 2 + min(3, 2) + 4
        assert_eq!(score_product(&terms, &p), 20.0);
        let popular = product("Hoodie", "Jaket", 1000, None);
        assert_eq!(popularity_score(&popular), 3.0);
    }

    #[test]
    fn test_category_match_outranks_equal_popularity() {
        let products = vec![
            product("Kemeja Flanel", "Kemeja", 60, Some(4.0)),
            product("Denim Edwin", "Celana", 60, Some(4.0)),
        ];
        let ranked = score("celana jeans bagus", &products, 10);
        assert_eq!(ranked[0].product.name, "Denim Edwin");
        assert!(ranked[0].term_matched);
        assert!(!ranked[1].term_matched);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_reason_clauses_in_order() {
        let terms = QueryTerms::parse("celana keren");
        let p = product("Celana Chino", "Celana", 120, Some(4.7));
        assert_eq!(
            reason_for(&terms, &p),
            "Sesuai dengan kategori yang Anda cari. Produk ini keren berdasarkan ulasan pembeli. \
             Telah terjual 120 kali dan populer di kalangan pembeli. Memiliki rating tinggi 4.7."
        );
        let plain = product("Topi", "Aksesoris", 3, None);
        assert_eq!(reason_for(&QueryTerms::default(), &plain), GENERIC_REASON);
    }

    #[test]
    fn test_correct_query() {
        assert_eq!(correct_query("Cealana").as_deref(), Some("celana"));
        assert_eq!(correct_query("koas hitam").as_deref(), Some("kaos hitam"));
        assert_eq!(correct_query("jaktt").as_deref(), Some("jaket"));
        assert_eq!(correct_query("kaos"), None);
    }

    #[test]
    fn test_suggest_prefers_catalog_names() {
        let products = vec![
            product("Kaos Polos Hitam", "T-Shirt", 10, None),
            product("Celana Cargo", "Celana", 10, None),
        ];
        let out = suggest("koas", &products, 5);
        assert_eq!(out.corrected_query, "kaos");
        assert_eq!(
            out.suggestions,
            vec!["Kaos Polos Hitam", "kaos Pria", "kaos Wanita", "kaos Casual", "kaos Formal"]
        );
        assert_eq!(out.related_terms, vec!["baju", "t-shirt", "polo"]);
        assert!(!out.ai_generated);
    }

    #[test]
    fn test_related_terms_default() {
        assert_eq!(related_terms("gaun pesta"), vec!["baju", "celana", "sepatu", "tas"]);
        assert_eq!(related_terms("ta"), vec!["backpack", "tote bag", "sling bag"]);
    }

    #[test]
    fn test_emergency_suggestions() {
        let out = emergency_suggestions("sepatu lari", false);
        assert_eq!(out.suggestions[0], "lari Pria");
        assert_eq!(out.suggestions.len(), 5);
        assert!(out.related_terms.is_empty());
    }
}
