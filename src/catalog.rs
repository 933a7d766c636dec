//! Catalog store abstraction and implementations.
//!
//! The pipeline only reads the catalog, through the [`CatalogStore`] trait:
//! - **[`SqliteCatalog`]**: the `products`/`reviews` tables created by
//!   [`migrate`](crate::migrate), accessed through a sqlx pool.
//! - **[`MemoryCatalog`]**: a vector-backed store for tests and demos.
//!
//! Queries are described by a [`CatalogFilter`]. SQLite has no native regex
//! operator, so [`SqliteCatalog`] selects in-stock rows in insertion order
//! and applies the pattern, sort, and limit steps in process, exactly as
//! [`MemoryCatalog`] does.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use sqlx::{Row, SqlitePool};

use crate::error::AssistError;
use crate::models::{CatalogProduct, Review};

/// Compile a case-insensitive pattern.
pub fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Compile a case-insensitive substring matcher for literal text. Regex
/// metacharacters in `text` are escaped, so `"Jaket (Black)"` matches only
/// itself. Fails only when the text exceeds the regex size limit.
pub fn literal_matcher(text: &str) -> Result<Regex, regex::Error> {
    case_insensitive(&regex::escape(text))
}

/// Field filters understood by every catalog store.
///
/// A product matches when it satisfies the stock filter, ANY name pattern
/// (when name patterns are given), ANY category pattern (when given), and
/// ANY product id (when given). Sorting by units sold is descending and
/// stable; the limit applies last.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    pub in_stock: bool,
    pub name_patterns: Vec<Regex>,
    pub category_patterns: Vec<Regex>,
    pub product_ids: Vec<String>,
    pub sort_by_units_sold: bool,
    pub limit: Option<usize>,
}

impl CatalogFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_stock() -> Self {
        Self {
            in_stock: true,
            ..Self::default()
        }
    }

    pub fn names(mut self, patterns: Vec<Regex>) -> Self {
        self.name_patterns = patterns;
        self
    }

    pub fn categories(mut self, patterns: Vec<Regex>) -> Self {
        self.category_patterns = patterns;
        self
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.product_ids = ids;
        self
    }

    pub fn best_selling(mut self) -> Self {
        self.sort_by_units_sold = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, product: &CatalogProduct) -> bool {
        if self.in_stock && !product.is_in_stock() {
            return false;
        }
        if !self.name_patterns.is_empty()
            && !self.name_patterns.iter().any(|p| p.is_match(&product.name))
        {
            return false;
        }
        if !self.category_patterns.is_empty()
            && !self
                .category_patterns
                .iter()
                .any(|p| p.is_match(&product.category))
        {
            return false;
        }
        if !self.product_ids.is_empty() && !self.product_ids.contains(&product.product_id) {
            return false;
        }
        true
    }

    /// Filter, sort, and truncate a full product listing.
    pub fn apply(&self, products: Vec<CatalogProduct>) -> Vec<CatalogProduct> {
        let mut out: Vec<CatalogProduct> =
            products.into_iter().filter(|p| self.matches(p)).collect();
        if self.sort_by_units_sold {
            out.sort_by(|a, b| b.units_sold().cmp(&a.units_sold()));
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

/// Read access to the authoritative product catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find(&self, filter: &CatalogFilter) -> Result<Vec<CatalogProduct>, AssistError>;

    /// All reviews recorded against a product display name.
    async fn find_reviews(&self, product_name: &str) -> Result<Vec<Review>, AssistError>;
}

// ============ SQLite ============

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn product_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CatalogProduct, sqlx::Error> {
    Ok(CatalogProduct {
        product_id: row.try_get("product_id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        price: row.try_get("price")?,
        stock: row.try_get("stock")?,
        size: row.try_get("size")?,
        condition: row.try_get("item_condition")?,
        description: row.try_get("description")?,
        rating: row.try_get("rating")?,
        units_sold: row.try_get("units_sold")?,
    })
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn find(&self, filter: &CatalogFilter) -> Result<Vec<CatalogProduct>, AssistError> {
        let sql = if filter.in_stock {
            "SELECT product_id, name, category, price, stock, size, item_condition, description, rating, units_sold \
             FROM products WHERE stock > 0 ORDER BY rowid"
        } else {
            "SELECT product_id, name, category, price, stock, size, item_condition, description, rating, units_sold \
             FROM products ORDER BY rowid"
        };

        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        let products = rows
            .iter()
            .map(product_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(filter.apply(products))
    }

    async fn find_reviews(&self, product_name: &str) -> Result<Vec<Review>, AssistError> {
        let rows = sqlx::query("SELECT product_name, rating FROM reviews WHERE product_name = ?")
            .bind(product_name)
            .fetch_all(&self.pool)
            .await?;

        let reviews = rows
            .iter()
            .map(|row| {
                Ok(Review {
                    product_name: row.try_get("product_name")?,
                    rating: row.try_get("rating")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(reviews)
    }
}

// ============ In-memory ============

/// Vector-backed catalog. Products keep their insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    products: Vec<CatalogProduct>,
    reviews: Vec<Review>,
}

impl MemoryCatalog {
    pub fn new(products: Vec<CatalogProduct>) -> Self {
        Self {
            products,
            reviews: Vec::new(),
        }
    }

    pub fn with_reviews(mut self, reviews: Vec<Review>) -> Self {
        self.reviews = reviews;
        self
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn find(&self, filter: &CatalogFilter) -> Result<Vec<CatalogProduct>, AssistError> {
        Ok(filter.apply(self.products.clone()))
    }

    async fn find_reviews(&self, product_name: &str) -> Result<Vec<Review>, AssistError> {
        Ok(self
            .reviews
            .iter()
            .filter(|r| r.product_name == product_name)
            .cloned()
            .collect())
    }
}
