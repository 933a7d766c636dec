//! Catalog import from a JSON snapshot.
//!
//! Loads `{ "products": [...], "reviews": [...] }` into the SQLite catalog.
//! Products are upserted on `productId`. Reviews replace any earlier reviews
//! of the same product name. Used by the
//! `assist import` command to seed a catalog without the upstream store.

use anyhow::{Context, Result};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::path::Path;

use crate::models::{CatalogProduct, Review};

#[derive(Debug, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub products: Vec<CatalogProduct>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub products: usize,
    pub reviews: usize,
}

pub fn read_snapshot(path: &Path) -> Result<CatalogSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse catalog file: {}", path.display()))
}

pub async fn import_snapshot(pool: &SqlitePool, snapshot: &CatalogSnapshot) -> Result<ImportStats> {
    let mut tx = pool.begin().await?;

    for product in &snapshot.products {
        if product.product_id.trim().is_empty() || product.name.trim().is_empty() {
            anyhow::bail!("product entries need a non-empty productId and name");
        }
        sqlx::query(
            r#"
            INSERT INTO products (product_id, name, category, price, stock, size, item_condition, description, rating, units_sold)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(product_id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                price = excluded.price,
                stock = excluded.stock,
                size = excluded.size,
                item_condition = excluded.item_condition,
                description = excluded.description,
                rating = excluded.rating,
                units_sold = excluded.units_sold
            "#,
        )
        .bind(&product.product_id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.price)
        .bind(product.stock)
        .bind(&product.size)
        .bind(&product.condition)
        .bind(&product.description)
        .bind(product.rating)
        .bind(product.units_sold)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to upsert product {}", product.product_id))?;
    }

    let reviewed: BTreeSet<&str> = snapshot
        .reviews
        .iter()
        .map(|r| r.product_name.as_str())
        .collect();
    for name in reviewed {
        sqlx::query("DELETE FROM reviews WHERE product_name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to clear reviews for {}", name))?;
    }

    for review in &snapshot.reviews {
        sqlx::query("INSERT INTO reviews (product_name, rating) VALUES (?, ?)")
            .bind(&review.product_name)
            .bind(review.rating)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(ImportStats {
        products: snapshot.products.len(),
        reviews: snapshot.reviews.len(),
    })
}
