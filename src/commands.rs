//! Command implementations behind the `assist` CLI.
//!
//! Each command opens the configured catalog, runs one pipeline operation,
//! and prints the response as pretty JSON on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::assistant::Assistant;
use crate::catalog::SqliteCatalog;
use crate::config::Config;
use crate::db;
use crate::import::{import_snapshot, read_snapshot};
use crate::migrate::migrate_pool;
use crate::models::{ChatRequest, RecommendRequest, SuggestRequest};

async fn open_assistant(config: &Config) -> Result<Assistant> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    Assistant::from_config(config, Arc::new(SqliteCatalog::new(pool)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize response")?;
    println!("{}", text);
    Ok(())
}

/// Load a catalog snapshot file into the database.
pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let snapshot = read_snapshot(path)?;
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    let stats = import_snapshot(&pool, &snapshot).await?;
    pool.close().await;
    println!(
        "Imported {} products and {} reviews from {}",
        stats.products,
        stats.reviews,
        path.display()
    );
    Ok(())
}

pub async fn run_chat(
    config: &Config,
    input: &str,
    source: Option<String>,
    session: Option<String>,
) -> Result<()> {
    let assistant = open_assistant(config).await?;
    let response = assistant
        .chat(ChatRequest {
            input: input.to_string(),
            source,
            session_id: session,
            ..ChatRequest::default()
        })
        .await?;
    print_json(&response)
}

pub async fn run_recommend(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let assistant = open_assistant(config).await?;
    let response = assistant
        .recommend(RecommendRequest {
            query: query.to_string(),
            limit,
        })
        .await?;
    print_json(&response)
}

pub async fn run_suggest(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    include_related_terms: bool,
) -> Result<()> {
    let assistant = open_assistant(config).await?;
    let response = assistant
        .suggest(SuggestRequest {
            query: query.to_string(),
            limit,
            include_related_terms: Some(include_related_terms),
        })
        .await?;
    print_json(&response)
}
