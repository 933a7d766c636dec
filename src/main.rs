//! # Catalog Assist CLI (`assist`)
//!
//! ## Usage
//!
//! ```bash
//! assist --config ./config/assist.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `assist init` | Create the SQLite catalog and run schema migrations |
//! | `assist import <file>` | Load products and reviews from a JSON snapshot |
//! | `assist chat "<input>"` | One conversational turn |
//! | `assist recommend "<query>"` | Products for a free-text query |
//! | `assist suggest "<query>"` | Search suggestions and typo correction |
//! | `assist serve` | Start the HTTP API |
//!
//! Responses are printed as JSON on stdout. Logs go to stderr and are
//! filtered with `RUST_LOG` (default `catalog_assist=info,assist=info`).

use catalog_assist::{commands, config, migrate, server};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Catalog Assist CLI: a resilient AI shopping assistant over a product
/// catalog.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/assist.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "assist",
    about = "Catalog Assist: resilient AI product recommendations over a fashion catalog",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/assist.toml`. Database, model, rate limit,
    /// cache, chat, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/assist.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the catalog schema.
    ///
    /// Creates the SQLite database file with the `products` and `reviews`
    /// tables. Safe to run repeatedly.
    Init,

    /// Import a catalog snapshot.
    ///
    /// The file is JSON of the form `{"products": [...], "reviews": [...]}`.
    /// Products are upserted by `productId`; reviews replace earlier reviews
    /// of the same product.
    Import {
        /// Path to the snapshot file.
        file: PathBuf,
    },

    /// Ask the assistant one question.
    Chat {
        /// The user's message (at most `chat.max_input_chars` characters).
        input: String,

        /// Request source; `carousel` marks guided storefront prompts.
        #[arg(long)]
        source: Option<String>,

        /// Conversation session id. Omitted means the shared default session.
        #[arg(long)]
        session: Option<String>,
    },

    /// Recommend products for a free-text query.
    Recommend {
        /// Search query, at least 3 characters (e.g. "tas keren").
        query: String,

        /// Maximum number of products.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Suggest searches for a partial or misspelled query.
    Suggest {
        /// Search query, at least 2 characters.
        query: String,

        /// Maximum number of suggestions.
        #[arg(long)]
        limit: Option<usize>,

        /// Skip related-term expansion.
        #[arg(long)]
        no_related: bool,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_assist=info,assist=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file } => {
            commands::run_import(&cfg, &file).await?;
        }
        Commands::Chat {
            input,
            source,
            session,
        } => {
            commands::run_chat(&cfg, &input, source, session).await?;
        }
        Commands::Recommend { query, limit } => {
            commands::run_recommend(&cfg, &query, limit).await?;
        }
        Commands::Suggest {
            query,
            limit,
            no_related,
        } => {
            commands::run_suggest(&cfg, &query, limit, !no_related).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
