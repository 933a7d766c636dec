//! # Catalog Assist
//!
//! A resilient AI shopping assistant over a fashion product catalog.
//!
//! A generative model proposes products and explanations; everything it says
//! is treated as an untrusted proposal and validated against the catalog
//! before it reaches a caller. Admission control, caching, retries and a
//! deterministic fallback engine keep every request answerable when the
//! model is slow, rate limited, or wrong.
//!
//! ## Architecture
//!
//! ```text
//!  request ─▶ cache ─▶ rate gate ─▶ model client ─▶ extractor ─▶ reconciler ─▶ response
//!                 │          │            │ (retry)                  │
//!                 │          └────────────┴────────▶ fallback ◀──────┘
//!                 └──────────────────────────────────────┴─────────────────▶ response
//!
//!                        ┌──────────┐       ┌──────────┐
//!                        │   CLI    │       │   HTTP   │
//!                        │ (assist) │       │  (axum)  │
//!                        └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! assist init                          # create the catalog schema
//! assist import ./catalog.json         # load products and reviews
//! assist recommend "celana jeans bagus"
//! assist suggest "koas"
//! assist serve                         # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Pipeline error taxonomy |
//! | [`models`] | Catalog records and request/response types |
//! | [`catalog`] | Catalog store trait, SQLite and in-memory stores |
//! | [`rate_limit`] | Token-bucket admission control |
//! | [`cache`] | Bounded result caches |
//! | [`model`] | Model backends and the retrying client |
//! | [`extract`] | Tagged-block extraction from model text |
//! | [`reconcile`] | Catalog reconciliation and cardinality rules |
//! | [`fallback`] | Deterministic scoring and suggestions |
//! | [`carousel`] | Guided storefront requests |
//! | [`history`] | Per-session conversation history |
//! | [`prompts`] | Prompt text |
//! | [`assistant`] | The pipeline: chat, recommend, suggest |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command implementations |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`import`] | Catalog snapshot import |

pub mod assistant;
pub mod cache;
pub mod carousel;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod history;
pub mod import;
pub mod migrate;
pub mod model;
pub mod models;
pub mod prompts;
pub mod rate_limit;
pub mod reconcile;
pub mod server;
