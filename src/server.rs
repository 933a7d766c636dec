//! HTTP server.
//!
//! Exposes the [`Assistant`] pipeline as a JSON API for the storefront.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Conversational assistant turn |
//! | `POST` | `/api/recommendations` | Products for a free-text query |
//! | `POST` | `/api/suggestions` | Search suggestions and typo correction |
//! | `GET`  | `/health` | Health check (returns version and rate bucket) |
//!
//! # Error Contract
//!
//! Only request validation fails. Such errors use the envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Query must be at least 3 characters" } }
//! ```
//!
//! Model and catalog failures never surface here; they degrade to fallback
//! answers with `"fallback": true`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the storefront can
//! call the API from the browser.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::assistant::Assistant;
use crate::catalog::SqliteCatalog;
use crate::config::Config;
use crate::db;
use crate::error::AssistError;
use crate::migrate::migrate_pool;
use crate::models::{
    ChatRequest, ChatResponse, RecommendRequest, RecommendResponse, SuggestRequest,
    SuggestResponse,
};
use crate::rate_limit::RateBucket;

#[derive(Clone)]
struct AppState {
    assistant: Arc<Assistant>,
}

/// Starts the HTTP server on `[server].bind` backed by the SQLite catalog.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    let catalog = Arc::new(SqliteCatalog::new(pool));
    let assistant = Arc::new(Assistant::from_config(config, catalog)?);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        model = assistant.model_name(),
        "Assistant server listening"
    );
    axum::serve(listener, router(assistant)).await?;

    Ok(())
}

/// Builds the router for an already constructed assistant.
pub fn router(assistant: Arc<Assistant>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/recommendations", post(handle_recommendations))
        .route("/api/suggestions", post(handle_suggestions))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { assistant })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (`"bad_request"` or `"internal"`).
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<AssistError> for AppError {
    fn from(err: AssistError) -> Self {
        match err {
            AssistError::InvalidRequest(message) => bad_request(message),
            other => {
                error!(error = %other, "Pipeline error escaped to HTTP layer");
                internal("Mohon maaf, terjadi kesalahan saat memproses permintaan Anda.")
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    model: String,
    rate_limit: RateBucket,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.assistant.model_name().to_string(),
        rate_limit: state.assistant.rate_bucket(),
    })
}

// ============ POST /api/* ============

async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = body?;
    Ok(Json(state.assistant.chat(request).await?))
}

async fn handle_recommendations(
    State(state): State<AppState>,
    body: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<Json<RecommendResponse>, AppError> {
    let Json(request) = body?;
    Ok(Json(state.assistant.recommend(request).await?))
}

async fn handle_suggestions(
    State(state): State<AppState>,
    body: Result<Json<SuggestRequest>, JsonRejection>,
) -> Result<Json<SuggestResponse>, AppError> {
    let Json(request) = body?;
    Ok(Json(state.assistant.suggest(request).await?))
}
