//! Dashboard HTTP API.
//!
//! Serves the aggregated bead view and the dashboard config as JSON.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (town root, engine, version) |
//! | `GET`  | `/api/ready` | `gt ready --json` passthrough |
//! | `GET`  | `/api/status` | `gt status --json`, enriched with `rigPrefixes` |
//! | `GET`  | `/api/beads?status=&type=` | Beads from every rig, merged |
//! | `GET`  | `/api/bead/{id}` | One bead, routed by id prefix |
//! | `GET`  | `/api/config` | Current dashboard config |
//! | `POST` | `/api/config` | Partial config update |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "missing bead id" } }
//! ```
//!
//! Error codes: `bad_request` (400), `source_unavailable` (500), `internal` (500).
//! `/api/beads` never errors; rigs that fail are left out of the listing.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the dashboard page can
//! be opened from anywhere.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::aggregate::{Aggregator, QueryError};
use crate::config::{Config, ConfigStore, ConfigUpdate};
use crate::routes::rig_prefix_names;
use crate::tool::{GtCli, ListFilter};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Bead queries across the town's rigs.
    pub aggregator: Aggregator,
    /// Town-level `gt` queries.
    pub town: GtCli,
    /// Durable dashboard config.
    pub config: Arc<ConfigStore>,
}

/// Build the API router with CORS applied.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/ready", get(handle_ready))
        .route("/api/status", get(handle_status))
        .route("/api/beads", get(handle_beads))
        .route("/api/bead", get(handle_bead_missing_id))
        .route("/api/bead/", get(handle_bead_missing_id))
        .route("/api/bead/{id}", get(handle_bead_detail))
        .route("/api/config", get(handle_get_config).post(handle_post_config))
        .layer(cors)
        .with_state(state)
}

/// Bind to `bind_addr` and serve until Ctrl-C.
pub async fn run_server(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let town = state.aggregator.registry().town_root().to_path_buf();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(town = %town.display(), "beadboard listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn source_unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "source_unavailable",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            err @ QueryError::MissingId => bad_request(err.to_string()),
            QueryError::Source(e) => source_unavailable(e.to_string()),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    town: String,
    engine: &'static str,
    version: &'static str,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        town: state
            .aggregator
            .registry()
            .town_root()
            .display()
            .to_string(),
        engine: "rust",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET /api/ready, /api/status ============

async fn handle_ready(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let ready = state
        .town
        .ready()
        .await
        .map_err(|e| source_unavailable(e.to_string()))?;
    Ok(Json(ready))
}

/// `gt status` output with a `rigPrefixes` map added so the dashboard can
/// label beads by rig. Non-object output is passed through untouched.
async fn handle_status(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let status = state
        .town
        .status()
        .await
        .map_err(|e| source_unavailable(e.to_string()))?;

    match status {
        Value::Object(mut fields) => {
            let names = rig_prefix_names(state.aggregator.registry().town_root());
            let names = serde_json::to_value(names).map_err(|e| internal(e.to_string()))?;
            fields.insert("rigPrefixes".to_string(), names);
            Ok(Json(Value::Object(fields)))
        }
        other => Ok(Json(other)),
    }
}

// ============ GET /api/beads ============

/// Query parameters are taken as raw pairs so repeated or unknown keys never
/// turn into a rejection.
async fn handle_beads(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Json<Vec<Value>> {
    let filter = ListFilter::from_query_pairs(params);
    let beads = state.aggregator.list_all(&filter).await;
    tracing::debug!(count = beads.len(), ?filter, "listed beads");
    Json(beads)
}

// ============ GET /api/bead/{id} ============

async fn handle_bead_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.aggregator.detail(&id).await?))
}

async fn handle_bead_missing_id(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    Ok(Json(state.aggregator.detail("").await?))
}

// ============ /api/config ============

async fn handle_get_config(State(state): State<AppState>) -> Json<Config> {
    Json(state.config.load().await)
}

/// The body is parsed by hand so malformed payloads get the standard
/// `bad_request` error shape instead of Axum's plain-text rejection.
async fn handle_post_config(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Config>, AppError> {
    let update = ConfigUpdate::from_json(&body).map_err(|e| bad_request(e.to_string()))?;
    let merged = state
        .config
        .update(update)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;
    Ok(Json(merged))
}
