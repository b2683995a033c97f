//! HTTP review surface.
//!
//! Exposes the field catalog and suggestion lifecycle as a JSON API for the
//! external admin UI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/fields` | List catalog fields (status, min_frequency, limit) |
//! | `GET`  | `/runs` | List discovery run logs |
//! | `GET`  | `/suggestions` | List suggestions (status, min_confidence, limit) |
//! | `POST` | `/suggestions/{id}/approve` | Approve, optionally with modifications |
//! | `POST` | `/suggestions/{id}/reject` | Reject |
//! | `POST` | `/suggestions/bulk-approve` | Approve all pending ≥ min_confidence |
//! | `GET`  | `/suggestions/export` | Export approved/modified extractors |
//! | `POST` | `/generate` | Run one scoring pass end-to-end |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "suggestion not found: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::catalog::{self, FieldFilter};
use crate::config::Config;
use crate::db;
use crate::export;
use crate::models::{AggregationType, FieldStatus, SuggestionStatus};
use crate::review::{self, Modifications, SuggestionFilter};
use crate::suggest;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
}

/// Start the review server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(&config.db).await?;

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/fields", get(handle_list_fields))
        .route("/runs", get(handle_list_runs))
        .route("/suggestions", get(handle_list_suggestions))
        .route("/suggestions/export", get(handle_export))
        .route("/suggestions/bulk-approve", post(handle_bulk_approve))
        .route("/suggestions/{id}/approve", post(handle_approve))
        .route("/suggestions/{id}/reject", post(handle_reject))
        .route("/generate", post(handle_generate))
        .layer(cors)
        .with_state(state);

    println!("Review server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
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

/// Map lifecycle errors onto HTTP statuses by message, so the store layer
/// can stay on plain anyhow errors.
fn classify_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();

    if msg.contains("not found") {
        AppError {
            status: StatusCode::NOT_FOUND,
            code: "not_found".to_string(),
            message: msg,
        }
    } else if msg.contains("already resolved") {
        AppError {
            status: StatusCode::CONFLICT,
            code: "conflict".to_string(),
            message: msg,
        }
    } else if msg.contains("must") || msg.contains("invalid") || msg.contains("required") {
        bad_request(msg)
    } else {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: msg,
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /fields ============

#[derive(Deserialize)]
struct FieldsQuery {
    status: Option<String>,
    min_frequency: Option<f64>,
    limit: Option<i64>,
}

async fn handle_list_fields(
    State(state): State<AppState>,
    Query(query): Query<FieldsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            FieldStatus::parse(s).ok_or_else(|| bad_request(format!("invalid field status: {}", s)))
        })
        .transpose()?;

    let fields = catalog::list_fields(
        &state.pool,
        &FieldFilter {
            status,
            min_frequency: query.min_frequency,
            limit: query.limit,
        },
    )
    .await
    .map_err(classify_error)?;

    Ok(Json(serde_json::json!({ "fields": fields })))
}

// ============ GET /runs ============

#[derive(Deserialize)]
struct RunsQuery {
    limit: Option<i64>,
}

async fn handle_list_runs(
    State(state): State<AppState>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let runs = catalog::list_runs(&state.pool, query.limit)
        .await
        .map_err(classify_error)?;
    Ok(Json(serde_json::json!({ "runs": runs })))
}

// ============ GET /suggestions ============

#[derive(Deserialize)]
struct SuggestionsQuery {
    status: Option<String>,
    min_confidence: Option<f64>,
    limit: Option<i64>,
}

async fn handle_list_suggestions(
    State(state): State<AppState>,
    Query(query): Query<SuggestionsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            SuggestionStatus::parse(s)
                .ok_or_else(|| bad_request(format!("invalid suggestion status: {}", s)))
        })
        .transpose()?;

    let suggestions = review::list_suggestions(
        &state.pool,
        &SuggestionFilter {
            status,
            min_confidence: query.min_confidence,
            limit: query.limit,
        },
    )
    .await
    .map_err(classify_error)?;

    Ok(Json(serde_json::json!({ "suggestions": suggestions })))
}

// ============ POST /suggestions/{id}/approve ============

#[derive(Deserialize, Default)]
struct ApproveBody {
    suggested_name: Option<String>,
    aggregation_type: Option<String>,
    conditions: Option<serde_json::Value>,
    description: Option<String>,
    reviewed_by: Option<String>,
}

async fn handle_approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ApproveBody>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let aggregation_type = body
        .aggregation_type
        .as_deref()
        .map(|s| {
            AggregationType::parse(s)
                .ok_or_else(|| bad_request(format!("invalid aggregation type: {}", s)))
        })
        .transpose()?;

    let mods = Modifications {
        suggested_name: body.suggested_name,
        aggregation_type,
        conditions: body.conditions,
        description: body.description,
    };

    let suggestion = review::approve(
        &state.pool,
        &id,
        Some(&mods),
        body.reviewed_by.as_deref(),
    )
    .await
    .map_err(classify_error)?;

    Ok(Json(serde_json::json!({ "suggestion": suggestion })))
}

// ============ POST /suggestions/{id}/reject ============

#[derive(Deserialize, Default)]
struct RejectBody {
    reviewed_by: Option<String>,
}

async fn handle_reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<RejectBody>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let suggestion = review::reject(&state.pool, &id, body.reviewed_by.as_deref())
        .await
        .map_err(classify_error)?;
    Ok(Json(serde_json::json!({ "suggestion": suggestion })))
}

// ============ POST /suggestions/bulk-approve ============

#[derive(Deserialize)]
struct BulkApproveBody {
    min_confidence: f64,
}

async fn handle_bulk_approve(
    State(state): State<AppState>,
    Json(body): Json<BulkApproveBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !(0.0..=1.0).contains(&body.min_confidence) {
        return Err(bad_request("min_confidence must be in [0.0, 1.0]"));
    }
    let outcome = review::bulk_approve(&state.pool, body.min_confidence)
        .await
        .map_err(classify_error)?;
    Ok(Json(serde_json::to_value(outcome).unwrap_or_default()))
}

// ============ GET /suggestions/export ============

async fn handle_export(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let extractors = export::export_extractors(&state.pool)
        .await
        .map_err(classify_error)?;
    Ok(Json(serde_json::json!({ "extractors": extractors })))
}

// ============ POST /generate ============

#[derive(Deserialize, Default)]
struct GenerateBody {
    min_frequency: Option<f64>,
    only_new: Option<bool>,
}

async fn handle_generate(
    State(state): State<AppState>,
    body: Option<Json<GenerateBody>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    if let Some(f) = body.min_frequency {
        if !(0.0..=1.0).contains(&f) {
            return Err(bad_request("min_frequency must be in [0.0, 1.0]"));
        }
    }

    let summary = suggest::run_generate(
        &state.pool,
        &state.config,
        body.min_frequency,
        body.only_new.unwrap_or(false),
    )
    .await
    .map_err(classify_error)?;

    Ok(Json(serde_json::to_value(summary).unwrap_or_default()))
}
