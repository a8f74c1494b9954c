//! HTTP surface. Handlers stay thin: decode, call into the engine or storage,
//! encode. Domain errors map onto status codes in one place (`ApiError`).

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use teller_core::{
    Account, AccountId, Record, RecordId, RecordPatch, RecordSnapshot, RulePayload,
    SuggestionBatch, SuggestionStatus, VendorRule,
};
use teller_engine as engine;
use teller_engine::{ApproveOverrides, EngineError};
use teller_storage as storage;
use teller_storage::{DbPool, RecordFilter, StoreError};

use crate::watch::{ImportLogEntry, WatcherHandle, WatcherStatus};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub watcher: WatcherHandle,
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::AccountNotFound(_)
            | EngineError::RecordNotFound(_)
            | EngineError::SuggestionNotFound(_)
            | EngineError::VendorNotFound(_) => ApiError::NotFound(err.to_string()),
            EngineError::FinalizedSuggestion { .. } => ApiError::Conflict(err.to_string()),
            EngineError::Statement(_) | EngineError::Rule(_) => {
                ApiError::BadRequest(err.to_string())
            }
            EngineError::Store(inner) => ApiError::Internal(inner.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                // Storage details stay in the log, not in the response body.
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ── Router ──────────────────────────────────────────────────────────────────

pub fn router(state: AppState, allowed_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/accounts", get(list_accounts).post(create_account))
        .route("/accounts/{id}/import", post(import))
        .route("/accounts/{id}/rules", get(list_rules))
        .route("/accounts/{id}/rules/rebuild", post(rebuild_rules))
        .route("/rules/{vendor_id}", put(set_rule))
        .route("/accounts/{id}/transactions", get(list_transactions))
        .route("/transactions/{id}", put(update_transaction))
        .route("/transactions/restore", post(restore_transactions))
        .route("/accounts/{id}/suggestions", get(list_suggestions))
        .route("/accounts/{id}/suggestions/approve-all", post(approve_all_suggestions))
        .route("/suggestions/{id}/approve", post(approve_suggestion))
        .route("/suggestions/{id}/dismiss", post(dismiss_suggestion))
        .route("/accounts/{id}/facets", get(facets))
        .route("/accounts/{id}/stats/summary", get(stats_summary))
        .route("/watcher/status", get(watcher_status))
        .route("/watcher/log", get(watcher_log))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(cors),
        )
        .with_state(state)
}

/// 404 for account-scoped reads, which otherwise would answer `[]` for any id.
async fn require_account(pool: &DbPool, id: i64) -> Result<AccountId, ApiError> {
    let account_id = AccountId(id);
    match storage::get_account(pool, account_id).await? {
        Some(_) => Ok(account_id),
        None => Err(ApiError::NotFound(format!("Account {account_id} not found"))),
    }
}

// ── Accounts ────────────────────────────────────────────────────────────────

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_accounts(State(state): State<AppState>) -> Result<Json<Vec<Account>>, ApiError> {
    Ok(Json(storage::get_all_accounts(&state.pool).await?))
}

#[derive(Deserialize)]
struct CreateAccount {
    name: String,
}

async fn create_account(
    State(state): State<AppState>,
    Json(body): Json<CreateAccount>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Account name must not be empty".to_string()));
    }
    // Name lookup is case-insensitive, same as the inbox folder match.
    if storage::get_account_by_name(&state.pool, name).await?.is_some() {
        return Err(ApiError::Conflict(format!("Account '{name}' already exists")));
    }
    let account = storage::create_account(&state.pool, name).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

// ── Import and rules ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ImportQuery {
    source: String,
}

async fn import(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ImportQuery>,
    body: Bytes,
) -> Result<Json<engine::ImportOutcome>, ApiError> {
    let outcome =
        engine::import_statement(&state.pool, AccountId(id), &body, &query.source).await?;
    Ok(Json(outcome))
}

async fn list_rules(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<VendorRule>>, ApiError> {
    let account_id = require_account(&state.pool, id).await?;
    Ok(Json(storage::vendors_for_account(&state.pool, account_id).await?))
}

async fn rebuild_rules(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<engine::RebuildOutcome>, ApiError> {
    Ok(Json(engine::rebuild_rules(&state.pool, AccountId(id)).await?))
}

async fn set_rule(
    State(state): State<AppState>,
    Path(vendor_id): Path<i64>,
    Json(payload): Json<RulePayload>,
) -> Result<Json<VendorRule>, ApiError> {
    Ok(Json(engine::set_rule(&state.pool, vendor_id, payload).await?))
}

// ── Transactions ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct TransactionQuery {
    cleaned: Option<bool>,
    vendor: Option<String>,
    category: Option<String>,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_transactions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let account_id = require_account(&state.pool, id).await?;
    let filter = RecordFilter {
        cleaned: query.cleaned,
        vendor: query.vendor,
        category: query.category,
        date_from: query.date_from,
        date_to: query.date_to,
        limit: query.limit,
        offset: query.offset,
    };
    Ok(Json(storage::list_records(&state.pool, account_id, &filter).await?))
}

async fn update_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<RecordPatch>,
) -> Result<Json<Record>, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::BadRequest("Update provides no fields".to_string()));
    }
    let record = engine::update_record(&state.pool, &RecordId(id), patch).await?;
    Ok(Json(record))
}

async fn restore_transactions(
    State(state): State<AppState>,
    Json(snapshots): Json<Vec<RecordSnapshot>>,
) -> Result<Json<engine::RestoreOutcome>, ApiError> {
    Ok(Json(engine::restore_records(&state.pool, &snapshots).await?))
}

// ── Suggestions ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SuggestionQuery {
    status: Option<SuggestionStatus>,
}

async fn list_suggestions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<SuggestionQuery>,
) -> Result<Json<Vec<SuggestionBatch>>, ApiError> {
    let account_id = require_account(&state.pool, id).await?;
    Ok(Json(storage::list_suggestions(&state.pool, account_id, query.status).await?))
}

async fn approve_suggestion(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<ApproveOverrides>>,
) -> Result<Json<SuggestionBatch>, ApiError> {
    let overrides = body.map(|Json(o)| o).unwrap_or_default();
    Ok(Json(engine::approve(&state.pool, id, overrides).await?))
}

async fn dismiss_suggestion(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuggestionBatch>, ApiError> {
    Ok(Json(engine::dismiss(&state.pool, id).await?))
}

async fn approve_all_suggestions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<engine::ApproveAllOutcome>, ApiError> {
    Ok(Json(engine::approve_all(&state.pool, AccountId(id)).await?))
}

// ── Facets, stats, watcher ──────────────────────────────────────────────────

async fn facets(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<storage::Facets>, ApiError> {
    let account_id = require_account(&state.pool, id).await?;
    Ok(Json(storage::facets(&state.pool, account_id).await?))
}

async fn stats_summary(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<storage::Summary>, ApiError> {
    let account_id = require_account(&state.pool, id).await?;
    Ok(Json(storage::stats_summary(&state.pool, account_id).await?))
}

async fn watcher_status(State(state): State<AppState>) -> Json<WatcherStatus> {
    Json(state.watcher.status().await)
}

#[derive(Deserialize)]
struct LogQuery {
    limit: Option<usize>,
}

async fn watcher_log(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Json<Vec<ImportLogEntry>> {
    Json(state.watcher.entries(query.limit.unwrap_or(20)).await)
}
