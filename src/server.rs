//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/search` | One page of hits for `q` |
//! | `POST` | `/index/batch` | Apply ADD/DELETE operations |
//! | `POST` | `/index/drop-refs` | Remove refs across a repository |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "refs must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500). A batch in which
//! some operations failed answers 500 with the full [`BatchSummary`], whose
//! `errors` list the failed operations.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use blobdex_core::batch::{BatchReport, OperationStatus};
use blobdex_core::git::GitRepoReader;
use blobdex_core::search::{SearchFilter, SearchQuery};
use blobdex_core::store::IndexStore;
use blobdex_core::{FileIndexOperation, IndexError, Indexer, RepoScope, SearchResult};

use crate::config::Config;
use crate::indexer;

/// Build the router over any store and git reader.
pub fn router<S, G>(indexer: Arc<Indexer<S, G>>) -> Router
where
    S: IndexStore + 'static,
    G: GitRepoReader + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", get(handle_search::<S, G>))
        .route("/index/batch", post(handle_batch::<S, G>))
        .route("/index/drop-refs", post(handle_drop_refs::<S, G>))
        .layer(cors)
        .with_state(indexer)
}

/// Serve the API on `[server].bind` until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let indexer = Arc::new(indexer::open(config).await?);
    let app = router(indexer);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "listening");
    println!("bdx server listening on http://{}", config.server.bind);
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

pub enum AppError {
    BadRequest(String),
    Internal(String),
    Partial(BatchSummary),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, "bad_request", m),
            AppError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", m),
            AppError::Partial(summary) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(summary)).into_response();
            }
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::PartialBatch(report) => AppError::Partial(BatchSummary::from(&report)),
            other => {
                error!(error = %other, "index operation failed");
                AppError::Internal(other.to_string())
            }
        }
    }
}

// ============ Batch summary ============

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationError {
    pub index: usize,
    pub doc: String,
    pub message: String,
}

/// Counts per outcome, plus every failure.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub operations: usize,
    pub created: usize,
    pub merged: usize,
    pub unchanged: usize,
    pub pruned: usize,
    pub deleted: usize,
    pub missing: usize,
    pub failed: usize,
    pub errors: Vec<OperationError>,
}

/// `err` and its sources, joined with `: `.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl From<&BatchReport> for BatchSummary {
    fn from(report: &BatchReport) -> Self {
        let errors: Vec<OperationError> = report
            .failed()
            .filter_map(|r| {
                r.outcome.as_ref().err().map(|e| OperationError {
                    index: r.index,
                    doc: r.doc.to_string(),
                    message: error_chain(e),
                })
            })
            .collect();

        BatchSummary {
            operations: report.len(),
            created: report.count(OperationStatus::Created),
            merged: report.count(OperationStatus::Merged),
            unchanged: report.count(OperationStatus::Unchanged),
            pruned: report.count(OperationStatus::Pruned),
            deleted: report.count(OperationStatus::Deleted),
            missing: report.count(OperationStatus::Missing),
            failed: errors.len(),
            errors,
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

// ============ GET /search ============

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub repository: Option<String>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub ext: Option<String>,
}

impl SearchParams {
    pub fn into_query(self) -> SearchQuery {
        SearchQuery::new(self.q)
            .with_page(self.page.unwrap_or(1))
            .with_limit(self.limit.unwrap_or(0))
            .with_filter(SearchFilter {
                organization: self.organization,
                project: self.project,
                repository: self.repository,
                reference: self.reference,
                ext: self.ext,
            })
    }
}

async fn handle_search<S: IndexStore + 'static, G: GitRepoReader + 'static>(
    State(indexer): State<Arc<Indexer<S, G>>>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResult> {
    Json(indexer.search_query(&params.into_query()).await)
}

// ============ POST /index/batch ============

async fn handle_batch<S: IndexStore + 'static, G: GitRepoReader + 'static>(
    State(indexer): State<Arc<Indexer<S, G>>>,
    body: Result<Json<Vec<FileIndexOperation>>, JsonRejection>,
) -> Result<Json<BatchSummary>, AppError> {
    let Json(operations) = body?;
    let report = indexer.batch_file_index(operations).await?;
    Ok(Json(BatchSummary::from(&report)))
}

// ============ POST /index/drop-refs ============

#[derive(Debug, Deserialize)]
pub struct DropRefsRequest {
    pub organization: String,
    pub project: String,
    pub repository: String,
    pub refs: Vec<String>,
}

async fn handle_drop_refs<S: IndexStore + 'static, G: GitRepoReader + 'static>(
    State(indexer): State<Arc<Indexer<S, G>>>,
    body: Result<Json<DropRefsRequest>, JsonRejection>,
) -> Result<Json<BatchSummary>, AppError> {
    let Json(req) = body?;
    if req.refs.is_empty() {
        return Err(AppError::BadRequest("refs must not be empty".to_string()));
    }
    let scope = RepoScope::new(&req.organization, &req.project, &req.repository);
    let report = indexer.delete_index_by_refs(&scope, &req.refs).await?;
    Ok(Json(BatchSummary::from(&report)))
}
