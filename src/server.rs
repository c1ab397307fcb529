//! HTTP surface for ingestion, retrieval, and profiles.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/ingest` | Replace an owner's documents |
//! | `GET`  | `/search?q=&owner=&topN=&allowPartial=` | Hybrid search |
//! | `DELETE` | `/owners/{owner}` | Remove an owner from both indexes |
//! | `GET`  | `/profiles` | List profiles |
//! | `GET` / `PUT` / `DELETE` | `/profiles/{email}` | Single profile |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "validation_error", "message": "validation failed: query is required" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `validation_error` | 400 |
//! | `not_found` | 404 |
//! | `cancelled` | 499 |
//! | `upstream_error`, `partial_write` | 502 |
//! | `internal` | 500 |
//!
//! Every request runs under its own cancellation token, cancelled when the
//! client disconnects and the handler future is dropped.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use profile_rag_core::models::{IndexKind, MergedResult, SearchHit};
use profile_rag_core::RagError;

use crate::config::Config;
use crate::context::ServiceContext;
use crate::db;
use crate::ingest::{ingest, FileReport, IngestFile, IngestRequest};
use crate::migrate;
use crate::profiles::{ProfileEntry, ProfileStore};
use crate::search::{search, SearchRequest};
use crate::writer::clear_owner;

#[derive(Clone)]
pub struct AppState {
    ctx: Arc<ServiceContext>,
    profiles: ProfileStore,
}

impl AppState {
    pub fn new(ctx: Arc<ServiceContext>, profiles: ProfileStore) -> Self {
        Self { ctx, profiles }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ingest", post(handle_ingest))
        .route("/search", get(handle_search))
        .route("/owners/{owner}", delete(handle_delete_owner))
        .route("/profiles", get(handle_list_profiles))
        .route(
            "/profiles/{email}",
            get(handle_get_profile)
                .put(handle_put_profile)
                .delete(handle_delete_profile),
        )
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn run_server(config: &Config, shutdown: CancellationToken) -> anyhow::Result<()> {
    let ctx = Arc::new(ServiceContext::from_config(config).await?);
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let app = router(AppState::new(ctx, ProfileStore::new(pool)));

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("HTTP server stopped");
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

#[derive(Debug)]
pub struct AppError {
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

impl From<RagError> for AppError {
    fn from(e: RagError) -> Self {
        let status = match &e {
            RagError::Validation(_) => StatusCode::BAD_REQUEST,
            RagError::NotFound(_) => StatusCode::NOT_FOUND,
            RagError::Cancelled(_) => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            RagError::Upstream { .. } | RagError::PartialWrite { .. } => StatusCode::BAD_GATEWAY,
        };
        AppError {
            status,
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

fn request_token() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
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

// ============ POST /ingest ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestBody {
    email: String,
    /// Defaults to the email.
    owner_id: Option<String>,
    profile: Option<Value>,
    #[serde(default)]
    files: Vec<IngestFile>,
}

#[derive(Serialize, Debug)]
struct IngestResponse {
    success: bool,
    results: Vec<FileReport>,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(body): Json<IngestBody>,
) -> Result<Json<IngestResponse>, AppError> {
    let request = IngestRequest {
        owner_id: body.owner_id.unwrap_or_else(|| body.email.clone()),
        email: body.email,
        files: body.files,
    };
    // The profile is only stored for a request that can be ingested.
    request.validate()?;
    if let Some(profile) = &body.profile {
        state
            .profiles
            .put(&request.email, profile)
            .await
            .map_err(internal)?;
    }

    let (token, _guard) = request_token();
    let results = ingest(&state.ctx, request, &token).await?;

    Ok(Json(IngestResponse {
        success: results.iter().all(FileReport::is_ok),
        results,
    }))
}

// ============ GET /search ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    #[serde(default)]
    q: String,
    owner: Option<String>,
    top_n: Option<usize>,
    allow_partial: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody {
    success: bool,
    results: Vec<MergedResult>,
    sparse_results: Vec<SearchHit>,
    dense_results: Vec<SearchHit>,
    degraded: Vec<IndexKind>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchBody>, AppError> {
    let request = SearchRequest {
        query: params.q,
        owner_id: params.owner,
        top_n: params.top_n,
        allow_partial: params.allow_partial,
    };
    let (token, _guard) = request_token();
    let resp = search(&state.ctx, &request, &token).await?;

    Ok(Json(SearchBody {
        success: true,
        results: resp.results,
        sparse_results: resp.sparse_results,
        dense_results: resp.dense_results,
        degraded: resp.degraded,
    }))
}

// ============ DELETE /owners/{owner} ============

async fn handle_delete_owner(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<StatusCode, AppError> {
    if owner.trim().is_empty() {
        return Err(RagError::validation("owner id is required").into());
    }
    let (token, _guard) = request_token();
    clear_owner(&state.ctx, owner.trim(), &token).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ /profiles ============

#[derive(Serialize)]
struct ProfileListResponse {
    profiles: Vec<ProfileEntry>,
}

async fn handle_list_profiles(
    State(state): State<AppState>,
) -> Result<Json<ProfileListResponse>, AppError> {
    let profiles = state.profiles.list().await.map_err(internal)?;
    Ok(Json(ProfileListResponse { profiles }))
}

async fn handle_get_profile(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<ProfileEntry>, AppError> {
    state
        .profiles
        .get(&email)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| RagError::NotFound(format!("no profile for {}", email)).into())
}

async fn handle_put_profile(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(record): Json<Value>,
) -> Result<Json<ProfileEntry>, AppError> {
    if !record.is_object() {
        return Err(RagError::validation("profile must be a JSON object").into());
    }
    let entry = state.profiles.put(&email, &record).await.map_err(internal)?;
    Ok(Json(entry))
}

async fn handle_delete_profile(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.profiles.delete(&email).await.map_err(internal)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(RagError::NotFound(format!("no profile for {}", email)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn state(tmp: &tempfile::TempDir) -> AppState {
        let mut config = Config::default();
        config.db.path = tmp.path().join("prag.sqlite");
        let pool = db::connect(&config).await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        AppState::new(Arc::new(ServiceContext::in_memory()), ProfileStore::new(pool))
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (RagError::validation("q"), 400),
            (RagError::NotFound("x".into()), 404),
            (RagError::Cancelled("search".into()), 499),
            (
                RagError::Upstream {
                    stage: "rerank".into(),
                    message: "503".into(),
                },
                502,
            ),
        ];
        for (err, status) in cases {
            let code = err.code();
            let app: AppError = err.into();
            assert_eq!(app.status.as_u16(), status);
            assert_eq!(app.code, code);
        }
    }

    #[tokio::test]
    async fn test_ingest_then_search_handlers() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state = state(&tmp).await;

        let body: IngestBody = serde_json::from_value(json!({
            "email": "ana@example.com",
            "profile": {"name": "Ana"},
            "files": [{"fileName": "resume.md", "content": "## Skills\nRust and TypeScript."}]
        }))
        .unwrap();
        let Json(resp) = handle_ingest(State(state.clone()), Json(body)).await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.results[0].chunks_processed, 1);
        assert!(state.profiles.get("ana@example.com").await.unwrap().is_some());

        let params = SearchParams {
            q: "rust".to_string(),
            owner: Some("ana@example.com".to_string()),
            top_n: None,
            allow_partial: None,
        };
        let Json(found) = handle_search(State(state), Query(params)).await.unwrap();
        assert!(found.success);
        assert_eq!(found.results.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_ingest_does_not_store_profile() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state = state(&tmp).await;

        let bodies = [
            json!({"email": "ana@example.com", "profile": {"name": "Ana"}, "files": []}),
            json!({
                "email": "ana@example.com",
                "ownerId": "  ",
                "profile": {"name": "Ana"},
                "files": [{"fileName": "resume.md", "content": "Rust"}]
            }),
        ];
        for body in bodies {
            let body: IngestBody = serde_json::from_value(body).unwrap();
            let err = handle_ingest(State(state.clone()), Json(body)).await.unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
            assert_eq!(err.code, "validation_error");
        }
        assert!(state.profiles.get("ana@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_profile_is_404() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state = state(&tmp).await;
        let err = handle_get_profile(State(state), Path("nobody@example.com".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
