//! HTTP API server.
//!
//! Exposes the index build, its live status, search, freshness and the file
//! browsing passthrough as a JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/index/build` | Start a build; `202 {"runId"}`, `409` if one is running |
//! | `GET`  | `/index/status` | Current build status record |
//! | `GET`  | `/index/events` | Server-sent events of status records until the build ends |
//! | `GET`  | `/index/freshness` | `{status, message}` staleness of the index |
//! | `GET`  | `/search?q=&page=` | One page of search results |
//! | `GET`  | `/files?pageToken=&q=` | One page of the remote file listing |
//! | `GET`  | `/metadata` | `{lastBuildTime}` of the last completed build |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Credentials
//!
//! Every endpoint touching remote storage needs `Authorization: Bearer
//! <token>`. The token is only used for the request (or build) it came
//! with; the server keeps no session.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401),
//! `index_not_found` / `metadata_not_found` (404), `build_in_progress` (409),
//! `upstream_unavailable` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can call the API directly.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

use crate::builder::{build_index, BuildOptions};
use crate::config::{Config, StorageConfig};
use crate::drive::DriveClient;
use crate::error::LibraryError;
use crate::files::browse_query;
use crate::models::{BuildMetadata, FileListing, SearchPage};
use crate::search::search_documents;
use crate::staleness::{check_status, IndexStatusInfo};
use crate::status::{BuildStatus, BuildTracker};
use crate::store::IndexStore;
use crate::traits::FileStorage;

/// Opens a storage client for one caller's bearer token.
pub trait StorageConnector: Send + Sync {
    fn connect(&self, token: &str) -> Result<Arc<dyn FileStorage>, LibraryError>;
}

/// Connects to Google Drive with the configured endpoints.
pub struct DriveConnector {
    config: StorageConfig,
}

impl DriveConnector {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }
}

impl StorageConnector for DriveConnector {
    fn connect(&self, token: &str) -> Result<Arc<dyn FileStorage>, LibraryError> {
        Ok(Arc::new(DriveClient::new(&self.config, token)?))
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    tracker: Arc<BuildTracker>,
    connector: Arc<dyn StorageConnector>,
}

impl AppState {
    pub fn new(config: Config, connector: Arc<dyn StorageConnector>) -> Self {
        Self {
            config: Arc::new(config),
            tracker: Arc::new(BuildTracker::new()),
            connector,
        }
    }

    pub fn tracker(&self) -> &Arc<BuildTracker> {
        &self.tracker
    }

    fn connect(&self, headers: &HeaderMap) -> Result<Arc<dyn FileStorage>, AppError> {
        let token = bearer_token(headers).ok_or_else(|| {
            AppError::from(LibraryError::Unauthorized(
                "missing bearer token".to_string(),
            ))
        })?;
        Ok(self.connector.connect(token)?)
    }

    fn index_store(&self, storage: Arc<dyn FileStorage>) -> IndexStore {
        IndexStore::new(storage, self.config.storage.index_file_name.clone())
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// All routes, with CORS, bound to `state`.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/index/build", post(handle_build))
        .route("/index/status", get(handle_status))
        .route("/index/events", get(handle_events))
        .route("/index/freshness", get(handle_freshness))
        .route("/search", get(handle_search))
        .route("/files", get(handle_files))
        .route("/metadata", get(handle_metadata))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` against Google Drive.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let connector = Arc::new(DriveConnector::new(config.storage.clone()));
    let app = build_router(AppState::new(config.clone(), connector));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
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

impl From<LibraryError> for AppError {
    fn from(err: LibraryError) -> Self {
        let status = err.status_code();
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
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

// ============ POST /index/build ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildStarted {
    run_id: String,
}

/// Handler for `POST /index/build`.
///
/// Claims the build slot, then runs the build on a background task that
/// reports into the shared tracker. Returns as soon as the run is started.
async fn handle_build(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<BuildStarted>), AppError> {
    let storage = state.connect(&headers)?;
    let run_id = state.tracker.try_start()?;
    tracing::info!(run_id = %run_id, "build requested");

    let store = state.index_store(storage.clone());
    let opts = BuildOptions::from_config(&state.config);
    let tracker = state.tracker.clone();
    let worker = tokio::spawn(async move {
        // The outcome is already reported to the tracker.
        let _ = build_index(storage, &store, &opts, tracker.as_ref()).await;
    });

    let tracker = state.tracker.clone();
    tokio::spawn(async move {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "build task died");
            tracker.fail(format!("build task died: {}", e));
        }
    });

    Ok((StatusCode::ACCEPTED, Json(BuildStarted { run_id })))
}

// ============ GET /index/status ============

async fn handle_status(State(state): State<AppState>) -> Json<BuildStatus> {
    Json(state.tracker.snapshot())
}

// ============ GET /index/events ============

/// Handler for `GET /index/events`.
///
/// Sends the current status record first, then every change, and closes
/// after a `complete` or `error` record.
async fn handle_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let updates = state.tracker.subscribe();
    let initial = state.tracker.snapshot();
    let (tx, rx) = mpsc::channel::<BuildStatus>(16);

    tokio::spawn(forward_status(initial, updates, tx));

    let stream = ReceiverStream::new(rx).map(|status| {
        let event = match serde_json::to_string(&status) {
            Ok(json) => Event::default().event("status").data(json),
            Err(e) => Event::default().event("error").data(e.to_string()),
        };
        Ok::<Event, Infallible>(event)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Copy status records to one event stream until a terminal record is
/// sent or the client goes away.
async fn forward_status(
    initial: BuildStatus,
    mut updates: broadcast::Receiver<BuildStatus>,
    tx: mpsc::Sender<BuildStatus>,
) {
    let mut done = initial.status.is_terminal();
    if tx.send(initial).await.is_err() {
        return;
    }
    while !done {
        let received = tokio::select! {
            _ = tx.closed() => return,
            received = updates.recv() => received,
        };
        match received {
            Ok(status) => {
                done = status.status.is_terminal();
                if tx.send(status).await.is_err() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

// ============ GET /index/freshness ============

async fn handle_freshness(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<IndexStatusInfo>, AppError> {
    let storage = state.connect(&headers)?;
    let store = state.index_store(storage.clone());
    let info = check_status(
        storage.as_ref(),
        &store,
        state.config.storage.list_page_size,
    )
    .await?;
    Ok(Json(info))
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    page: Option<String>,
}

/// Handler for `GET /search`.
///
/// `page` defaults to 1; a value that is not a positive integer is treated
/// as 1.
async fn handle_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchPage>, AppError> {
    let query = params.q.unwrap_or_default();
    if query.is_empty() {
        return Err(bad_request("query parameter 'q' is required"));
    }
    let page = params
        .page
        .as_deref()
        .and_then(|p| p.trim().parse::<usize>().ok())
        .unwrap_or(1);

    let storage = state.connect(&headers)?;
    let store = state.index_store(storage);
    let out = search_documents(&store, &query, page, &state.config.search).await?;
    Ok(Json(out))
}

// ============ GET /files ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilesParams {
    page_token: Option<String>,
    q: Option<String>,
}

/// Handler for `GET /files`: newest first, one page per call.
async fn handle_files(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<FilesParams>,
) -> Result<Json<FileListing>, AppError> {
    let storage = state.connect(&headers)?;
    let query = browse_query(&state.config, params.q, params.page_token);
    Ok(Json(storage.list_files(&query).await?))
}

// ============ GET /metadata ============

async fn handle_metadata(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BuildMetadata>, AppError> {
    let storage = state.connect(&headers)?;
    let store = state.index_store(storage);
    Ok(Json(store.load_metadata().await?))
}
