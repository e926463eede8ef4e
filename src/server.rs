//! HTTP API and dashboard host.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/software` | Filtered, sorted, paginated software reviews |
//! | `GET`    | `/agg/stats` | Average rating, total, verified share |
//! | `GET`    | `/agg/ratings-distribution` | Count per rating |
//! | `GET`    | `/agg/reviews-per-year` | Count per UTC year |
//! | `POST`   | `/upload-csv/{kind}` | Multipart CSV import (`file` field) |
//! | `DELETE` | `/clear/{kind}` | Delete every record of a kind |
//! | `GET`    | `/data` | Users, products and populated reviews |
//! | `GET`    | `/analysis/critical-reviews` | Reviews containing the critical marker |
//! | `GET`/`POST` | `/users`, `/products`, `/reviews` | List / create one record |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! Any other path is served from `[server].static_dir` when configured.
//!
//! Errors render as `{"error": "...", "details": "..."}`; see
//! [`crate::error::ApiError`].
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the dashboard can be
//! hosted elsewhere.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::analysis;
use crate::config::{Config, ServerConfig};
use crate::error::{ApiError, ImportError};
use crate::ingest;
use crate::models::RecordKind;
use crate::query::{build_list_query, ListParams};
use crate::reports;
use crate::store::{self, Store};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

/// Build the application router. Separate from [`run_server`] so tests can
/// drive it without a socket.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/software", get(list_software))
        .route("/agg/stats", get(handle_stats))
        .route("/agg/ratings-distribution", get(handle_ratings_distribution))
        .route("/agg/reviews-per-year", get(handle_reviews_per_year))
        .route("/upload-csv/{kind}", post(handle_upload))
        .route("/clear/{kind}", delete(handle_clear))
        .route("/data", get(handle_data))
        .route("/analysis/critical-reviews", get(handle_critical_reviews))
        .route("/users", get(list_users).post(create_user))
        .route("/products", get(list_products).post(create_product))
        .route("/reviews", get(list_reviews).post(create_review))
        .route("/health", get(handle_health));

    if let Some(dir) = &server.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(server.max_upload_bytes()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the configured store and serve until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = store::open(config).await?;
    let app = router(AppState::new(store.clone()), &config.server);

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    tracing::info!(
        bind = %bind_addr,
        backend = ?config.store.backend,
        static_dir = ?config.server.static_dir,
        "server started"
    );
    println!("reviewdesk listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

fn parse_kind(raw: &str) -> Result<RecordKind, ApiError> {
    RecordKind::from_name(raw).ok_or_else(|| ApiError::UnknownKind(raw.to_string()))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET /software ============

#[derive(Serialize)]
struct ListResponse {
    docs: Vec<Value>,
    total: u64,
    page: i64,
    limit: i64,
}

/// Query pairs are taken raw so that malformed values fall back to defaults
/// instead of rejecting the request.
async fn list_software(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ListResponse>, ApiError> {
    let query = build_list_query(&ListParams::from_pairs(pairs));
    let store = state.store.as_ref();

    let (docs, total) = tokio::try_join!(
        store.find(
            RecordKind::Software,
            &query.filter,
            query.sort,
            Some(query.window())
        ),
        store.count(RecordKind::Software, &query.filter),
    )
    .map_err(|e| ApiError::query("Failed to fetch software reviews.", e))?;

    Ok(Json(ListResponse {
        docs,
        total,
        page: query.page,
        limit: query.limit,
    }))
}

// ============ /agg/* ============

async fn handle_stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let stats = reports::summary_stats(state.store.as_ref())
        .await
        .map_err(|e| ApiError::query("Aggregation failed.", e))?;

    Ok(match stats {
        Some(stats) => Json(stats).into_response(),
        None => Json(json!({})).into_response(),
    })
}

async fn handle_ratings_distribution(
    State(state): State<AppState>,
) -> Result<Json<Vec<store::Bucket>>, ApiError> {
    reports::ratings_distribution(state.store.as_ref())
        .await
        .map(Json)
        .map_err(|e| ApiError::query("Failed to compute ratings distribution.", e))
}

async fn handle_reviews_per_year(
    State(state): State<AppState>,
) -> Result<Json<Vec<store::Bucket>>, ApiError> {
    reports::reviews_per_year(state.store.as_ref())
        .await
        .map(Json)
        .map_err(|e| ApiError::query("Failed to compute yearly distribution.", e))
}

// ============ POST /upload-csv/{kind} ============

#[derive(Serialize)]
struct ImportResponse {
    message: String,
    inserted: u64,
}

async fn handle_upload(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImportResponse>, ApiError> {
    let kind = parse_kind(&kind)?;

    let bytes = read_upload(multipart)
        .await
        .map_err(|e| ApiError::import(kind, e))?;

    let inserted = ingest::import_csv(state.store.as_ref(), kind, &bytes)
        .await
        .map_err(|e| ApiError::import(kind, e))?;

    Ok(Json(ImportResponse {
        message: format!("Imported {} {} successfully.", inserted, kind.label()),
        inserted,
    }))
}

/// Bytes of the multipart field named `file`.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Vec<u8>, ImportError> {
    let mut multipart = multipart.map_err(|e| ImportError::Unreadable(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ImportError::Unreadable(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ImportError::Unreadable(e.body_text()))?;
        return Ok(bytes.to_vec());
    }

    Err(ImportError::MissingFile)
}

// ============ DELETE /clear/{kind} ============

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_clear(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let kind = parse_kind(&kind)?;

    let deleted = state
        .store
        .delete_all(kind)
        .await
        .map_err(|e| ApiError::query("Failed to clear data.", e))?;

    tracing::info!(%kind, deleted, "cleared collection");
    Ok(Json(MessageResponse {
        message: format!("Deleted {} {}.", deleted, kind.label()),
    }))
}

// ============ GET /data, /analysis/critical-reviews ============

async fn handle_data(
    State(state): State<AppState>,
) -> Result<Json<analysis::DataDump>, ApiError> {
    analysis::data_dump(state.store.as_ref())
        .await
        .map(Json)
        .map_err(|e| ApiError::query("Failed to load data.", e))
}

async fn handle_critical_reviews(
    State(state): State<AppState>,
) -> Result<Json<analysis::CriticalReport>, ApiError> {
    analysis::critical_reviews(state.store.as_ref())
        .await
        .map(Json)
        .map_err(|e| ApiError::query("Failed to analyse reviews.", e))
}

// ============ /users, /products, /reviews ============

async fn create(
    store: &dyn Store,
    kind: RecordKind,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    let Value::Object(fields) = body else {
        return Err(ApiError::Validation(
            "Request body must be a JSON object".to_string(),
        ));
    };

    let doc = kind
        .cast(fields)
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    store
        .insert_many(kind, vec![doc.clone()])
        .await
        .map_err(|e| ApiError::Validation(format!("{:#}", e)))?;

    Ok((StatusCode::CREATED, Json(doc)))
}

async fn list(store: &dyn Store, kind: RecordKind) -> Result<Json<Vec<Value>>, ApiError> {
    analysis::list_all(store, kind)
        .await
        .map(Json)
        .map_err(|e| ApiError::query(format!("Failed to fetch {}.", kind.label()), e))
}

async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    create(state.store.as_ref(), RecordKind::User, payload).await
}

async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    create(state.store.as_ref(), RecordKind::Product, payload).await
}

async fn create_review(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    create(state.store.as_ref(), RecordKind::Review, payload).await
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<Value>>, ApiError> {
    list(state.store.as_ref(), RecordKind::User).await
}

async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Value>>, ApiError> {
    list(state.store.as_ref(), RecordKind::Product).await
}

/// Reviews with `userId`/`productId` replaced by the referenced records.
async fn list_reviews(State(state): State<AppState>) -> Result<Json<Vec<Value>>, ApiError> {
    analysis::populated_reviews(state.store.as_ref())
        .await
        .map(Json)
        .map_err(|e| ApiError::query("Failed to fetch reviews.", e))
}
