//! Vigil server library logic.
//!
//! Wires the core relay (bus listener → event log → live fan-out) to its
//! HTTP surface: history queries, the WebSocket live feed, health and
//! system stats, and the thin object-storage proxy.

pub mod api_logs;
pub mod api_storage;
pub mod api_system;
pub mod api_ws;
pub mod bus;
pub mod config;
pub mod fanout;
pub mod heartbeats;
pub mod listener;
pub mod retention;
pub mod storage;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use vigil_db::DbPool;

use crate::config::Config;
use crate::fanout::Fanout;
use crate::heartbeats::Heartbeats;
use crate::listener::ListenerStatus;
use crate::storage::BlobStore;

/// Maximum request body size (2 MiB) for the regular API surface.
/// Speaker sample uploads get their own, larger limit.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Body limit for speaker sample uploads (50 MiB).
const MAX_UPLOAD_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Application state shared across all request handlers and background
/// tasks. Created once at process start, torn down at process stop.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool backing the event log.
    pub pool: DbPool,
    /// Immutable startup configuration.
    pub config: Arc<Config>,
    /// Live viewer registry.
    pub fanout: Fanout,
    /// Bus connectivity flag maintained by the listener.
    pub listener_status: ListenerStatus,
    /// Satellite last-seen map maintained by the listener.
    pub heartbeats: Heartbeats,
    /// Object storage proxy client.
    pub blobs: Arc<BlobStore>,
    /// Process start time, for the uptime stat.
    pub started_at: Instant,
    /// Host metrics sampler. std Mutex intentionally: sampling never
    /// spans an `.await` point.
    pub system: Arc<Mutex<sysinfo::System>>,
}

impl AppState {
    /// Builds the process-wide state from configuration and an already
    /// migrated pool.
    pub fn new(config: Arc<Config>, pool: DbPool) -> Self {
        let blobs = Arc::new(BlobStore::new(
            &config.storage.endpoint,
            &config.storage.bucket,
            config.storage.bearer_token.clone(),
        ));
        Self {
            pool,
            config,
            fanout: Fanout::new(),
            listener_status: ListenerStatus::new(),
            heartbeats: Heartbeats::new(),
            blobs,
            started_at: Instant::now(),
            system: Arc::new(Mutex::new(sysinfo::System::new())),
        }
    }
}

/// Health check handler.
///
/// The only place listener connectivity is explicitly exposed: a
/// disconnected bus means no new live events, but history keeps serving
/// from the last-persisted state.
async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "bus_connected": state.listener_status.is_connected(),
        "bus_host": state.config.bus.host,
        "storage_endpoint": state.config.storage.endpoint,
        "storage_bucket": state.config.storage.bucket,
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    // Speaker sample uploads need a larger body limit than the rest of
    // the API.
    let upload_routes = Router::new()
        .route(
            "/api/speaker/upload",
            post(api_storage::upload_speaker_sample_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES));

    let router = Router::new()
        .route("/api/health", get(health))
        .route("/api/logs/history", get(api_logs::get_history_handler))
        .route("/ws/logs", get(api_ws::ws_logs_handler))
        .route(
            "/api/system/stats",
            get(api_system::get_system_stats_handler),
        )
        .route("/api/files", get(api_storage::get_files_handler))
        .route(
            "/api/files/stream/{*key}",
            get(api_storage::stream_file_handler),
        )
        .route(
            "/api/config/{file_id}",
            get(api_storage::read_config_handler).post(api_storage::write_config_handler),
        )
        .route(
            "/api/speaker/enroll",
            post(api_storage::enroll_speaker_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .merge(upload_routes);

    // Serve the built dashboard frontend if it exists.
    let client_dir = state.config.server.client_dir.clone();
    let router = if std::path::Path::new(&client_dir).join("index.html").exists() {
        tracing::info!(path = %client_dir, "serving dashboard static files");
        let index = format!("{client_dir}/index.html");
        router.fallback_service(ServeDir::new(&client_dir).fallback(ServeFile::new(index)))
    } else {
        tracing::info!(path = %client_dir, "client directory not found, skipping static file serving");
        router
    };

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
