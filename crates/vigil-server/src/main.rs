//! Vigil server binary: the dashboard backend for a home voice-assistant
//! fleet.
//!
//! Starts the axum HTTP/WebSocket server, the resilient bus listener, and
//! the retention sweeper, with structured logging and graceful shutdown
//! on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use vigil_server::bus::MqttTransport;
use vigil_server::listener::{run_listener, ListenerDeps};
use vigil_server::retention::start_retention_task;
use vigil_server::{app, config, AppState};

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("VIGIL_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("cannot start without valid configuration");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // The database lives in a subdirectory by default; create it so the
    // first run does not fail on a missing path.
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .expect("failed to create database directory, check database.path in config");
        }
    }

    // Initialize database
    let pool = vigil_db::create_pool(
        &config.database.path,
        vigil_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool, check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied = vigil_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    let config = Arc::new(config);
    let state = AppState::new(config.clone(), pool.clone());

    // Start the bus listener's supervisory loop. It reconnects forever;
    // only the shutdown signal below stops it.
    let (listener_shutdown, listener_shutdown_rx) = tokio::sync::watch::channel(false);
    let transport = MqttTransport::new(config.bus.host.clone(), config.bus.port);
    let listener_task = tokio::spawn(run_listener(
        transport,
        Duration::from_secs(config.bus.reconnect_delay_secs),
        ListenerDeps {
            pool: pool.clone(),
            fanout: state.fanout.clone(),
            heartbeats: state.heartbeats.clone(),
            status: state.listener_status.clone(),
        },
        listener_shutdown_rx,
    ));

    // Start the retention sweeper, independent of listener state.
    let sweeper_task = tokio::spawn(start_retention_task(
        pool.clone(),
        config.retention.max_retained,
        Duration::from_secs(config.retention.sweep_interval_secs),
    ));

    let fanout = state.fanout.clone();

    // Build application
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting vigil server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address, is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Signal the listener and wait for it to drain: it checks the signal
    // only between messages, so the append-and-broadcast pair for any
    // in-flight message completes before the viewer queues are dropped.
    let _ = listener_shutdown.send(true);
    let _ = listener_task.await;
    sweeper_task.abort();
    fanout.close_all().await;

    tracing::info!("vigil server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
