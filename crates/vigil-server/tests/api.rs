use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use vigil_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use vigil_server::{app, config::Config, AppState};

// r2d2 hands each checkout its own `:memory:` database, so tests share
// state through a file-backed database in a temp dir.
fn migrated_pool(dir: &TempDir) -> DbPool {
    let path = dir.path().join("api.db");
    let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
    let conn = pool.get().unwrap();
    run_migrations(&conn).unwrap();
    pool
}

fn setup_app(pool: DbPool) -> axum::Router {
    let state = AppState::new(Arc::new(Config::default()), pool);
    app(state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_disconnected_bus_at_startup() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(migrated_pool(&dir));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["bus_connected"], false);
    assert_eq!(json["bus_host"], "localhost");
    assert_eq!(json["storage_bucket"], "voice-commands");
}

#[tokio::test]
async fn history_returns_recent_events_oldest_first() {
    let dir = TempDir::new().unwrap();
    let pool = migrated_pool(&dir);
    {
        let conn = pool.get().unwrap();
        vigil_log::append_event(&conn, "voice/wake", "hey-assistant").unwrap();
        vigil_log::append_event(&conn, "voice/transcript", "turn off the lights").unwrap();
        vigil_log::append_event(&conn, "satellites/kitchen/status", "online").unwrap();
    }
    let app = setup_app(pool);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/logs/history?limit=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let logs = json["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 2);
    // Newest two, returned oldest first.
    assert_eq!(logs[0]["id"], 2);
    assert_eq!(logs[0]["topic"], "voice/transcript");
    assert_eq!(logs[0]["payload"], "turn off the lights");
    assert_eq!(logs[1]["id"], 3);
    assert_eq!(logs[1]["topic"], "satellites/kitchen/status");

    // time is the intraday slice: HH:MM:SS.mmm
    let time = logs[0]["time"].as_str().unwrap();
    assert_eq!(time.len(), 12);
    assert_eq!(&time[2..3], ":");
    assert_eq!(&time[5..6], ":");
    assert_eq!(&time[8..9], ".");
}

#[tokio::test]
async fn history_on_empty_log_is_an_empty_list() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(migrated_pool(&dir));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/logs/history")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["logs"], serde_json::json!([]));
}

#[tokio::test]
async fn history_clamps_oversized_and_negative_limits() {
    let dir = TempDir::new().unwrap();
    let pool = migrated_pool(&dir);
    {
        let conn = pool.get().unwrap();
        for i in 0..5 {
            vigil_log::append_event(&conn, "voice/event", &format!("n{i}")).unwrap();
        }
    }
    let app = setup_app(pool);

    // Negative clamps to zero rows rather than erroring.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/logs/history?limit=-3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["logs"].as_array().unwrap().len(), 0);

    // Oversized clamps to the cap and just returns everything we have.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/logs/history?limit=999999")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["logs"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn unknown_config_file_id_is_a_bad_request() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(migrated_pool(&dir));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/config/not-a-real-id")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
