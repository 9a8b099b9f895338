//! End-to-end live feed test: one bus publish travels through the
//! listener, lands in the event log, and arrives at a connected
//! WebSocket viewer as the same frame history would serve.

use futures_util::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use vigil_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use vigil_server::bus::{BusMessage, BusSession, BusTransport, TransportError};
use vigil_server::config::Config;
use vigil_server::listener::{run_listener, ListenerDeps};
use vigil_server::{app, AppState};

/// A transport the test drives directly: the first connect succeeds and
/// yields a session fed from a channel, later connects park forever.
struct ScriptedTransport {
    rx: Mutex<Option<mpsc::UnboundedReceiver<BusMessage>>>,
}

struct ScriptedSession {
    rx: mpsc::UnboundedReceiver<BusMessage>,
}

impl BusTransport for ScriptedTransport {
    type Session = ScriptedSession;

    async fn connect(&self) -> Result<ScriptedSession, TransportError> {
        let rx = self.rx.lock().unwrap().take();
        match rx {
            Some(rx) => Ok(ScriptedSession { rx }),
            None => std::future::pending().await,
        }
    }
}

impl BusSession for ScriptedSession {
    async fn subscribe(&mut self, _patterns: &[&str]) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_message(&mut self) -> Result<BusMessage, TransportError> {
        match self.rx.recv().await {
            Some(message) => Ok(message),
            None => Err(TransportError::Session("scripted disconnect".to_string())),
        }
    }
}

fn migrated_pool(dir: &TempDir) -> DbPool {
    let path = dir.path().join("feed.db");
    let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
    let conn = pool.get().unwrap();
    run_migrations(&conn).unwrap();
    pool
}

#[tokio::test]
async fn published_event_reaches_viewer_and_history_agrees() {
    let dir = TempDir::new().unwrap();
    let pool = migrated_pool(&dir);
    let state = AppState::new(Arc::new(Config::default()), pool.clone());
    let fanout = state.fanout.clone();

    // Listener wired to the scripted transport.
    let (bus_tx, bus_rx) = mpsc::unbounded_channel();
    let transport = ScriptedTransport {
        rx: Mutex::new(Some(bus_rx)),
    };
    let deps = ListenerDeps {
        pool: pool.clone(),
        fanout: fanout.clone(),
        heartbeats: state.heartbeats.clone(),
        status: state.listener_status.clone(),
    };
    let status = state.listener_status.clone();
    let (_listener_shutdown, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(run_listener(
        transport,
        Duration::from_millis(10),
        deps,
        shutdown_rx,
    ));

    // HTTP server on an ephemeral port.
    let app = app(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Wait for the listener to come up, then attach a viewer and wait
    // until the fan-out actually holds it; the upgrade callback runs
    // after the client sees the handshake complete.
    wait_for(|| status.is_connected()).await;
    let ws_url = format!("ws://{addr}/ws/logs");
    let (mut ws_stream, _) = connect_async(ws_url).await.expect("failed to connect");
    timeout(Duration::from_secs(5), async {
        while fanout.viewer_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("viewer never registered");

    bus_tx
        .send(BusMessage {
            topic: "voice/wake".to_string(),
            payload: b"hey-assistant".to_vec(),
        })
        .unwrap();

    let msg = timeout(Duration::from_secs(5), ws_stream.next())
        .await
        .expect("no frame within timeout")
        .expect("stream ended")
        .expect("ws error");

    let frame: serde_json::Value = match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    };
    assert_eq!(frame["id"], 1);
    assert_eq!(frame["topic"], "voice/wake");
    assert_eq!(frame["payload"], "hey-assistant");
    let time = frame["time"].as_str().unwrap();
    assert_eq!(time.len(), 12);
    assert_eq!(&time[2..3], ":");

    // The persisted row serves the same frame through history.
    let events = vigil_log::recent_events(&pool.get().unwrap(), 1).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, 1);
    assert_eq!(events[0].topic, "voice/wake");
    assert_eq!(events[0].payload, "hey-assistant");
    let history_frame = serde_json::to_value(events[0].to_frame()).unwrap();
    assert_eq!(history_frame, frame);
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
