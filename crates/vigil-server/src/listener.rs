//! Bus listener: the resilient subscriber that feeds the event log and
//! the live fan-out.
//!
//! The listener is a supervisory loop with two states. Disconnected: try
//! to open a session and subscribe; on failure wait the reconnect delay
//! and try again, forever. Connected: consume messages until the
//! transport errors, then fall back to Disconnected. Failure isolation is
//! two-level: a malformed message is logged and skipped
//! without touching the session, while a transport error resets the whole
//! session. A persistence failure does neither: the event is still
//! broadcast, just without an id.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use vigil_db::DbPool;
use vigil_log::{capture_timestamp, LogFrame};

use crate::bus::{BusMessage, BusSession, BusTransport, TransportError};
use crate::fanout::Fanout;
use crate::heartbeats::Heartbeats;

/// Topic patterns the listener subscribes to: general voice events plus
/// both spellings of the satellite-device prefix.
pub const TOPIC_PATTERNS: [&str; 3] = ["voice/#", "satellites/#", "satellite/#"];

/// Shared connectivity flag, read by the health endpoint.
#[derive(Clone, Default)]
pub struct ListenerStatus {
    connected: Arc<AtomicBool>,
}

impl ListenerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }
}

/// Everything the listener needs from the rest of the process, injected
/// at startup.
#[derive(Clone)]
pub struct ListenerDeps {
    pub pool: DbPool,
    pub fanout: Fanout,
    pub heartbeats: Heartbeats,
    pub status: ListenerStatus,
}

/// Runs the listener's supervisory loop. Every failure path re-enters
/// the reconnect loop; the only way out is the shutdown signal, which is
/// observed between messages so the append-and-broadcast pair for any
/// in-flight message always finishes before the task returns.
pub async fn run_listener<T: BusTransport>(
    transport: T,
    reconnect_delay: Duration,
    deps: ListenerDeps,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        match run_session(&transport, &deps, &mut shutdown).await {
            Ok(()) => {
                deps.status.set_connected(false);
                tracing::info!("bus listener stopped");
                return;
            }
            Err(e) => {
                deps.status.set_connected(false);
                tracing::warn!(
                    error = %e,
                    delay_secs = reconnect_delay.as_secs_f64(),
                    "bus session lost, reconnecting"
                );
            }
        }
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("bus listener stopped during reconnect backoff");
                return;
            }
            () = tokio::time::sleep(reconnect_delay) => {}
        }
    }
}

/// One connected session: subscribe, then consume messages until the
/// transport fails or shutdown is requested. `Ok(())` means shutdown.
///
/// The shutdown check races only the message wait, never
/// [`handle_message`]: once a message has been pulled off the session it
/// is fully persisted and broadcast before the signal is looked at again.
async fn run_session<T: BusTransport>(
    transport: &T,
    deps: &ListenerDeps,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), TransportError> {
    let mut session = tokio::select! {
        _ = shutdown.changed() => return Ok(()),
        connected = transport.connect() => connected?,
    };
    session.subscribe(&TOPIC_PATTERNS).await?;

    deps.status.set_connected(true);
    tracing::info!(patterns = ?TOPIC_PATTERNS, "connected to bus");

    loop {
        let message = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            message = session.next_message() => message?,
        };
        handle_message(deps, message).await;
    }
}

/// Processes one inbound message: decode, persist, broadcast.
///
/// Per-message failures stop here. An undecodable payload is dropped
/// before any side effect; a persistence failure downgrades the broadcast
/// frame to one without an id but never suppresses it.
async fn handle_message(deps: &ListenerDeps, message: BusMessage) {
    let BusMessage { topic, payload } = message;

    let payload = match String::from_utf8(payload) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(topic = %topic, error = %e, "skipping undecodable message");
            return;
        }
    };

    deps.heartbeats.record_from_topic(&topic);

    let pool = deps.pool.clone();
    let append_topic = topic.clone();
    let append_payload = payload.clone();
    let appended = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| e.to_string())?;
        vigil_log::append_event(&conn, &append_topic, &append_payload).map_err(|e| e.to_string())
    })
    .await;

    let frame = match appended {
        Ok(Ok(event)) => event.to_frame(),
        Ok(Err(e)) => {
            tracing::error!(topic = %topic, "failed to persist event, broadcasting anyway: {}", e);
            LogFrame::unpersisted(&capture_timestamp(), topic, payload)
        }
        Err(e) => {
            tracing::error!(topic = %topic, "append task join error, broadcasting anyway: {}", e);
            LogFrame::unpersisted(&capture_timestamp(), topic, payload)
        }
    };

    match serde_json::to_string(&frame) {
        Ok(json) => deps.fanout.broadcast(json).await,
        Err(e) => tracing::error!(error = %e, "failed to serialize live frame"),
    }
}
