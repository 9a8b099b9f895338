//! WebSocket live feed.
//!
//! `GET /ws/logs` upgrades to a push connection that receives every event
//! broadcast after connection time, as JSON frames `{id, time, topic,
//! payload}`. There is no automatic backfill; clients fetch
//! `/api/logs/history` themselves before or after connecting.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

/// Handler for `GET /ws/logs`.
pub async fn ws_logs_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-viewer connection task: forwards frames from the fan-out queue to
/// the socket until the viewer disconnects or a send fails. Either way
/// the viewer is unregistered on the way out, so a send failure is an
/// implicit disconnect.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (viewer_id, mut frames) = state.fanout.register().await;
    tracing::debug!(viewer_id, "live feed viewer connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = frames.recv() => {
                match frame {
                    Some(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    // Queue closed: shutdown or we were unregistered.
                    None => break,
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    // Viewers send nothing meaningful; pings and stray
                    // text are absorbed here to keep the connection alive.
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
        }
    }

    state.fanout.unregister(viewer_id).await;
    tracing::debug!(viewer_id, "live feed viewer disconnected");
}
