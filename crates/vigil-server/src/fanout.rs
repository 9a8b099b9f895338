//! Live viewer registry and broadcast fan-out.
//!
//! One [`Fanout`] instance is created at process start, owned by
//! [`crate::AppState`], and shared between the bus listener (which
//! broadcasts) and the WebSocket handlers (which register viewers). Each
//! viewer gets a bounded mpsc queue; per-viewer delivery order therefore
//! matches broadcast order, and a slow or dead viewer can never block the
//! listener or the other viewers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Opaque handle identifying one registered viewer.
pub type ViewerId = u64;

/// Per-viewer queue depth. Beyond this the viewer is too slow and frames
/// are dropped for it rather than buffered without bound.
const VIEWER_QUEUE_DEPTH: usize = 256;

/// Tracks currently connected live viewers and fans frames out to them.
#[derive(Clone, Default)]
pub struct Fanout {
    viewers: Arc<RwLock<HashMap<ViewerId, mpsc::Sender<String>>>>,
    next_id: Arc<AtomicU64>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a new viewer. Returns its id and the receiving half of its
    /// frame queue; the caller forwards frames from the receiver to the
    /// viewer's transport.
    pub async fn register(&self) -> (ViewerId, mpsc::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(VIEWER_QUEUE_DEPTH);
        self.viewers.write().await.insert(id, tx);
        (id, rx)
    }

    /// Removes a viewer. Safe to call more than once for the same id.
    pub async fn unregister(&self, id: ViewerId) {
        self.viewers.write().await.remove(&id);
    }

    /// Number of currently registered viewers.
    pub async fn viewer_count(&self) -> usize {
        self.viewers.read().await.len()
    }

    /// Delivers a frame to every registered viewer.
    ///
    /// A failed delivery never raises to the caller: a viewer whose queue
    /// is gone (its connection task ended) is unregistered here, and a
    /// viewer whose queue is full has this frame dropped with a warning.
    pub async fn broadcast(&self, frame_json: String) {
        let mut stale: Vec<ViewerId> = Vec::new();

        {
            let viewers = self.viewers.read().await;
            for (id, tx) in viewers.iter() {
                match tx.try_send(frame_json.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(viewer_id = id, "dropping frame for slow viewer");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        stale.push(*id);
                    }
                }
            }
        }

        if !stale.is_empty() {
            let mut viewers = self.viewers.write().await;
            for id in stale {
                viewers.remove(&id);
                tracing::debug!(viewer_id = id, "unregistered dead viewer during broadcast");
            }
        }
    }

    /// Drops every viewer queue, ending all connection tasks. Called once
    /// during shutdown after in-flight broadcasts have finished.
    pub async fn close_all(&self) {
        self.viewers.write().await.clear();
    }
}
