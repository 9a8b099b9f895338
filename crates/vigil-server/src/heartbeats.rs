//! Last-seen tracking for satellite devices.
//!
//! A process-scoped [`Heartbeats`] instance is created at startup and
//! injected into the listener (writer) and the system-stats handler
//! (reader). Any traffic on a satellite topic counts as a heartbeat.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use vigil_log::capture_timestamp;

/// Maps `satellite_<name>` to the ISO-8601 time a message from that
/// satellite was last seen on the bus.
#[derive(Clone, Default)]
pub struct Heartbeats {
    // std RwLock intentionally: all acquisitions are brief HashMap
    // operations that never span an `.await` point.
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl Heartbeats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a heartbeat if the topic belongs to a satellite device
    /// (`satellites/<name>/...` or `satellite/<name>/...`). Other topics
    /// are ignored.
    pub fn record_from_topic(&self, topic: &str) {
        let mut parts = topic.splitn(3, '/');
        if let (Some("satellite" | "satellites"), Some(name)) = (parts.next(), parts.next()) {
            if name.is_empty() {
                return;
            }
            self.inner
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(format!("satellite_{name}"), capture_timestamp());
        }
    }

    /// Snapshot of all known heartbeats.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
