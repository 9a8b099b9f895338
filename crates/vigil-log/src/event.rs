//! Event types and the wire shape pushed to live viewers.

use serde::{Deserialize, Serialize};

/// One persisted bus event, as stored in the `events` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Row id, assigned by the store at append time. Strictly increasing
    /// in arrival order and unique for the lifetime of the database file.
    pub id: i64,

    /// ISO-8601 capture time, assigned by the listener at receipt
    /// (not by the bus).
    pub timestamp: String,

    /// The bus topic the message arrived on.
    pub topic: String,

    /// Decoded message body. Opaque to the log.
    pub payload: String,
}

impl LogEvent {
    /// Converts this event into the JSON shape viewers receive.
    pub fn to_frame(&self) -> LogFrame {
        LogFrame {
            id: Some(self.id),
            time: time_of_day(&self.timestamp),
            topic: self.topic.clone(),
            payload: self.payload.clone(),
        }
    }
}

/// The JSON-shaped message pushed over the live feed and returned by the
/// history API: `{id, time, topic, payload}`.
///
/// `id` is absent when persistence failed and the frame was synthesized
/// for best-effort delivery. Viewers must treat such frames as
/// non-addressable (they cannot be looked up in history).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub time: String,
    pub topic: String,
    pub payload: String,
}

impl LogFrame {
    /// Builds a frame for an event that could not be persisted. Carries no
    /// id; the capture timestamp is still the listener's receipt time.
    pub fn unpersisted(timestamp: &str, topic: String, payload: String) -> Self {
        Self {
            id: None,
            time: time_of_day(timestamp),
            topic,
            payload,
        }
    }
}

/// Returns the current local time as an ISO-8601 string with microsecond
/// precision, e.g. `2026-08-30T14:03:27.501223`.
pub fn capture_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Extracts the clock-time-of-day component (`HH:MM:SS.mmm`) from an
/// ISO-8601 timestamp for display. Falls back to the full string if the
/// timestamp has no date/time separator.
pub fn time_of_day(timestamp: &str) -> String {
    match timestamp.split_once('T') {
        Some((_, time)) => time.chars().take(12).collect(),
        None => timestamp.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_of_day_trims_to_milliseconds() {
        assert_eq!(
            time_of_day("2026-08-30T14:03:27.501223"),
            "14:03:27.501"
        );
    }

    #[test]
    fn time_of_day_passes_through_unseparated_values() {
        assert_eq!(time_of_day("14:03:27"), "14:03:27");
    }

    #[test]
    fn unpersisted_frame_serializes_without_id() {
        let frame = LogFrame::unpersisted(
            "2026-08-30T14:03:27.501223",
            "voice/wake".to_string(),
            "hey-assistant".to_string(),
        );
        let json = serde_json::to_value(&frame).unwrap();
        assert!(json.get("id").is_none(), "id must be omitted, not null");
        assert_eq!(json["time"], "14:03:27.501");
    }

    #[test]
    fn capture_timestamp_has_a_date_time_separator() {
        let ts = capture_timestamp();
        assert!(ts.contains('T'), "unexpected timestamp shape: {ts}");
    }
}
