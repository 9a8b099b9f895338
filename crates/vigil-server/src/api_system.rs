//! Host system metrics for the dashboard.

use crate::AppState;
use axum::{extract::Extension, Json};
use serde_json::{json, Value};
use std::sync::{Arc, PoisonError};
use sysinfo::Disks;

/// Handler for `GET /api/system/stats`.
///
/// Reports uptime, CPU, RAM and disk usage of the host plus the last-seen
/// heartbeat of every satellite device. CPU usage is measured between
/// successive calls, so the very first reading after startup is zero.
pub async fn get_system_stats_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let uptime_seconds = state.started_at.elapsed().as_secs();

    let (cpu_usage, ram_usage, ram_total) = {
        let mut sys = state
            .system
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let total = sys.total_memory();
        let used = sys.used_memory();
        let percent = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        (sys.global_cpu_usage(), percent, gigabytes(total))
    };

    // The root filesystem holds the database and recordings.
    let disks = Disks::new_with_refreshed_list();
    let root = disks
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.iter().next());
    let (disk_usage, disk_free) = match root {
        Some(disk) if disk.total_space() > 0 => {
            let total = disk.total_space();
            let free = disk.available_space();
            (
                (total - free) as f64 / total as f64 * 100.0,
                gigabytes(free),
            )
        }
        _ => (0.0, 0.0),
    };

    Json(json!({
        "uptime": uptime_seconds,
        "cpu": cpu_usage,
        "ram_usage": round2(ram_usage),
        "ram_total": ram_total,
        "disk_usage": round2(disk_usage),
        "disk_free": disk_free,
        "services": state.heartbeats.snapshot(),
    }))
}

fn gigabytes(bytes: u64) -> f64 {
    round2(bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
