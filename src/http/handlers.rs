//! Built-in endpoints: root liveness and process memory statistics.

use std::sync::OnceLock;
use std::time::Instant;

use axum::Json;
use serde::Serialize;

static STARTED: OnceLock<Instant> = OnceLock::new();

/// Mark the process start; later calls keep the first instant.
pub fn mark_started() {
    STARTED.get_or_init(Instant::now);
}

fn uptime_secs() -> u64 {
    STARTED.get_or_init(Instant::now).elapsed().as_secs()
}

#[derive(Debug, Serialize)]
pub struct RootStatus {
    pub message: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// `GET /` unless replaced through the root-handler option.
pub async fn default_root() -> Json<RootStatus> {
    Json(RootStatus {
        message: "Service up and running",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: uptime_secs(),
    })
}

#[derive(Debug, Serialize)]
pub struct MemStats {
    /// Resident set size, `None` where the platform does not report it.
    pub physical_mem_bytes: Option<usize>,
    pub virtual_mem_bytes: Option<usize>,
    pub uptime_secs: u64,
}

/// `GET /memstats`, mounted behind basic authentication.
pub async fn memstats() -> Json<MemStats> {
    let (physical, virtual_mem) = match memory_stats::memory_stats() {
        Some(usage) => (Some(usage.physical_mem), Some(usage.virtual_mem)),
        None => (None, None),
    };
    Json(MemStats {
        physical_mem_bytes: physical,
        virtual_mem_bytes: virtual_mem,
        uptime_secs: uptime_secs(),
    })
}
