//! Health endpoint payload.

use serde::Serialize;
use utoipa::ToSchema;

/// Liveness report with registry counters.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving.
    pub status: String,
    /// Number of live sessions.
    pub sessions: usize,
    /// Number of live WebSocket connections.
    pub connections: usize,
    /// Number of sessions with a running round timer.
    pub active_timers: usize,
    /// Server wall-clock time (ms since epoch).
    pub timestamp: u64,
}
