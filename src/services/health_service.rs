//! Liveness reporting over the in-memory registries.

use crate::{dto::health::HealthResponse, state::SharedState, state::session::now_ms};

/// Build the health payload from the registry counters.
pub fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        sessions: state.store().len(),
        connections: state.connections().len(),
        active_timers: state.timers().active_count(),
        timestamp: now_ms(),
    }
}
