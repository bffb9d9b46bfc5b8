//! Read-only session query endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::session::{SessionSnapshot, SessionSummary},
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Configure the session query subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/{key}", get(get_session))
}

#[utoipa::path(
    get,
    path = "/api/sessions",
    tag = "sessions",
    responses((status = 200, description = "All live sessions", body = Vec<SessionSummary>))
)]
/// List every live session, oldest first.
pub async fn list_sessions(State(state): State<SharedState>) -> Json<Vec<SessionSummary>> {
    Json(session_service::list_sessions(&state))
}

#[utoipa::path(
    get,
    path = "/api/sessions/{key}",
    tag = "sessions",
    params(("key" = String, Path, description = "Full session id or short code")),
    responses(
        (status = 200, description = "Full session snapshot", body = SessionSnapshot),
        (status = 404, description = "Session not found")
    )
)]
/// Fetch one session's full snapshot by id or short code.
pub async fn get_session(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let payload = session_service::get_session(&state, &key)?;
    Ok(Json(payload))
}
