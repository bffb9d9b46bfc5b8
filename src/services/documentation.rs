//! OpenAPI aggregation for the REST and WebSocket surfaces.

use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quiz Relay Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::list_sessions,
        crate::routes::session::get_session,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::SessionSnapshot,
            crate::dto::session::SessionSummary,
            crate::dto::session::TeamSummary,
            crate::dto::session::ResponseDto,
            crate::dto::session::TeamRoundScoreDto,
            crate::dto::session::PlayerSelectionDto,
            crate::dto::session::PhaseDto,
            crate::dto::ws::ClientCommand,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::PlayerJoinedNotice,
            crate::dto::ws::ErrorNotice,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Read-only session queries"),
        (name = "sync", description = "WebSocket session synchronization"),
    )
)]
pub struct ApiDoc;
