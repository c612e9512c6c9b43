use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for Quiz Arena Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::lobby_stream,
        crate::routes::websocket::ws_handler,
        crate::routes::matches::list_matches,
        crate::routes::matches::get_match,
        crate::routes::matches::get_match_result,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::ParticipantInput,
            crate::dto::match_view::MatchesResponse,
            crate::dto::match_view::MatchStateView,
            crate::dto::match_view::MatchResultView,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::MatchCreatedEvent,
            crate::dto::sse::MatchEndedEvent,
            crate::dto::sse::QueueSizeEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "matches", description = "Match WebSocket and read-only match state"),
    )
)]
pub struct ApiDoc;
