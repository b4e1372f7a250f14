use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Imposter Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::list_sessions,
        crate::routes::sessions::create_session,
        crate::routes::sessions::get_session,
        crate::routes::sessions::delete_session,
        crate::routes::sessions::list_players,
        crate::routes::sessions::join_session,
        crate::routes::sessions::leave_session,
        crate::routes::sessions::add_bot,
        crate::routes::sessions::start_session,
        crate::routes::sessions::start_voting,
        crate::routes::sessions::cast_vote,
        crate::routes::sessions::resolve_voting,
        crate::routes::sessions::end_session,
        crate::routes::sessions::voting_progress,
        crate::routes::sse::session_stream,
        crate::routes::sse::players_stream,
        crate::routes::sse::events_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::JoinSessionRequest,
            crate::dto::session::CastVoteRequest,
            crate::dto::session::EndSessionRequest,
            crate::dto::session::SessionSummary,
            crate::dto::session::SessionListItem,
            crate::dto::session::PlayerView,
            crate::dto::session::ResolveResponse,
            crate::dto::session::VoteCount,
            crate::dto::session::VotingProgressResponse,
            crate::dto::session::EventSummary,
            crate::dto::sse::SessionDeletedEvent,
            crate::dao::models::SessionPhase,
            crate::dao::models::Role,
            crate::dao::models::Winner,
            crate::dao::models::GameVariant,
            crate::dao::models::TieBreakPolicy,
            crate::dao::models::EventKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session lifecycle, voting and bots"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
