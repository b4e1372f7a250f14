use axum::{
    Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    error::AppError,
    services::sync_service::{self, SseBody},
    state::SharedState,
};

/// Query string of the roster stream.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ViewerQuery {
    /// Player the roster is projected for; anonymous when omitted.
    pub viewer: Option<String>,
}

#[utoipa::path(
    get,
    path = "/sse/sessions/{id}",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Session document stream", content_type = "text/event-stream", body = String))
)]
/// Stream every committed change of a session document.
pub async fn session_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<SseBody, AppError> {
    Ok(sync_service::session_sse(&state, id).await?)
}

#[utoipa::path(
    get,
    path = "/sse/sessions/{id}/players",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Session identifier"), ViewerQuery),
    responses((status = 200, description = "Roster stream", content_type = "text/event-stream", body = String))
)]
/// Stream the roster of a session in join order, redacted for the viewer.
pub async fn players_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ViewerQuery>,
) -> Result<SseBody, AppError> {
    Ok(sync_service::players_sse(&state, id, query.viewer).await?)
}

#[utoipa::path(
    get,
    path = "/sse/events",
    tag = "sse",
    responses((status = 200, description = "Shared event feed", content_type = "text/event-stream", body = String))
)]
/// Stream recent session notifications shared by every client.
pub async fn events_stream(State(state): State<SharedState>) -> Result<SseBody, AppError> {
    Ok(sync_service::events_sse(&state).await?)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/sessions/{id}", get(session_stream))
        .route("/sse/sessions/{id}/players", get(players_stream))
        .route("/sse/events", get(events_stream))
}
