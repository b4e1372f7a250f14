use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dao::models::{SessionEntity, SessionPhase},
    dto::session::{
        CastVoteRequest, CreateSessionRequest, EndSessionRequest, JoinSessionRequest, PlayerView,
        ResolveResponse, SessionListItem, SessionSummary, VotingProgressResponse,
    },
    error::AppError,
    routes::caller::Caller,
    services::session_service,
    state::SharedState,
};

/// Session lifecycle, roster and voting endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .route("/sessions/{id}/players", get(list_players))
        .route("/sessions/{id}/join", post(join_session))
        .route("/sessions/{id}/leave", post(leave_session))
        .route("/sessions/{id}/bots", post(add_bot))
        .route("/sessions/{id}/start", post(start_session))
        .route("/sessions/{id}/voting", post(start_voting))
        .route("/sessions/{id}/votes", post(cast_vote))
        .route("/sessions/{id}/resolve", post(resolve_voting))
        .route("/sessions/{id}/end", post(end_session))
        .route("/sessions/{id}/progress", get(voting_progress))
}

fn summary(state: &SharedState, session: SessionEntity) -> SessionSummary {
    SessionSummary::from_entity(session, state.config().voting_duration())
}

/// List every open session. Never fails: an unreachable store yields an empty list.
#[utoipa::path(
    get,
    path = "/sessions",
    tag = "sessions",
    responses((status = 200, description = "Known sessions, oldest first", body = [SessionListItem]))
)]
pub async fn list_sessions(State(state): State<SharedState>) -> Json<Vec<SessionListItem>> {
    let sessions = session_service::list_sessions(&state).await;
    Json(sessions.into_iter().map(SessionListItem::from).collect())
}

/// Open a lobby hosted by the caller.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    params(("X-Player-Id" = String, Header, description = "Identifier of the calling player")),
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = SessionSummary),
        (status = 400, description = "Invalid payload"),
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Caller(host_id): Caller,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<SessionSummary>), AppError> {
    let name = payload.name.clone();
    let host_name = payload.host_name.clone();
    let session =
        session_service::create_session(&state, &host_id, &host_name, &name, payload.into())
            .await?;
    Ok((StatusCode::CREATED, Json(summary(&state, session))))
}

/// One session, with secrets hidden until they are public.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session", body = SessionSummary),
        (status = 404, description = "Unknown session"),
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let session = session_service::get_session(&state, id).await?;
    Ok(Json(summary(&state, session)))
}

/// Delete a session and all its player records. Host only.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    tag = "sessions",
    params(
        ("X-Player-Id" = String, Header, description = "Identifier of the calling player"),
        ("id" = Uuid, Path, description = "Session identifier"),
    ),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 403, description = "Caller is not the host"),
    )
)]
pub async fn delete_session(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    session_service::delete_session(&state, id, &caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Roster in join order, with secrets hidden from everyone but their owner.
#[utoipa::path(
    get,
    path = "/sessions/{id}/players",
    tag = "sessions",
    params(
        ("X-Player-Id" = Option<String>, Header, description = "Viewer; anonymous when omitted"),
        ("id" = Uuid, Path, description = "Session identifier"),
    ),
    responses((status = 200, description = "Players", body = [PlayerView]))
)]
pub async fn list_players(
    State(state): State<SharedState>,
    viewer: Option<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PlayerView>>, AppError> {
    let session = session_service::get_session(&state, id).await?;
    let players = session_service::list_players(&state, id).await?;
    let viewer = viewer.map(|Caller(id)| id);
    Ok(Json(PlayerView::project_all(
        &players,
        viewer.as_deref(),
        session.phase,
    )))
}

/// Join a session, or reconnect when the caller already has a seat.
#[utoipa::path(
    post,
    path = "/sessions/{id}/join",
    tag = "sessions",
    params(
        ("X-Player-Id" = String, Header, description = "Identifier of the calling player"),
        ("id" = Uuid, Path, description = "Session identifier"),
    ),
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Caller's player record", body = PlayerView),
        (status = 409, description = "Session is full"),
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<JoinSessionRequest>>,
) -> Result<Json<PlayerView>, AppError> {
    let player = session_service::join_session(
        &state,
        id,
        &caller,
        &payload.player_name,
        payload.as_spectator,
    )
    .await?;
    let session = session_service::get_session(&state, id).await?;
    Ok(Json(PlayerView::project(
        &player,
        Some(caller.as_str()),
        session.phase,
    )))
}

/// Mark the caller as disconnected. Their seat and role are kept.
#[utoipa::path(
    post,
    path = "/sessions/{id}/leave",
    tag = "sessions",
    params(
        ("X-Player-Id" = String, Header, description = "Identifier of the calling player"),
        ("id" = Uuid, Path, description = "Session identifier"),
    ),
    responses((status = 204, description = "Caller disconnected"))
)]
pub async fn leave_session(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    session_service::leave_session(&state, id, &caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Add a simulated player to the lobby. Host only.
#[utoipa::path(
    post,
    path = "/sessions/{id}/bots",
    tag = "sessions",
    params(
        ("X-Player-Id" = String, Header, description = "Identifier of the calling player"),
        ("id" = Uuid, Path, description = "Session identifier"),
    ),
    responses((status = 200, description = "Bot created", body = PlayerView))
)]
pub async fn add_bot(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<PlayerView>, AppError> {
    let bot = session_service::add_bot(&state, id, &caller).await?;
    Ok(Json(PlayerView::project(
        &bot,
        Some(caller.as_str()),
        SessionPhase::Lobby,
    )))
}

/// Deal roles and words. Host only, lobby only.
#[utoipa::path(
    post,
    path = "/sessions/{id}/start",
    tag = "sessions",
    params(
        ("X-Player-Id" = String, Header, description = "Identifier of the calling player"),
        ("id" = Uuid, Path, description = "Session identifier"),
    ),
    responses(
        (status = 200, description = "Session started", body = SessionSummary),
        (status = 422, description = "Not enough active players"),
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let session = session_service::start_session(&state, id, &caller).await?;
    Ok(Json(summary(&state, session)))
}

/// Open a voting round. Host only.
#[utoipa::path(
    post,
    path = "/sessions/{id}/voting",
    tag = "sessions",
    params(
        ("X-Player-Id" = String, Header, description = "Identifier of the calling player"),
        ("id" = Uuid, Path, description = "Session identifier"),
    ),
    responses((status = 200, description = "Voting opened", body = SessionSummary))
)]
pub async fn start_voting(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let session = session_service::start_voting(&state, id, &caller).await?;
    Ok(Json(summary(&state, session)))
}

/// Cast the caller's ballot for this round.
#[utoipa::path(
    post,
    path = "/sessions/{id}/votes",
    tag = "sessions",
    params(
        ("X-Player-Id" = String, Header, description = "Identifier of the calling player"),
        ("id" = Uuid, Path, description = "Session identifier"),
    ),
    request_body = CastVoteRequest,
    responses(
        (status = 204, description = "Vote recorded"),
        (status = 409, description = "Caller already voted"),
        (status = 422, description = "Self vote or invalid target"),
    )
)]
pub async fn cast_vote(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<CastVoteRequest>>,
) -> Result<StatusCode, AppError> {
    session_service::cast_vote(&state, id, &caller, &payload.target_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Count the ballots and eliminate the most voted player. Host only.
#[utoipa::path(
    post,
    path = "/sessions/{id}/resolve",
    tag = "sessions",
    params(
        ("X-Player-Id" = String, Header, description = "Identifier of the calling player"),
        ("id" = Uuid, Path, description = "Session identifier"),
    ),
    responses((status = 200, description = "Round resolved", body = ResolveResponse))
)]
pub async fn resolve_voting(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ResolveResponse>, AppError> {
    let report = session_service::resolve_voting(&state, id, &caller).await?;
    Ok(Json(report.into()))
}

/// Finish the game and reveal every role. Host only.
#[utoipa::path(
    post,
    path = "/sessions/{id}/end",
    tag = "sessions",
    params(
        ("X-Player-Id" = String, Header, description = "Identifier of the calling player"),
        ("id" = Uuid, Path, description = "Session identifier"),
    ),
    request_body = EndSessionRequest,
    responses((status = 200, description = "Session ended", body = SessionSummary))
)]
pub async fn end_session(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<EndSessionRequest>>,
) -> Result<Json<SessionSummary>, AppError> {
    let session = session_service::end_session(&state, id, &caller, payload.winner).await?;
    Ok(Json(summary(&state, session)))
}

/// How many eligible players have voted so far.
#[utoipa::path(
    get,
    path = "/sessions/{id}/progress",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Voting progress", body = VotingProgressResponse))
)]
pub async fn voting_progress(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VotingProgressResponse>, AppError> {
    let progress = session_service::voting_progress(&state, id).await?;
    Ok(Json(progress.into()))
}
