//! Session coordinator: lifecycle, role dealing, voting and resolution.
//!
//! Host-driven control operations run through the per-session transition gate and commit
//! their writes as one batch. Player self-writes (join, leave, vote) only touch the caller's
//! own record and never take the gate.

use std::time::SystemTime;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    dao::models::{
        EventKind, GameVariant, PlayerEntity, PlayerGuard, PlayerId, PlayerPatch, Role,
        SessionBatch, SessionDraft, SessionEntity, SessionPatch, SessionPhase, TieBreakPolicy,
        Winner, WriteOutcome,
    },
    error::ServiceError,
    services::{bot_service, event_service},
    state::{
        SharedState,
        roles::{MIN_PLAYERS, assign_roles},
        rules::GameRules,
        state_machine::{SessionEvent, is_in_progress, next_phase},
        tally::{Tally, tally},
    },
};

/// Rules and limits chosen by the host when creating a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Single or dual word deal.
    pub variant: GameVariant,
    /// How a tied vote is settled.
    pub tie_break: TieBreakPolicy,
    /// Falls back to the configured default when `None`.
    pub max_players: Option<u32>,
    /// Whether a full lobby still accepts spectators.
    pub allow_spectators: bool,
    /// Whether late joiners are dealt into a running game.
    pub allow_join_after_start: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            variant: GameVariant::default(),
            tie_break: TieBreakPolicy::default(),
            max_players: None,
            allow_spectators: true,
            allow_join_after_start: false,
        }
    }
}

/// What a voting resolution did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveReport {
    /// Counted ballots and the eliminated player.
    pub tally: Tally,
    /// Whether the eliminated player was the imposter.
    pub was_imposter: bool,
    /// Phase the session moved to.
    pub next_phase: SessionPhase,
    /// Round number after the resolution.
    pub round: u32,
}

/// Ballot progress of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotingProgress {
    /// Current lifecycle phase.
    pub phase: SessionPhase,
    /// Active players allowed to vote.
    pub eligible: usize,
    /// Eligible players who already voted.
    pub cast: usize,
    /// Eligible players that are not bots.
    pub humans_eligible: usize,
    /// Eligible humans who already voted.
    pub humans_cast: usize,
}

impl VotingProgress {
    /// Whether every eligible human has voted; bots are ignored.
    pub fn all_humans_voted(&self) -> bool {
        self.phase == SessionPhase::Voting && self.humans_cast == self.humans_eligible
    }
}

// ---------------------------------------------------------------------------
// Read-only projections
// ---------------------------------------------------------------------------

/// Current session document.
pub async fn get_session(state: &SharedState, id: Uuid) -> Result<SessionEntity, ServiceError> {
    load_session(state, id).await
}

/// Players of a session in join order.
pub async fn list_players(
    state: &SharedState,
    id: Uuid,
) -> Result<Vec<PlayerEntity>, ServiceError> {
    load_session(state, id).await?;
    Ok(state.store().list_players(id).await?)
}

/// Every known session, oldest first. Store failures yield an empty list.
pub async fn list_sessions(state: &SharedState) -> Vec<SessionEntity> {
    match state.store().list_sessions().await {
        Ok(sessions) => sessions,
        Err(err) => {
            warn!(error = %err, "failed to list sessions; returning an empty directory");
            Vec::new()
        }
    }
}

/// Ballots cast so far among active players.
pub async fn voting_progress(
    state: &SharedState,
    id: Uuid,
) -> Result<VotingProgress, ServiceError> {
    let session = load_session(state, id).await?;
    let players = state.store().list_players(id).await?;

    let eligible: Vec<&PlayerEntity> = players.iter().filter(|p| p.is_active()).collect();
    let humans: Vec<&PlayerEntity> = eligible.iter().copied().filter(|p| !p.is_bot).collect();

    Ok(VotingProgress {
        phase: session.phase,
        eligible: eligible.len(),
        cast: eligible.iter().filter(|p| p.has_voted).count(),
        humans_eligible: humans.len(),
        humans_cast: humans.iter().filter(|p| p.has_voted).count(),
    })
}

// ---------------------------------------------------------------------------
// Lobby management
// ---------------------------------------------------------------------------

/// Open a lobby hosted by `host_id`, who joins it right away.
#[instrument(skip_all, fields(host.id = %host_id))]
pub async fn create_session(
    state: &SharedState,
    host_id: &str,
    host_name: &str,
    name: &str,
    options: SessionOptions,
) -> Result<SessionEntity, ServiceError> {
    let name = required(name, "session name")?;
    let host_name = required(host_name, "host name")?;
    let host_id = required(host_id, "host id")?;
    let max_players = options
        .max_players
        .unwrap_or_else(|| state.config().default_max_players());
    if (max_players as usize) < MIN_PLAYERS {
        return Err(ServiceError::InvalidInput(format!(
            "max_players must be at least {MIN_PLAYERS}"
        )));
    }

    let store = state.store();
    let session = store
        .insert_session(SessionDraft {
            name,
            host_id: host_id.clone(),
            host_name: host_name.clone(),
            variant: options.variant,
            tie_break: options.tie_break,
            max_players,
            allow_spectators: options.allow_spectators,
            allow_join_after_start: options.allow_join_after_start,
        })
        .await?;

    let mut host = PlayerEntity::new(session.id, host_id, host_name, SystemTime::now());
    host.is_host = true;
    if store.insert_player(session.id, host, PlayerGuard::None).await? != WriteOutcome::Applied {
        warn!(session.id = %session.id, "host record could not be created");
    }

    info!(session.id = %session.id, max_players, "session created");
    event_service::emit(state, EventKind::NewSession, &session).await;
    Ok(session)
}

/// Join `player_id` to a session, or reconnect it when it already has a record.
#[instrument(skip_all, fields(session.id = %id, player.id = %player_id))]
pub async fn join_session(
    state: &SharedState,
    id: Uuid,
    player_id: &str,
    player_name: &str,
    as_spectator: bool,
) -> Result<PlayerEntity, ServiceError> {
    let player_id = required(player_id, "player id")?;
    let session = load_session(state, id).await?;
    let store = state.store();

    if let Some(existing) = store.find_player(id, player_id.clone()).await? {
        return reconnect(state, &session, existing, as_spectator).await;
    }

    let player_name = required(player_name, "player name")?;
    let spectator = as_spectator
        || session.phase == SessionPhase::Ended
        || (session.phase != SessionPhase::Lobby && !session.allow_join_after_start);
    if spectator && !session.allow_spectators {
        return Err(ServiceError::Forbidden(
            "this session does not accept spectators".into(),
        ));
    }
    let guard = if spectator {
        PlayerGuard::None
    } else {
        PlayerGuard::SeatAvailable
    };

    let mut player = PlayerEntity::new(id, player_id.clone(), player_name, SystemTime::now());
    player.is_spectator = spectator;
    if !spectator && is_in_progress(session.phase) {
        player.role = Role::Player;
        player.word = session.secret_word.clone();
    }

    match store.insert_player(id, player.clone(), guard).await? {
        WriteOutcome::Applied => {
            info!(spectator, "player joined");
            Ok(player)
        }
        WriteOutcome::AlreadyExists => {
            // Lost a race against a concurrent join for the same id.
            let existing = find_player(state, id, &player_id).await?;
            reconnect(state, &session, existing, as_spectator).await
        }
        WriteOutcome::PreconditionFailed => Err(session_full(&session)),
        WriteOutcome::Missing => Err(session_not_found(id)),
    }
}

async fn reconnect(
    state: &SharedState,
    session: &SessionEntity,
    existing: PlayerEntity,
    as_spectator: bool,
) -> Result<PlayerEntity, ServiceError> {
    let mut patch = PlayerPatch::connected(true);
    let mut guard = PlayerGuard::None;
    let takes_seat = !existing.is_connected && !existing.is_spectator && !existing.is_eliminated;

    if existing.is_spectator {
        if !as_spectator && session.phase == SessionPhase::Lobby {
            guard = PlayerGuard::SeatAvailable;
            patch.is_spectator = Some(false);
        }
    } else if missed_the_deal(session, &existing) {
        if session.allow_join_after_start {
            guard = PlayerGuard::SeatAvailable;
            patch.role = Some(Role::Player);
            patch.word = Some(session.secret_word.clone());
        } else {
            patch.is_spectator = Some(true);
        }
    } else if takes_seat && session.phase == SessionPhase::Lobby {
        guard = PlayerGuard::SeatAvailable;
    }

    match state
        .store()
        .update_player(session.id, existing.id.clone(), patch.clone(), guard)
        .await?
    {
        WriteOutcome::Applied => {}
        WriteOutcome::PreconditionFailed => return Err(session_full(session)),
        _ => return Err(session_not_found(session.id)),
    }

    let mut player = existing;
    patch.apply(&mut player, SystemTime::now());
    info!(session.id = %session.id, player.id = %player.id, "player reconnected");
    Ok(player)
}

/// A player record created in the lobby that was not connected when roles were dealt.
fn missed_the_deal(session: &SessionEntity, player: &PlayerEntity) -> bool {
    is_in_progress(session.phase)
        && !player.is_bot
        && !player.is_eliminated
        && player.word.is_none()
        && session.imposter_id.as_deref() != Some(player.id.as_str())
}

/// Mark a player as disconnected. Repeated calls are harmless and the record is kept.
#[instrument(skip_all, fields(session.id = %id, player.id = %player_id))]
pub async fn leave_session(
    state: &SharedState,
    id: Uuid,
    player_id: &str,
) -> Result<(), ServiceError> {
    match state
        .store()
        .update_player(
            id,
            player_id.to_string(),
            PlayerPatch::connected(false),
            PlayerGuard::None,
        )
        .await?
    {
        WriteOutcome::Applied => {
            debug!("player disconnected");
            Ok(())
        }
        _ => Err(ServiceError::NotFound(format!(
            "player `{player_id}` not found in session `{id}`"
        ))),
    }
}

/// Add a simulated player to a lobby.
#[instrument(skip_all, fields(session.id = %id))]
pub async fn add_bot(
    state: &SharedState,
    id: Uuid,
    host_id: &str,
) -> Result<PlayerEntity, ServiceError> {
    state
        .run_transition(id, || async {
            let session = load_session(state, id).await?;
            ensure_host(&session, host_id)?;
            if session.phase != SessionPhase::Lobby {
                return Err(ServiceError::InvalidPhase(format!(
                    "bots can only be added in the lobby, current phase {:?}",
                    session.phase
                )));
            }

            let store = state.store();
            let players = store.list_players(id).await?;
            let bot_index = players.iter().filter(|player| player.is_bot).count();
            let bot_id = format!("bot-{}", Uuid::new_v4().simple());
            let mut bot = PlayerEntity::new(
                id,
                bot_id,
                state.config().bot_name(bot_index),
                SystemTime::now(),
            );
            bot.is_bot = true;

            match store
                .insert_player(id, bot.clone(), PlayerGuard::SeatAvailable)
                .await?
            {
                WriteOutcome::Applied => {
                    info!(player.id = %bot.id, "bot added");
                    Ok(bot)
                }
                WriteOutcome::PreconditionFailed => Err(session_full(&session)),
                _ => Err(session_not_found(id)),
            }
        })
        .await
}

// ---------------------------------------------------------------------------
// Game flow
// ---------------------------------------------------------------------------

/// Deal roles and words to every active player and leave the lobby.
#[instrument(skip_all, fields(session.id = %id))]
pub async fn start_session(
    state: &SharedState,
    id: Uuid,
    host_id: &str,
) -> Result<SessionEntity, ServiceError> {
    let session = state
        .run_transition(id, || async {
            let session = load_session(state, id).await?;
            ensure_host(&session, host_id)?;
            let next = next_phase(session.phase, SessionEvent::Start)?;

            let store = state.store();
            let players = store.list_players(id).await?;
            let active: Vec<PlayerId> = players
                .iter()
                .filter(|player| player.is_active())
                .map(|player| player.id.clone())
                .collect();

            let rules = GameRules::for_session(&session, state.words());
            let assignment = state
                .with_rng(|rng| assign_roles(&active, &rules.words, rules.variant, rng))?;

            let mut batch = SessionBatch::new().with_session(SessionPatch {
                phase: Some(next),
                secret_word: Some(Some(assignment.secret_word.clone())),
                imposter_id: Some(Some(assignment.imposter_id.clone())),
                imposter_word: Some(assignment.imposter_word.clone()),
                round: Some(1),
                winner: Some(None),
                last_eliminated_id: Some(None),
            });
            for player_id in &active {
                let (role, word) = assignment.deal_for(player_id);
                batch = batch.with_player(player_id.clone(), PlayerPatch::deal(role, word));
            }

            commit(state, id, batch).await?;
            info!(players = active.len(), variant = ?rules.variant, "session started");
            load_session(state, id).await
        })
        .await?;

    event_service::emit(state, EventKind::Started, &session).await;
    Ok(session)
}

/// Open a voting round: clear every ballot and schedule bot votes.
#[instrument(skip_all, fields(session.id = %id))]
pub async fn start_voting(
    state: &SharedState,
    id: Uuid,
    host_id: &str,
) -> Result<SessionEntity, ServiceError> {
    let session = state
        .run_transition(id, || async {
            let session = load_session(state, id).await?;
            ensure_host(&session, host_id)?;
            let next = next_phase(session.phase, SessionEvent::OpenVoting)?;

            let players = state.store().list_players(id).await?;
            let mut batch = SessionBatch::new().with_session(SessionPatch::phase(next));
            for player in &players {
                batch = batch.with_player(player.id.clone(), PlayerPatch::clear_vote());
            }

            commit(state, id, batch).await?;
            info!(round = session.round, "voting opened");
            // Registered before the gate is released so that any later transition cancels them.
            bot_service::schedule_votes(state, id, &players);
            load_session(state, id).await
        })
        .await?;

    event_service::emit(state, EventKind::VotingStarted, &session).await;
    Ok(session)
}

/// Record `voter_id`'s ballot against `target_id`.
///
/// The write is guarded by the store so that two concurrent ballots from the same voter can
/// never both be counted.
#[instrument(skip_all, fields(session.id = %id, player.id = %voter_id))]
pub async fn cast_vote(
    state: &SharedState,
    id: Uuid,
    voter_id: &str,
    target_id: &str,
) -> Result<(), ServiceError> {
    let session = load_session(state, id).await?;
    if session.phase != SessionPhase::Voting {
        return Err(ServiceError::InvalidPhase(format!(
            "votes are only accepted while voting, current phase {:?}",
            session.phase
        )));
    }

    let store = state.store();
    let voter = store
        .find_player(id, voter_id.to_string())
        .await?
        .ok_or_else(|| ServiceError::Forbidden("only players of this session can vote".into()))?;
    if voter.is_spectator {
        return Err(ServiceError::Forbidden("spectators cannot vote".into()));
    }
    if voter.is_eliminated {
        return Err(ServiceError::Forbidden("eliminated players cannot vote".into()));
    }
    if voter.has_voted {
        return Err(ServiceError::DuplicateVote);
    }
    if voter_id == target_id {
        return Err(ServiceError::SelfVote);
    }

    match store.find_player(id, target_id.to_string()).await? {
        Some(target) if target.is_active() => {}
        Some(_) => {
            return Err(ServiceError::InvalidTarget(format!(
                "`{target_id}` is not an active player"
            )));
        }
        None => {
            return Err(ServiceError::InvalidTarget(format!(
                "`{target_id}` is not part of this session"
            )));
        }
    }

    match store
        .update_player(
            id,
            voter_id.to_string(),
            PlayerPatch::vote(target_id.to_string()),
            PlayerGuard::HasNotVoted,
        )
        .await?
    {
        WriteOutcome::Applied => {
            debug!(target.id = %target_id, "vote recorded");
            Ok(())
        }
        WriteOutcome::PreconditionFailed => Err(ServiceError::DuplicateVote),
        _ => Err(session_not_found(id)),
    }
}

/// Count the ballots and eliminate the most voted player.
///
/// Catching the imposter moves the session to `revealed`; anything else resumes the
/// discussion with the next round and leaves the ballots in place for review.
#[instrument(skip_all, fields(session.id = %id))]
pub async fn resolve_voting(
    state: &SharedState,
    id: Uuid,
    host_id: &str,
) -> Result<ResolveReport, ServiceError> {
    state
        .run_transition(id, || async {
            let session = load_session(state, id).await?;
            ensure_host(&session, host_id)?;
            if session.phase != SessionPhase::Voting {
                return Err(ServiceError::InvalidPhase(format!(
                    "no voting round to resolve, current phase {:?}",
                    session.phase
                )));
            }
            state.cancel_bot_tasks(id);

            let players = state.store().list_players(id).await?;
            let rules = GameRules::for_session(&session, state.words());
            let result = state.with_rng(|rng| tally(&players, rules.tie_break, rng));

            let was_imposter = result.eliminated.is_some()
                && result.eliminated.as_deref() == session.imposter_id.as_deref();
            let event = if was_imposter {
                SessionEvent::ImposterCaught
            } else {
                SessionEvent::ContinueRound
            };
            let next = next_phase(session.phase, event)?;
            let round = if was_imposter {
                session.round
            } else {
                session.round + 1
            };

            let mut batch = SessionBatch::new().with_session(SessionPatch {
                phase: Some(next),
                round: Some(round),
                last_eliminated_id: Some(result.eliminated.clone()),
                ..SessionPatch::default()
            });
            if let Some(eliminated) = &result.eliminated {
                batch = batch.with_player(eliminated.clone(), PlayerPatch::eliminate());
            }
            commit(state, id, batch).await?;

            info!(
                eliminated = ?result.eliminated,
                was_imposter,
                ballots = result.ballots(),
                tied = result.tied.len(),
                next_phase = ?next,
                "voting resolved"
            );
            Ok(ResolveReport {
                tally: result,
                was_imposter,
                next_phase: next,
                round,
            })
        })
        .await
}

/// Finish the game and reveal every role.
///
/// Without an explicit `winner`, a session whose imposter was caught is won by the players.
#[instrument(skip_all, fields(session.id = %id))]
pub async fn end_session(
    state: &SharedState,
    id: Uuid,
    host_id: &str,
    winner: Option<Winner>,
) -> Result<SessionEntity, ServiceError> {
    let session = state
        .run_transition(id, || async {
            let session = load_session(state, id).await?;
            ensure_host(&session, host_id)?;
            let next = next_phase(session.phase, SessionEvent::End)?;
            state.cancel_bot_tasks(id);

            let winner = winner.or_else(|| {
                (session.phase == SessionPhase::Revealed).then_some(Winner::Players)
            });
            let players = state.store().list_players(id).await?;
            let mut batch = SessionBatch::new().with_session(SessionPatch {
                phase: Some(next),
                winner: Some(winner),
                ..SessionPatch::default()
            });
            for player in &players {
                batch = batch.with_player(player.id.clone(), PlayerPatch::reveal());
            }
            commit(state, id, batch).await?;

            info!(winner = ?winner, "session ended");
            load_session(state, id).await
        })
        .await?;

    // Nothing but deletion can follow, so the per-session registries are released now.
    state.forget_session(id);
    event_service::emit(state, EventKind::Ended, &session).await;
    Ok(session)
}

/// Remove a session and every player record it holds.
#[instrument(skip_all, fields(session.id = %id))]
pub async fn delete_session(state: &SharedState, id: Uuid, host_id: &str) -> Result<(), ServiceError> {
    state
        .run_transition(id, || async {
            let session = load_session(state, id).await?;
            ensure_host(&session, host_id)?;
            state.cancel_bot_tasks(id);

            if !state.store().delete_session(id).await? {
                return Err(session_not_found(id));
            }
            info!("session deleted");
            Ok(())
        })
        .await?;

    state.forget_session(id);
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn load_session(state: &SharedState, id: Uuid) -> Result<SessionEntity, ServiceError> {
    state
        .store()
        .find_session(id)
        .await?
        .ok_or_else(|| session_not_found(id))
}

async fn find_player(
    state: &SharedState,
    id: Uuid,
    player_id: &str,
) -> Result<PlayerEntity, ServiceError> {
    state
        .store()
        .find_player(id, player_id.to_string())
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("player `{player_id}` not found in session `{id}`"))
        })
}

fn session_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("session `{id}` not found"))
}

fn ensure_host(session: &SessionEntity, caller: &str) -> Result<(), ServiceError> {
    if session.host_id != caller {
        return Err(ServiceError::Forbidden(
            "only the host can perform this operation".into(),
        ));
    }
    Ok(())
}

fn session_full(session: &SessionEntity) -> ServiceError {
    ServiceError::Capacity {
        max: session.max_players,
    }
}

async fn commit(state: &SharedState, id: Uuid, batch: SessionBatch) -> Result<(), ServiceError> {
    match state.store().commit_batch(id, batch).await? {
        WriteOutcome::Applied => Ok(()),
        _ => Err(session_not_found(id)),
    }
}

fn required(value: &str, what: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidInput(format!("{what} must not be blank")));
    }
    Ok(trimmed.to_string())
}
