//! Request and response payloads of the session REST API and streams.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{
        EventEntity, EventKind, GameVariant, PlayerEntity, PlayerId, Role, SessionEntity,
        SessionPhase, TieBreakPolicy, Winner,
    },
    dto::{
        format_system_time,
        validation::{validate_display_name, validate_player_id},
    },
    services::session_service::{ResolveReport, SessionOptions, VotingProgress},
};

fn default_true() -> bool {
    true
}

/// Payload used to open a new lobby; the caller becomes its host.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    /// Display name of the lobby.
    #[validate(length(max = 64), custom(function = "validate_display_name"))]
    pub name: String,
    /// Display name of the calling host.
    #[validate(length(max = 32), custom(function = "validate_display_name"))]
    pub host_name: String,
    /// Single or dual word deal.
    #[serde(default)]
    pub variant: GameVariant,
    /// How a tied vote is settled.
    #[serde(default)]
    pub tie_break: TieBreakPolicy,
    /// Defaults to the server configuration (10 unless overridden).
    #[validate(range(min = 3, max = 50))]
    pub max_players: Option<u32>,
    /// Whether a full lobby still accepts spectators.
    #[serde(default = "default_true")]
    pub allow_spectators: bool,
    /// Whether late joiners are dealt into a running game.
    #[serde(default)]
    pub allow_join_after_start: bool,
}

impl From<CreateSessionRequest> for SessionOptions {
    fn from(value: CreateSessionRequest) -> Self {
        Self {
            variant: value.variant,
            tie_break: value.tie_break,
            max_players: value.max_players,
            allow_spectators: value.allow_spectators,
            allow_join_after_start: value.allow_join_after_start,
        }
    }
}

/// Join (or reconnect to) a session as the calling player.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    /// Display name shown to the other players.
    #[validate(length(max = 32), custom(function = "validate_display_name"))]
    pub player_name: String,
    /// Watch the game without being dealt a role.
    #[serde(default)]
    pub as_spectator: bool,
}

/// Ballot cast by the calling player.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CastVoteRequest {
    /// Player accused by this ballot.
    #[validate(custom(function = "validate_player_id"))]
    pub target_id: PlayerId,
}

/// Request to finish a session.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct EndSessionRequest {
    /// When omitted, a session whose imposter was caught ends with the players winning.
    #[serde(default)]
    pub winner: Option<Winner>,
}

/// Public projection of a session document.
///
/// Secrets stay hidden until they are meant to be public: the imposter once caught or the
/// game over, the words only once the game is over.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummary {
    /// Session identifier.
    pub id: Uuid,
    /// Display name of the lobby.
    pub name: String,
    /// Player id of the host.
    pub host_id: PlayerId,
    /// Display name of the host.
    pub host_name: String,
    /// Current lifecycle phase.
    pub phase: SessionPhase,
    /// Deal variant.
    pub variant: GameVariant,
    /// Tie-break policy applied when resolving.
    pub tie_break: TieBreakPolicy,
    /// Seats available to non-spectators.
    pub max_players: u32,
    /// Voting round, starting at 1 once dealt.
    pub round: u32,
    /// Whether a full lobby still accepts spectators.
    pub allow_spectators: bool,
    /// Whether late joiners are dealt into a running game.
    pub allow_join_after_start: bool,
    /// Winning side once the game is over.
    pub winner: Option<Winner>,
    /// Player eliminated by the latest resolution.
    pub last_eliminated_id: Option<PlayerId>,
    /// Imposter, once caught or the game is over.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imposter_id: Option<PlayerId>,
    /// Word dealt to the players, once the game is over.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_word: Option<String>,
    /// Word dealt to the imposter in dual word games, once the game is over.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imposter_word: Option<String>,
    /// RFC 3339 timestamp of the last phase change.
    pub phase_entered_at: String,
    /// Present while voting; clients run their countdown against it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voting_ends_at: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the last write.
    pub updated_at: String,
}

impl SessionSummary {
    /// Project `session`, deriving the voting deadline from `voting_duration`.
    pub fn from_entity(session: SessionEntity, voting_duration: Duration) -> Self {
        let ended = session.phase == SessionPhase::Ended;
        let imposter_public = ended || session.phase == SessionPhase::Revealed;
        let voting_ends_at = voting_deadline(&session, voting_duration).map(format_system_time);

        Self {
            id: session.id,
            name: session.name,
            host_id: session.host_id,
            host_name: session.host_name,
            phase: session.phase,
            variant: session.variant,
            tie_break: session.tie_break,
            max_players: session.max_players,
            round: session.round,
            allow_spectators: session.allow_spectators,
            allow_join_after_start: session.allow_join_after_start,
            winner: session.winner,
            last_eliminated_id: session.last_eliminated_id,
            imposter_id: session.imposter_id.filter(|_| imposter_public),
            secret_word: session.secret_word.filter(|_| ended),
            imposter_word: session.imposter_word.filter(|_| ended),
            phase_entered_at: format_system_time(session.phase_entered_at),
            voting_ends_at,
            created_at: format_system_time(session.created_at),
            updated_at: format_system_time(session.updated_at),
        }
    }
}

/// End of the voting countdown of a session currently collecting votes.
pub fn voting_deadline(session: &SessionEntity, voting_duration: Duration) -> Option<SystemTime> {
    (session.phase == SessionPhase::Voting).then(|| session.phase_entered_at + voting_duration)
}

/// Entry of the session directory.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionListItem {
    /// Session identifier.
    pub id: Uuid,
    /// Display name of the lobby.
    pub name: String,
    /// Display name of the host.
    pub host_name: String,
    /// Current lifecycle phase.
    pub phase: SessionPhase,
    /// Seats available to non-spectators.
    pub max_players: u32,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl From<SessionEntity> for SessionListItem {
    fn from(session: SessionEntity) -> Self {
        Self {
            id: session.id,
            name: session.name,
            host_name: session.host_name,
            phase: session.phase,
            max_players: session.max_players,
            created_at: format_system_time(session.created_at),
        }
    }
}

/// A player as seen by one particular viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PlayerView {
    /// Player identifier.
    pub id: PlayerId,
    /// Display name captured on join.
    pub name: String,
    /// Whether this player drives the game.
    pub is_host: bool,
    /// Whether the server votes for this player.
    pub is_bot: bool,
    /// Whether the player is currently seated.
    pub is_connected: bool,
    /// Whether the player only watches.
    pub is_spectator: bool,
    /// Whether the player was voted out.
    pub is_eliminated: bool,
    /// Whether a ballot was cast this round.
    pub has_voted: bool,
    /// Hidden from other players while the round is still collecting votes.
    pub vote_for: Option<PlayerId>,
    /// Only known to the player themself until revealed.
    pub role: Option<Role>,
    /// Dealt word, visible under the same rule as the role.
    pub word: Option<String>,
    /// Whether the role was made public.
    pub revealed: bool,
    /// RFC 3339 timestamp of the first join.
    pub joined_at: String,
}

impl PlayerView {
    /// Project `player` for `viewer` (anonymous when `None`) in a session currently in `phase`.
    pub fn project(player: &PlayerEntity, viewer: Option<&str>, phase: SessionPhase) -> Self {
        let is_self = viewer == Some(player.id.as_str());
        let secrets_visible = is_self || player.revealed || phase == SessionPhase::Ended;
        let vote_visible = is_self || phase != SessionPhase::Voting;

        Self {
            id: player.id.clone(),
            name: player.name_snapshot.clone(),
            is_host: player.is_host,
            is_bot: player.is_bot,
            is_connected: player.is_connected,
            is_spectator: player.is_spectator,
            is_eliminated: player.is_eliminated,
            has_voted: player.has_voted,
            vote_for: player.vote_for.clone().filter(|_| vote_visible),
            role: secrets_visible.then_some(player.role),
            word: player.word.clone().filter(|_| secrets_visible),
            revealed: player.revealed,
            joined_at: format_system_time(player.joined_at),
        }
    }

    /// Project a whole roster for `viewer`.
    pub fn project_all(
        players: &[PlayerEntity],
        viewer: Option<&str>,
        phase: SessionPhase,
    ) -> Vec<Self> {
        players
            .iter()
            .map(|player| Self::project(player, viewer, phase))
            .collect()
    }
}

/// Votes received by one target.
#[derive(Debug, Serialize, ToSchema)]
pub struct VoteCount {
    /// Accused player.
    pub target_id: PlayerId,
    /// Ballots naming this player.
    pub votes: u32,
}

/// Outcome of a voting round.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResolveResponse {
    /// Player voted out, if any.
    pub eliminated_id: Option<PlayerId>,
    /// Whether the eliminated player was the imposter.
    pub was_imposter: bool,
    /// Counts in the order targets were first voted for.
    pub counts: Vec<VoteCount>,
    /// Players sharing the highest count when the vote was tied.
    pub tied: Vec<PlayerId>,
    /// Phase the session moved to.
    pub next_phase: SessionPhase,
    /// Round the session is now in.
    pub round: u32,
}

impl From<ResolveReport> for ResolveResponse {
    fn from(report: ResolveReport) -> Self {
        Self {
            eliminated_id: report.tally.eliminated,
            was_imposter: report.was_imposter,
            counts: report
                .tally
                .counts
                .into_iter()
                .map(|(target_id, votes)| VoteCount { target_id, votes })
                .collect(),
            tied: report.tally.tied,
            next_phase: report.next_phase,
            round: report.round,
        }
    }
}

/// Ballot progress of the current voting round.
#[derive(Debug, Serialize, ToSchema)]
pub struct VotingProgressResponse {
    /// Current lifecycle phase.
    pub phase: SessionPhase,
    /// Players allowed to vote.
    pub eligible: usize,
    /// Ballots received.
    pub cast: usize,
    /// Human players allowed to vote.
    pub humans_eligible: usize,
    /// Ballots received from humans.
    pub humans_cast: usize,
    /// Whether every human has voted.
    pub all_humans_voted: bool,
}

impl From<VotingProgress> for VotingProgressResponse {
    fn from(progress: VotingProgress) -> Self {
        Self {
            phase: progress.phase,
            eligible: progress.eligible,
            cast: progress.cast,
            humans_eligible: progress.humans_eligible,
            humans_cast: progress.humans_cast,
            all_humans_voted: progress.all_humans_voted(),
        }
    }
}

/// Notification pushed on the shared event feed.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventSummary {
    /// Event identifier.
    pub id: Uuid,
    /// Kind of lifecycle change.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Session the event is about.
    pub session_id: Uuid,
    /// Display name of that session.
    pub session_name: String,
    /// Display name of its host.
    pub host_name: String,
    /// Human readable description.
    pub message: String,
    /// RFC 3339 timestamp of the event.
    pub created_at: String,
}

impl From<EventEntity> for EventSummary {
    fn from(event: EventEntity) -> Self {
        Self {
            id: event.id,
            kind: event.kind,
            session_id: event.session_id,
            session_name: event.session_name,
            host_name: event.host_name,
            message: event.message,
            created_at: format_system_time(event.created_at),
        }
    }
}
