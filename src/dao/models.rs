use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Player identifiers are supplied by the identity layer (e.g. an authenticated user id).
pub type PlayerId = String;

/// Phase of a session; governs which coordinator operations are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Players gather; roles are not assigned yet.
    Lobby,
    /// Roles and words are dealt; discussion is running.
    Started,
    /// A voting round is collecting votes.
    Voting,
    /// The imposter has been voted out and awaits the final reveal.
    Revealed,
    /// The game is over and every role is public.
    Ended,
}

/// Role dealt to a player when the session starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Knows the secret word.
    #[default]
    Player,
    /// Has to blend in without the secret word.
    Imposter,
}

/// Side that won a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    /// The imposter survived or was declared the winner by the host.
    Imposter,
    /// The imposter was voted out.
    Players,
}

/// Word dealing flavour selected when the session is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameVariant {
    /// The imposter receives no word at all.
    #[default]
    SingleWord,
    /// The imposter receives a second, different word.
    DualWord,
}

impl GameVariant {
    /// Number of distinct words a deal draws from the pool.
    pub fn words_per_deal(self) -> usize {
        match self {
            GameVariant::SingleWord => 1,
            GameVariant::DualWord => 2,
        }
    }
}

/// How `resolve_voting` breaks a tie between top-voted players.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakPolicy {
    /// Eliminate the tied target that entered the tally first.
    #[default]
    FirstSeen,
    /// Eliminate one of the tied targets uniformly at random.
    Random,
    /// Eliminate nobody when the top count is shared.
    NoElimination,
}

/// Values supplied by the coordinator when asking the store to create a session.
///
/// The store generates the identifier and the timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDraft {
    /// Display name of the session.
    pub name: String,
    /// Player that opens the lobby and drives the game.
    pub host_id: PlayerId,
    /// Host display name, copied onto feed events.
    pub host_name: String,
    /// Word dealing flavour.
    pub variant: GameVariant,
    /// Tie-break applied when resolving votes.
    pub tie_break: TieBreakPolicy,
    /// Seat limit for active players.
    pub max_players: u32,
    /// Whether spectators may join.
    pub allow_spectators: bool,
    /// Whether players joining mid-game are dealt in.
    pub allow_join_after_start: bool,
}

/// Session document shared by every subscriber of a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Primary key generated by the store.
    pub id: Uuid,
    /// Display name of the session.
    pub name: String,
    /// Only player allowed to drive transitions.
    pub host_id: PlayerId,
    /// Host display name at creation time.
    pub host_name: String,
    /// Word dealing flavour chosen at creation.
    pub variant: GameVariant,
    /// Tie-break chosen at creation.
    pub tie_break: TieBreakPolicy,
    /// Current phase of the game.
    pub phase: SessionPhase,
    /// Upper bound on connected, non-spectator, non-eliminated players.
    pub max_players: u32,
    /// Word dealt to every non-imposter; `None` until the session starts.
    pub secret_word: Option<String>,
    /// Player dealt the imposter role; `None` until the session starts.
    pub imposter_id: Option<PlayerId>,
    /// Word dealt to the imposter in the dual-word variant.
    pub imposter_word: Option<String>,
    /// Vote cycle counter, bumped whenever a resolution keeps the game going.
    pub round: u32,
    /// Whether spectators may join.
    pub allow_spectators: bool,
    /// Whether players joining mid-game are dealt in rather than made spectators.
    pub allow_join_after_start: bool,
    /// Winning side once the session has ended.
    pub winner: Option<Winner>,
    /// Player eliminated by the most recent resolution, if any.
    pub last_eliminated_id: Option<PlayerId>,
    /// When the current phase was entered; clients derive countdowns from it.
    pub phase_entered_at: SystemTime,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last write timestamp.
    pub updated_at: SystemTime,
}

impl SessionEntity {
    /// Materialize a draft into a lobby session.
    pub fn from_draft(id: Uuid, draft: SessionDraft, now: SystemTime) -> Self {
        Self {
            id,
            name: draft.name,
            host_id: draft.host_id,
            host_name: draft.host_name,
            variant: draft.variant,
            tie_break: draft.tie_break,
            phase: SessionPhase::Lobby,
            max_players: draft.max_players,
            secret_word: None,
            imposter_id: None,
            imposter_word: None,
            round: 0,
            allow_spectators: draft.allow_spectators,
            allow_join_after_start: draft.allow_join_after_start,
            winner: None,
            last_eliminated_id: None,
            phase_entered_at: now,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Player record nested under a session and keyed by player id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Identifier supplied by the identity layer.
    pub id: PlayerId,
    /// Session the record belongs to.
    pub session_id: Uuid,
    /// Display name captured at join time.
    pub name_snapshot: String,
    /// Set on the record of the session host.
    pub is_host: bool,
    /// Simulated player driven by the server.
    pub is_bot: bool,
    /// Cleared on leave; the record and its role survive a disconnect.
    pub is_connected: bool,
    /// Watches the game without a role or a vote.
    pub is_spectator: bool,
    /// Voted out in an earlier round.
    pub is_eliminated: bool,
    /// Whether a ballot was cast in the current round.
    pub has_voted: bool,
    /// Target of the current round's ballot.
    pub vote_for: Option<PlayerId>,
    /// Role dealt at start.
    pub role: Role,
    /// Word dealt at start; the single-word imposter has none.
    pub word: Option<String>,
    /// Whether the role/word may be shown to everyone.
    pub revealed: bool,
    /// First join timestamp; orders the roster.
    pub joined_at: SystemTime,
    /// Last write timestamp.
    pub updated_at: SystemTime,
}

impl PlayerEntity {
    /// Fresh connected player with default role and no word.
    pub fn new(session_id: Uuid, id: PlayerId, name: String, now: SystemTime) -> Self {
        Self {
            id,
            session_id,
            name_snapshot: name,
            is_host: false,
            is_bot: false,
            is_connected: true,
            is_spectator: false,
            is_eliminated: false,
            has_voted: false,
            vote_for: None,
            role: Role::Player,
            word: None,
            revealed: false,
            joined_at: now,
            updated_at: now,
        }
    }

    /// Connected, not spectating and still in the game.
    pub fn is_active(&self) -> bool {
        self.is_connected && !self.is_spectator && !self.is_eliminated
    }
}

/// Field-scoped update of a session document. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    /// New phase; also restamps `phase_entered_at` when it differs.
    pub phase: Option<SessionPhase>,
    /// Replacement secret word.
    pub secret_word: Option<Option<String>>,
    /// Replacement imposter.
    pub imposter_id: Option<Option<PlayerId>>,
    /// Replacement imposter word.
    pub imposter_word: Option<Option<String>>,
    /// Replacement round counter.
    pub round: Option<u32>,
    /// Replacement winner.
    pub winner: Option<Option<Winner>>,
    /// Replacement last eliminated player.
    pub last_eliminated_id: Option<Option<PlayerId>>,
}

impl SessionPatch {
    /// Patch that only moves the session to `phase`.
    pub fn phase(phase: SessionPhase) -> Self {
        Self {
            phase: Some(phase),
            ..Self::default()
        }
    }

    /// Write the present fields into `session`, stamping `updated_at` and, when the phase
    /// changes, `phase_entered_at`.
    pub fn apply(&self, session: &mut SessionEntity, now: SystemTime) {
        if let Some(phase) = self.phase {
            if session.phase != phase {
                session.phase_entered_at = now;
            }
            session.phase = phase;
        }
        if let Some(word) = &self.secret_word {
            session.secret_word = word.clone();
        }
        if let Some(imposter) = &self.imposter_id {
            session.imposter_id = imposter.clone();
        }
        if let Some(word) = &self.imposter_word {
            session.imposter_word = word.clone();
        }
        if let Some(round) = self.round {
            session.round = round;
        }
        if let Some(winner) = self.winner {
            session.winner = winner;
        }
        if let Some(eliminated) = &self.last_eliminated_id {
            session.last_eliminated_id = eliminated.clone();
        }
        session.updated_at = now;
    }
}

/// Field-scoped update of one player record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerPatch {
    /// New connection flag.
    pub is_connected: Option<bool>,
    /// New spectator flag.
    pub is_spectator: Option<bool>,
    /// New elimination flag.
    pub is_eliminated: Option<bool>,
    /// New ballot flag.
    pub has_voted: Option<bool>,
    /// New ballot target.
    pub vote_for: Option<Option<PlayerId>>,
    /// New role.
    pub role: Option<Role>,
    /// New dealt word.
    pub word: Option<Option<String>>,
    /// New reveal flag.
    pub revealed: Option<bool>,
}

impl PlayerPatch {
    /// Only flip the connection flag.
    pub fn connected(connected: bool) -> Self {
        Self {
            is_connected: Some(connected),
            ..Self::default()
        }
    }

    /// Record a ballot against `target`.
    pub fn vote(target: PlayerId) -> Self {
        Self {
            has_voted: Some(true),
            vote_for: Some(Some(target)),
            ..Self::default()
        }
    }

    /// Reset the ballot for a new round.
    pub fn clear_vote() -> Self {
        Self {
            has_voted: Some(false),
            vote_for: Some(None),
            ..Self::default()
        }
    }

    /// Hand out a role and word, clearing any previous ballot.
    pub fn deal(role: Role, word: Option<String>) -> Self {
        Self {
            role: Some(role),
            word: Some(word),
            has_voted: Some(false),
            vote_for: Some(None),
            ..Self::default()
        }
    }

    /// Remove the player from play and reveal their role.
    pub fn eliminate() -> Self {
        Self {
            is_eliminated: Some(true),
            revealed: Some(true),
            ..Self::default()
        }
    }

    /// Make the role and word visible to everyone.
    pub fn reveal() -> Self {
        Self {
            revealed: Some(true),
            ..Self::default()
        }
    }

    /// Write the present fields into `player`, stamping `updated_at`.
    pub fn apply(&self, player: &mut PlayerEntity, now: SystemTime) {
        if let Some(connected) = self.is_connected {
            player.is_connected = connected;
        }
        if let Some(spectator) = self.is_spectator {
            player.is_spectator = spectator;
        }
        if let Some(eliminated) = self.is_eliminated {
            player.is_eliminated = eliminated;
        }
        if let Some(voted) = self.has_voted {
            player.has_voted = voted;
        }
        if let Some(target) = &self.vote_for {
            player.vote_for = target.clone();
        }
        if let Some(role) = self.role {
            player.role = role;
        }
        if let Some(word) = &self.word {
            player.word = word.clone();
        }
        if let Some(revealed) = self.revealed {
            player.revealed = revealed;
        }
        player.updated_at = now;
    }
}

/// Precondition checked by the store atomically with the write it guards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlayerGuard {
    /// Always write.
    #[default]
    None,
    /// Only write while `has_voted` is false.
    HasNotVoted,
    /// Only write while the other active players leave a seat free.
    SeatAvailable,
}

/// Seat usage of a session, counted under the same lock as the guarded write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seats {
    /// Active players other than the one being written.
    pub taken: usize,
    /// Seat limit of the session.
    pub max: u32,
}

impl Seats {
    /// Count the active players of `players` other than `player_id`.
    pub fn count<'a>(
        players: impl IntoIterator<Item = &'a PlayerEntity>,
        player_id: &str,
        max: u32,
    ) -> Self {
        let taken = players
            .into_iter()
            .filter(|player| player.id != player_id && player.is_active())
            .count();
        Self { taken, max }
    }
}

impl PlayerGuard {
    /// Whether the write may go ahead for the current `player` record.
    pub fn holds(self, player: &PlayerEntity, seats: Seats) -> bool {
        match self {
            PlayerGuard::None => true,
            PlayerGuard::HasNotVoted => !player.has_voted,
            PlayerGuard::SeatAvailable => seats.taken < seats.max as usize,
        }
    }
}

/// Set of writes against one session applied as a single indivisible step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionBatch {
    /// Patch for the session document.
    pub session: Option<SessionPatch>,
    /// Patches for player records, applied in order.
    pub players: Vec<(PlayerId, PlayerPatch)>,
}

impl SessionBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the session patch.
    pub fn with_session(mut self, patch: SessionPatch) -> Self {
        self.session = Some(patch);
        self
    }

    /// Append a player patch.
    pub fn with_player(mut self, player_id: impl Into<PlayerId>, patch: PlayerPatch) -> Self {
        self.players.push((player_id.into(), patch));
        self
    }
}

/// Result of a conditional or keyed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write went through.
    Applied,
    /// The session (or a referenced player) does not exist; nothing was written.
    Missing,
    /// Insert target already exists; nothing was written.
    AlreadyExists,
    /// The write's guard did not hold; nothing was written.
    PreconditionFailed,
}

/// Kind of transient notification placed on the shared event feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A lobby was opened.
    NewSession,
    /// Roles were dealt.
    Started,
    /// A voting round opened.
    VotingStarted,
    /// The game finished.
    Ended,
}

/// Ephemeral notification record shared across all sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEntity {
    /// Feed identifier, used to expire the event.
    pub id: Uuid,
    /// What happened.
    pub kind: EventKind,
    /// Session the event is about.
    pub session_id: Uuid,
    /// Session name at the time of the event.
    pub session_name: String,
    /// Host display name at the time of the event.
    pub host_name: String,
    /// Human-readable summary.
    pub message: String,
    /// Emission timestamp; drives the TTL.
    pub created_at: SystemTime,
}
