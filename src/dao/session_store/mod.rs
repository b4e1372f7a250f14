/// In-process store backed by watch channels.
pub mod memory;

use futures::future::BoxFuture;
use tokio::sync::watch;
use uuid::Uuid;

use crate::dao::models::{
    EventEntity, PlayerEntity, PlayerGuard, PlayerId, PlayerPatch, SessionBatch, SessionDraft,
    SessionEntity, WriteOutcome,
};
use crate::dao::storage::StorageResult;

pub use self::memory::MemorySessionStore;

/// Live view of a session document; holds `None` once the session is deleted.
pub type SessionWatch = watch::Receiver<Option<SessionEntity>>;
/// Live view of a session's player collection, ordered by join time.
pub type PlayersWatch = watch::Receiver<Vec<PlayerEntity>>;
/// Live view of the shared event feed, oldest first.
pub type EventsWatch = watch::Receiver<Vec<EventEntity>>;

/// Get/set/subscribe primitives of the document store backing game sessions.
///
/// Every write is field-scoped: implementations must only touch the fields present in the
/// patch so that concurrent writers of disjoint fields never lose each other's updates.
/// A [`SessionBatch`] is applied all-or-nothing, and subscribers must never observe it
/// half-applied.
pub trait SessionStore: Send + Sync {
    /// Create a lobby session from `draft`, generating its identifier.
    fn insert_session(&self, draft: SessionDraft) -> BoxFuture<'static, StorageResult<SessionEntity>>;
    /// Current session document, if any.
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Every session, oldest first.
    fn list_sessions(&self) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>>;
    /// Create a player record if `guard` holds for it.
    ///
    /// [`WriteOutcome::AlreadyExists`] leaves the existing record untouched.
    fn insert_player(
        &self,
        session_id: Uuid,
        player: PlayerEntity,
        guard: PlayerGuard,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>>;
    /// One player record of a session.
    fn find_player(
        &self,
        session_id: Uuid,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    /// Players of a session ordered by join time.
    fn list_players(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    /// Apply `patch` to one player record if `guard` holds for its current value.
    fn update_player(
        &self,
        session_id: Uuid,
        player_id: PlayerId,
        patch: PlayerPatch,
        guard: PlayerGuard,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>>;
    /// Apply every patch of `batch` or none of them.
    fn commit_batch(
        &self,
        session_id: Uuid,
        batch: SessionBatch,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>>;
    /// Delete every player record and then the session itself. Returns whether it existed.
    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Subscribe to a session document; `None` for unknown sessions.
    fn watch_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionWatch>>>;
    /// Subscribe to a session roster; `None` for unknown sessions.
    fn watch_players(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PlayersWatch>>>;
    /// Add an event to the shared feed.
    fn append_event(&self, event: EventEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Drop an event from the feed. Returns whether it was still there.
    fn delete_event(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Subscribe to the shared feed.
    fn watch_events(&self) -> BoxFuture<'static, StorageResult<EventsWatch>>;
    /// Cheap liveness check used by the health endpoint.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
