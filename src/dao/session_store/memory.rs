//! In-process document store with field-scoped writes and watch-based fan-out.

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::{RwLock, watch};
use tracing::debug;
use uuid::Uuid;

use super::{EventsWatch, PlayersWatch, SessionStore, SessionWatch};
use crate::dao::{
    models::{
        EventEntity, PlayerEntity, PlayerGuard, PlayerId, PlayerPatch, SessionBatch,
        Seats, SessionDraft, SessionEntity, WriteOutcome,
    },
    storage::StorageResult,
};

/// Store keeping every session in memory. Cloning is cheap and shares the same data.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    sessions: DashMap<Uuid, Arc<SessionSlot>>,
    events: RwLock<IndexMap<Uuid, EventEntity>>,
    events_tx: watch::Sender<Vec<EventEntity>>,
}

impl Default for MemoryInner {
    fn default() -> Self {
        let (events_tx, _rx) = watch::channel(Vec::new());
        Self {
            sessions: DashMap::new(),
            events: RwLock::new(IndexMap::new()),
            events_tx,
        }
    }
}

/// One session document plus its nested player collection, guarded together so that batches
/// spanning both are indivisible.
struct SessionSlot {
    records: RwLock<SessionRecords>,
    session_tx: watch::Sender<Option<SessionEntity>>,
    players_tx: watch::Sender<Vec<PlayerEntity>>,
}

struct SessionRecords {
    session: SessionEntity,
    players: IndexMap<PlayerId, PlayerEntity>,
}

impl SessionRecords {
    fn seats(&self, player_id: &str) -> Seats {
        Seats::count(self.players.values(), player_id, self.session.max_players)
    }
}

impl SessionSlot {
    fn new(session: SessionEntity) -> Self {
        let (session_tx, _rx) = watch::channel(Some(session.clone()));
        let (players_tx, _rx) = watch::channel(Vec::new());
        Self {
            records: RwLock::new(SessionRecords {
                session,
                players: IndexMap::new(),
            }),
            session_tx,
            players_tx,
        }
    }

    /// Push the current records to subscribers. Players go first so that anyone reacting to a
    /// session change already finds the matching player state.
    fn publish(&self, records: &SessionRecords, players_changed: bool, session_changed: bool) {
        if players_changed {
            self.players_tx
                .send_replace(records.players.values().cloned().collect());
        }
        if session_changed {
            self.session_tx.send_replace(Some(records.session.clone()));
        }
    }
}

impl MemorySessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: Uuid) -> Option<Arc<SessionSlot>> {
        self.inner.sessions.get(&id).map(|entry| entry.value().clone())
    }

    async fn insert_session(&self, draft: SessionDraft) -> SessionEntity {
        let session = SessionEntity::from_draft(Uuid::new_v4(), draft, SystemTime::now());
        self.inner
            .sessions
            .insert(session.id, Arc::new(SessionSlot::new(session.clone())));
        debug!(session.id = %session.id, "session document created");
        session
    }

    async fn find_session(&self, id: Uuid) -> Option<SessionEntity> {
        let slot = self.slot(id)?;
        let records = slot.records.read().await;
        Some(records.session.clone())
    }

    async fn list_sessions(&self) -> Vec<SessionEntity> {
        let slots: Vec<Arc<SessionSlot>> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut sessions = Vec::with_capacity(slots.len());
        for slot in slots {
            sessions.push(slot.records.read().await.session.clone());
        }
        sessions.sort_by_key(|session| session.created_at);
        sessions
    }

    async fn insert_player(
        &self,
        session_id: Uuid,
        player: PlayerEntity,
        guard: PlayerGuard,
    ) -> WriteOutcome {
        let Some(slot) = self.slot(session_id) else {
            return WriteOutcome::Missing;
        };
        let mut records = slot.records.write().await;
        if records.players.contains_key(&player.id) {
            return WriteOutcome::AlreadyExists;
        }
        if !guard.holds(&player, records.seats(&player.id)) {
            return WriteOutcome::PreconditionFailed;
        }
        records.players.insert(player.id.clone(), player);
        slot.publish(&records, true, false);
        WriteOutcome::Applied
    }

    async fn find_player(&self, session_id: Uuid, player_id: PlayerId) -> Option<PlayerEntity> {
        let slot = self.slot(session_id)?;
        let records = slot.records.read().await;
        records.players.get(&player_id).cloned()
    }

    async fn list_players(&self, session_id: Uuid) -> Vec<PlayerEntity> {
        let Some(slot) = self.slot(session_id) else {
            return Vec::new();
        };
        let records = slot.records.read().await;
        records.players.values().cloned().collect()
    }

    async fn update_player(
        &self,
        session_id: Uuid,
        player_id: PlayerId,
        patch: PlayerPatch,
        guard: PlayerGuard,
    ) -> WriteOutcome {
        let Some(slot) = self.slot(session_id) else {
            return WriteOutcome::Missing;
        };
        let mut records = slot.records.write().await;
        let seats = records.seats(&player_id);
        let Some(player) = records.players.get_mut(&player_id) else {
            return WriteOutcome::Missing;
        };
        if !guard.holds(player, seats) {
            return WriteOutcome::PreconditionFailed;
        }
        patch.apply(player, SystemTime::now());
        slot.publish(&records, true, false);
        WriteOutcome::Applied
    }

    async fn commit_batch(&self, session_id: Uuid, batch: SessionBatch) -> WriteOutcome {
        let Some(slot) = self.slot(session_id) else {
            return WriteOutcome::Missing;
        };
        let mut records = slot.records.write().await;

        // Validate every target before touching anything.
        if batch
            .players
            .iter()
            .any(|(player_id, _)| !records.players.contains_key(player_id))
        {
            return WriteOutcome::Missing;
        }

        let now = SystemTime::now();
        for (player_id, patch) in &batch.players {
            if let Some(player) = records.players.get_mut(player_id) {
                patch.apply(player, now);
            }
        }
        if let Some(patch) = &batch.session {
            patch.apply(&mut records.session, now);
        }

        slot.publish(&records, !batch.players.is_empty(), batch.session.is_some());
        WriteOutcome::Applied
    }

    async fn delete_session(&self, id: Uuid) -> bool {
        let Some((_, slot)) = self.inner.sessions.remove(&id) else {
            return false;
        };
        let mut records = slot.records.write().await;
        let removed = records.players.len();
        records.players.clear();
        slot.players_tx.send_replace(Vec::new());
        slot.session_tx.send_replace(None);
        debug!(session.id = %id, players = removed, "session document deleted");
        true
    }

    async fn append_event(&self, event: EventEntity) {
        let mut events = self.inner.events.write().await;
        events.insert(event.id, event);
        self.inner
            .events_tx
            .send_replace(events.values().cloned().collect());
    }

    async fn delete_event(&self, id: Uuid) -> bool {
        let mut events = self.inner.events.write().await;
        let removed = events.shift_remove(&id).is_some();
        if removed {
            self.inner
                .events_tx
                .send_replace(events.values().cloned().collect());
        }
        removed
    }
}

impl SessionStore for MemorySessionStore {
    fn insert_session(&self, draft: SessionDraft) -> BoxFuture<'static, StorageResult<SessionEntity>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.insert_session(draft).await) })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.find_session(id).await) })
    }

    fn list_sessions(&self) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.list_sessions().await) })
    }

    fn insert_player(
        &self,
        session_id: Uuid,
        player: PlayerEntity,
        guard: PlayerGuard,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.insert_player(session_id, player, guard).await) })
    }

    fn find_player(
        &self,
        session_id: Uuid,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.find_player(session_id, player_id).await) })
    }

    fn list_players(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.list_players(session_id).await) })
    }

    fn update_player(
        &self,
        session_id: Uuid,
        player_id: PlayerId,
        patch: PlayerPatch,
        guard: PlayerGuard,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .update_player(session_id, player_id, patch, guard)
                .await)
        })
    }

    fn commit_batch(
        &self,
        session_id: Uuid,
        batch: SessionBatch,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.commit_batch(session_id, batch).await) })
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.delete_session(id).await) })
    }

    fn watch_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionWatch>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.slot(id).map(|slot| slot.session_tx.subscribe())) })
    }

    fn watch_players(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PlayersWatch>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.slot(id).map(|slot| slot.players_tx.subscribe())) })
    }

    fn append_event(&self, event: EventEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.append_event(event).await;
            Ok(())
        })
    }

    fn delete_event(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.delete_event(id).await) })
    }

    fn watch_events(&self) -> BoxFuture<'static, StorageResult<EventsWatch>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.events_tx.subscribe()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{GameVariant, Role, SessionPatch, SessionPhase, TieBreakPolicy};

    fn draft() -> SessionDraft {
        SessionDraft {
            name: "friday".into(),
            host_id: "host".into(),
            host_name: "Hostess".into(),
            variant: GameVariant::SingleWord,
            tie_break: TieBreakPolicy::FirstSeen,
            max_players: 10,
            allow_spectators: true,
            allow_join_after_start: false,
        }
    }

    fn player(session_id: Uuid, id: &str) -> PlayerEntity {
        PlayerEntity::new(session_id, id.into(), id.to_uppercase(), SystemTime::now())
    }

    #[tokio::test]
    async fn insert_player_never_duplicates() {
        let store = MemorySessionStore::new();
        let session = store.insert_session(draft()).await;

        assert_eq!(
            store.insert_player(session.id, player(session.id, "a"), PlayerGuard::None).await,
            WriteOutcome::Applied
        );
        assert_eq!(
            store.insert_player(session.id, player(session.id, "a"), PlayerGuard::None).await,
            WriteOutcome::AlreadyExists
        );
        assert_eq!(store.list_players(session.id).await.len(), 1);
    }

    #[tokio::test]
    async fn seat_guard_counts_active_players_under_the_write_lock() {
        let store = MemorySessionStore::new();
        let session = store
            .insert_session(SessionDraft {
                max_players: 2,
                ..draft()
            })
            .await;

        let (a, b, c) = tokio::join!(
            store.insert_player(session.id, player(session.id, "a"), PlayerGuard::SeatAvailable),
            store.insert_player(session.id, player(session.id, "b"), PlayerGuard::SeatAvailable),
            store.insert_player(session.id, player(session.id, "c"), PlayerGuard::SeatAvailable),
        );
        let applied = [a, b, c]
            .into_iter()
            .filter(|outcome| *outcome == WriteOutcome::Applied)
            .count();
        assert_eq!(applied, 2);

        let mut watcher = player(session.id, "w");
        watcher.is_spectator = true;
        assert_eq!(
            store.insert_player(session.id, watcher, PlayerGuard::None).await,
            WriteOutcome::Applied
        );
        let take_seat = PlayerPatch {
            is_spectator: Some(false),
            ..PlayerPatch::default()
        };
        assert_eq!(
            store
                .update_player(session.id, "w".into(), take_seat.clone(), PlayerGuard::SeatAvailable)
                .await,
            WriteOutcome::PreconditionFailed
        );

        let seated = store.list_players(session.id).await;
        store
            .update_player(
                session.id,
                seated[0].id.clone(),
                PlayerPatch::connected(false),
                PlayerGuard::None,
            )
            .await;
        assert_eq!(
            store
                .update_player(session.id, "w".into(), take_seat, PlayerGuard::SeatAvailable)
                .await,
            WriteOutcome::Applied
        );
    }

    #[tokio::test]
    async fn players_are_listed_in_join_order() {
        let store = MemorySessionStore::new();
        let session = store.insert_session(draft()).await;
        for id in ["c", "a", "b"] {
            store.insert_player(session.id, player(session.id, id), PlayerGuard::None).await;
        }

        let ids: Vec<_> = store
            .list_players(session.id)
            .await
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn guarded_update_rejects_second_vote() {
        let store = MemorySessionStore::new();
        let session = store.insert_session(draft()).await;
        store.insert_player(session.id, player(session.id, "a"), PlayerGuard::None).await;

        let first = store
            .update_player(
                session.id,
                "a".into(),
                PlayerPatch::vote("b".into()),
                PlayerGuard::HasNotVoted,
            )
            .await;
        let second = store
            .update_player(
                session.id,
                "a".into(),
                PlayerPatch::vote("c".into()),
                PlayerGuard::HasNotVoted,
            )
            .await;

        assert_eq!(first, WriteOutcome::Applied);
        assert_eq!(second, WriteOutcome::PreconditionFailed);
        let stored = store.find_player(session.id, "a".into()).await.unwrap();
        assert_eq!(stored.vote_for.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn concurrent_field_writes_do_not_clobber_each_other() {
        let store = MemorySessionStore::new();
        let session = store.insert_session(draft()).await;
        store.insert_player(session.id, player(session.id, "a"), PlayerGuard::None).await;

        let (connected, voted) = tokio::join!(
            store.update_player(
                session.id,
                "a".into(),
                PlayerPatch::connected(false),
                PlayerGuard::None
            ),
            store.update_player(
                session.id,
                "a".into(),
                PlayerPatch::vote("b".into()),
                PlayerGuard::None
            ),
        );
        assert_eq!(connected, WriteOutcome::Applied);
        assert_eq!(voted, WriteOutcome::Applied);

        let stored = store.find_player(session.id, "a".into()).await.unwrap();
        assert!(!stored.is_connected);
        assert!(stored.has_voted);
    }

    #[tokio::test]
    async fn batch_with_unknown_player_writes_nothing() {
        let store = MemorySessionStore::new();
        let session = store.insert_session(draft()).await;
        store.insert_player(session.id, player(session.id, "a"), PlayerGuard::None).await;

        let batch = SessionBatch::new()
            .with_session(SessionPatch::phase(SessionPhase::Started))
            .with_player("a", PlayerPatch::deal(Role::Imposter, None))
            .with_player("ghost", PlayerPatch::deal(Role::Player, Some("word".into())));

        assert_eq!(
            store.commit_batch(session.id, batch).await,
            WriteOutcome::Missing
        );
        let stored = store.find_session(session.id).await.unwrap();
        assert_eq!(stored.phase, SessionPhase::Lobby);
        let a = store.find_player(session.id, "a".into()).await.unwrap();
        assert_eq!(a.role, Role::Player);
    }

    #[tokio::test]
    async fn subscribers_see_players_before_session_change() {
        let store = MemorySessionStore::new();
        let session = store.insert_session(draft()).await;
        store.insert_player(session.id, player(session.id, "a"), PlayerGuard::None).await;

        let mut session_rx = store.inner.sessions.get(&session.id).unwrap().session_tx.subscribe();
        let players_rx = store.inner.sessions.get(&session.id).unwrap().players_tx.subscribe();

        let batch = SessionBatch::new()
            .with_session(SessionPatch::phase(SessionPhase::Started))
            .with_player("a", PlayerPatch::deal(Role::Imposter, None));
        store.commit_batch(session.id, batch).await;

        session_rx.changed().await.unwrap();
        let phase = session_rx.borrow().as_ref().map(|s| s.phase);
        assert_eq!(phase, Some(SessionPhase::Started));
        assert_eq!(players_rx.borrow()[0].role, Role::Imposter);
    }

    #[tokio::test]
    async fn delete_session_notifies_watchers() {
        let store = MemorySessionStore::new();
        let session = store.insert_session(draft()).await;
        store.insert_player(session.id, player(session.id, "a"), PlayerGuard::None).await;
        let mut session_rx = store.inner.sessions.get(&session.id).unwrap().session_tx.subscribe();

        assert!(store.delete_session(session.id).await);
        session_rx.changed().await.unwrap();
        assert!(session_rx.borrow().is_none());
        assert!(store.list_players(session.id).await.is_empty());
        assert!(!store.delete_session(session.id).await);
    }

    #[tokio::test]
    async fn event_feed_tracks_appends_and_deletes() {
        let store = MemorySessionStore::new();
        let rx = store.inner.events_tx.subscribe();
        let event = EventEntity {
            id: Uuid::new_v4(),
            kind: crate::dao::models::EventKind::NewSession,
            session_id: Uuid::new_v4(),
            session_name: "friday".into(),
            host_name: "Hostess".into(),
            message: "new".into(),
            created_at: SystemTime::now(),
        };

        store.append_event(event.clone()).await;
        assert_eq!(rx.borrow().len(), 1);
        assert!(store.delete_event(event.id).await);
        assert!(rx.borrow().is_empty());
    }
}
