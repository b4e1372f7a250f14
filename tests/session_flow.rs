use std::{io, sync::Arc, time::Duration};

use futures::future::{self, BoxFuture, FutureExt};
use imposter_back::{
    config::AppConfig,
    dao::{
        models::{
            EventEntity, EventKind, GameVariant, PlayerEntity, PlayerGuard, PlayerId,
            PlayerPatch, Role, SessionBatch, SessionDraft, SessionEntity, SessionPhase,
            TieBreakPolicy, Winner, WriteOutcome,
        },
        session_store::{
            EventsWatch, MemorySessionStore, PlayersWatch, SessionStore, SessionWatch,
        },
        storage::{StorageError, StorageResult},
    },
    error::ServiceError,
    services::{
        health_service,
        session_service::{self, SessionOptions},
    },
    state::{AppState, SharedState},
};
use tokio::time::{sleep, timeout};
use uuid::Uuid;

const HOST: &str = "p1";

fn quiet_config() -> AppConfig {
    AppConfig::default()
        .with_words(["ALPHA"])
        .with_rng_seed(7)
        .with_bot_timing(
            Duration::from_secs(30),
            Duration::from_secs(1),
            Duration::ZERO,
        )
}

/// Seats named by the imposter's position: `b` is always the imposter.
struct Table {
    id: Uuid,
    a: PlayerId,
    b: PlayerId,
    c: PlayerId,
    d: PlayerId,
}

async fn lobby(state: &SharedState, options: SessionOptions, guests: &[&str]) -> Uuid {
    let session = session_service::create_session(state, HOST, "Host", "Friday", options)
        .await
        .unwrap();
    for guest in guests {
        session_service::join_session(state, session.id, guest, guest, false)
            .await
            .unwrap();
    }
    session.id
}

async fn started_table(state: &SharedState) -> Table {
    started_table_with(state, SessionOptions::default()).await
}

async fn started_table_with(state: &SharedState, options: SessionOptions) -> Table {
    let id = lobby(state, options, &["p2", "p3", "p4"]).await;
    let session = session_service::start_session(state, id, HOST).await.unwrap();
    let imposter = session.imposter_id.clone().unwrap();

    let mut others: Vec<PlayerId> = ["p1", "p2", "p3", "p4"]
        .into_iter()
        .filter(|id| *id != imposter)
        .map(String::from)
        .collect();
    let d = others.pop().unwrap();
    let c = others.pop().unwrap();
    let a = others.pop().unwrap();
    Table {
        id,
        a,
        b: imposter,
        c,
        d,
    }
}

async fn player(state: &SharedState, id: Uuid, player_id: &str) -> PlayerEntity {
    session_service::list_players(state, id)
        .await
        .unwrap()
        .into_iter()
        .find(|player| player.id == player_id)
        .unwrap()
}

async fn vote(state: &SharedState, id: Uuid, voter: &str, target: &str) {
    session_service::cast_vote(state, id, voter, target)
        .await
        .unwrap();
}

#[tokio::test]
async fn start_deals_the_word_to_everyone_but_the_imposter() {
    let state = AppState::in_memory(quiet_config());
    let table = started_table(&state).await;

    let session = session_service::get_session(&state, table.id).await.unwrap();
    assert_eq!(session.phase, SessionPhase::Started);
    assert_eq!(session.round, 1);
    assert_eq!(session.secret_word.as_deref(), Some("ALPHA"));
    assert_eq!(session.imposter_word, None);

    let players = session_service::list_players(&state, table.id).await.unwrap();
    let imposters: Vec<&PlayerEntity> = players
        .iter()
        .filter(|player| player.role == Role::Imposter)
        .collect();
    assert_eq!(imposters.len(), 1);
    assert_eq!(imposters[0].id, table.b);
    assert_eq!(imposters[0].word, None);

    for seat in [&table.a, &table.c, &table.d] {
        let player = player(&state, table.id, seat).await;
        assert_eq!(player.role, Role::Player);
        assert_eq!(player.word.as_deref(), Some("ALPHA"));
    }
}

#[tokio::test]
async fn dual_word_games_hand_the_imposter_a_different_word() {
    let state = AppState::in_memory(quiet_config().with_words(["ALPHA", "BRAVO"]));
    let options = SessionOptions {
        variant: GameVariant::DualWord,
        ..SessionOptions::default()
    };
    let id = lobby(&state, options, &["p2", "p3"]).await;
    let session = session_service::start_session(&state, id, HOST).await.unwrap();

    let secret = session.secret_word.clone().unwrap();
    let decoy = session.imposter_word.clone().unwrap();
    assert_ne!(secret, decoy);

    let imposter = player(&state, id, session.imposter_id.as_deref().unwrap()).await;
    assert_eq!(imposter.word.as_deref(), Some(decoy.as_str()));
}

#[tokio::test]
async fn majority_against_the_imposter_reveals_and_players_win() {
    let state = AppState::in_memory(quiet_config());
    let table = started_table(&state).await;
    session_service::start_voting(&state, table.id, HOST)
        .await
        .unwrap();

    vote(&state, table.id, &table.a, &table.c).await;
    vote(&state, table.id, &table.c, &table.b).await;
    vote(&state, table.id, &table.d, &table.b).await;
    vote(&state, table.id, &table.b, &table.a).await;

    let report = session_service::resolve_voting(&state, table.id, HOST)
        .await
        .unwrap();
    assert_eq!(report.tally.counts.get(&table.b), Some(&2));
    assert_eq!(report.tally.counts.get(&table.c), Some(&1));
    assert_eq!(report.tally.counts.get(&table.a), Some(&1));
    assert_eq!(report.tally.eliminated.as_deref(), Some(table.b.as_str()));
    assert!(report.was_imposter);
    assert_eq!(report.next_phase, SessionPhase::Revealed);

    let eliminated = player(&state, table.id, &table.b).await;
    assert!(eliminated.is_eliminated);
    assert_eq!(eliminated.role, Role::Imposter);

    let session = session_service::end_session(&state, table.id, HOST, None)
        .await
        .unwrap();
    assert_eq!(session.phase, SessionPhase::Ended);
    assert_eq!(session.winner, Some(Winner::Players));
}

#[tokio::test]
async fn second_voting_pattern_also_catches_the_imposter() {
    let state = AppState::in_memory(quiet_config());
    let table = started_table(&state).await;
    session_service::start_voting(&state, table.id, HOST)
        .await
        .unwrap();

    vote(&state, table.id, &table.a, &table.b).await;
    vote(&state, table.id, &table.c, &table.d).await;
    vote(&state, table.id, &table.d, &table.b).await;
    vote(&state, table.id, &table.b, &table.c).await;

    let report = session_service::resolve_voting(&state, table.id, HOST)
        .await
        .unwrap();
    assert_eq!(report.tally.counts.get(&table.b), Some(&2));
    assert_eq!(report.tally.counts.get(&table.d), Some(&1));
    assert_eq!(report.tally.counts.get(&table.c), Some(&1));
    assert!(report.was_imposter);

    let session = session_service::end_session(&state, table.id, HOST, Some(Winner::Players))
        .await
        .unwrap();
    assert_eq!(session.winner, Some(Winner::Players));
    assert!(
        session_service::list_players(&state, table.id)
            .await
            .unwrap()
            .iter()
            .all(|player| player.revealed)
    );
}

#[tokio::test]
async fn eliminating_an_innocent_starts_the_next_round() {
    let state = AppState::in_memory(quiet_config());
    let table = started_table(&state).await;
    session_service::start_voting(&state, table.id, HOST)
        .await
        .unwrap();

    vote(&state, table.id, &table.a, &table.c).await;
    vote(&state, table.id, &table.b, &table.a).await;
    vote(&state, table.id, &table.c, &table.a).await;
    vote(&state, table.id, &table.d, &table.a).await;

    let report = session_service::resolve_voting(&state, table.id, HOST)
        .await
        .unwrap();
    assert!(!report.was_imposter);
    assert_eq!(report.next_phase, SessionPhase::Started);
    assert_eq!(report.round, 2);

    let session = session_service::get_session(&state, table.id).await.unwrap();
    assert_eq!(session.phase, SessionPhase::Started);
    assert_eq!(session.round, 2);
    assert_eq!(session.last_eliminated_id.as_deref(), Some(table.a.as_str()));

    // The eliminated player neither votes nor receives votes in the next round.
    session_service::start_voting(&state, table.id, HOST)
        .await
        .unwrap();
    assert!(matches!(
        session_service::cast_vote(&state, table.id, &table.a, &table.b).await,
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        session_service::cast_vote(&state, table.id, &table.b, &table.a).await,
        Err(ServiceError::InvalidTarget(_))
    ));

    let progress = session_service::voting_progress(&state, table.id)
        .await
        .unwrap();
    assert_eq!(progress.eligible, 3);
    assert_eq!(progress.cast, 0);
}

#[tokio::test]
async fn tied_vote_without_elimination_starts_the_next_round() {
    let state = AppState::in_memory(quiet_config());
    let options = SessionOptions {
        tie_break: TieBreakPolicy::NoElimination,
        ..SessionOptions::default()
    };
    let table = started_table_with(&state, options).await;
    session_service::start_voting(&state, table.id, HOST)
        .await
        .unwrap();

    vote(&state, table.id, &table.a, &table.b).await;
    vote(&state, table.id, &table.b, &table.a).await;
    vote(&state, table.id, &table.c, &table.b).await;
    vote(&state, table.id, &table.d, &table.a).await;

    let report = session_service::resolve_voting(&state, table.id, HOST)
        .await
        .unwrap();
    assert_eq!(report.tally.eliminated, None);
    assert_eq!(report.tally.tied.len(), 2);
    assert!(!report.was_imposter);
    assert_eq!(report.next_phase, SessionPhase::Started);
    assert_eq!(report.round, 2);

    let session = session_service::get_session(&state, table.id).await.unwrap();
    assert_eq!(session.round, 2);
    assert_eq!(session.last_eliminated_id, None);
    assert!(
        session_service::list_players(&state, table.id)
            .await
            .unwrap()
            .iter()
            .all(|player| !player.is_eliminated)
    );
}

#[tokio::test]
async fn spectators_cannot_vote() {
    let state = AppState::in_memory(quiet_config());
    let table = started_table(&state).await;
    let watcher = session_service::join_session(&state, table.id, "p9", "Watcher", true)
        .await
        .unwrap();
    assert!(watcher.is_spectator);

    session_service::start_voting(&state, table.id, HOST)
        .await
        .unwrap();
    assert!(matches!(
        session_service::cast_vote(&state, table.id, "p9", &table.b).await,
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        session_service::cast_vote(&state, table.id, &table.a, "p9").await,
        Err(ServiceError::InvalidTarget(_))
    ));
    let progress = session_service::voting_progress(&state, table.id)
        .await
        .unwrap();
    assert_eq!(progress.eligible, 4);
    assert_eq!(progress.cast, 0);
}

#[tokio::test]
async fn ballots_are_validated() {
    let state = AppState::in_memory(quiet_config());
    let table = started_table(&state).await;

    assert!(matches!(
        session_service::cast_vote(&state, table.id, &table.a, &table.b).await,
        Err(ServiceError::InvalidPhase(_))
    ));

    session_service::start_voting(&state, table.id, HOST)
        .await
        .unwrap();
    assert!(matches!(
        session_service::cast_vote(&state, table.id, &table.a, &table.a).await,
        Err(ServiceError::SelfVote)
    ));
    assert!(matches!(
        session_service::cast_vote(&state, table.id, &table.a, "nobody").await,
        Err(ServiceError::InvalidTarget(_))
    ));
    assert!(matches!(
        session_service::cast_vote(&state, table.id, "stranger", &table.a).await,
        Err(ServiceError::Forbidden(_))
    ));

    vote(&state, table.id, &table.a, &table.b).await;
    assert!(matches!(
        session_service::cast_vote(&state, table.id, &table.a, &table.c).await,
        Err(ServiceError::DuplicateVote)
    ));
    let voter = player(&state, table.id, &table.a).await;
    assert_eq!(voter.vote_for.as_deref(), Some(table.b.as_str()));
}

#[tokio::test]
async fn concurrent_ballots_from_one_voter_count_once() {
    let state = AppState::in_memory(quiet_config());
    let table = started_table(&state).await;
    session_service::start_voting(&state, table.id, HOST)
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        session_service::cast_vote(&state, table.id, &table.a, &table.b),
        session_service::cast_vote(&state, table.id, &table.a, &table.c),
    );
    assert_eq!(
        [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
        1
    );

    let progress = session_service::voting_progress(&state, table.id)
        .await
        .unwrap();
    assert_eq!(progress.cast, 1);
}

#[tokio::test]
async fn only_the_host_drives_the_game() {
    let state = AppState::in_memory(quiet_config());
    let table = started_table(&state).await;
    let guest = if table.a == HOST { &table.c } else { &table.a };

    assert!(matches!(
        session_service::start_voting(&state, table.id, guest).await,
        Err(ServiceError::Forbidden(_))
    ));
    session_service::start_voting(&state, table.id, HOST)
        .await
        .unwrap();
    assert!(matches!(
        session_service::resolve_voting(&state, table.id, guest).await,
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        session_service::end_session(&state, table.id, guest, None).await,
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        session_service::delete_session(&state, table.id, guest).await,
        Err(ServiceError::Forbidden(_))
    ));
}

#[tokio::test]
async fn two_players_cannot_start() {
    let state = AppState::in_memory(quiet_config());
    let id = lobby(&state, SessionOptions::default(), &["p2"]).await;

    assert!(matches!(
        session_service::start_session(&state, id, HOST).await,
        Err(ServiceError::InsufficientPlayers {
            needed: 3,
            found: 2
        })
    ));
    let session = session_service::get_session(&state, id).await.unwrap();
    assert_eq!(session.phase, SessionPhase::Lobby);
    assert_eq!(session.imposter_id, None);
}

#[tokio::test]
async fn full_lobby_only_accepts_spectators() {
    let state = AppState::in_memory(quiet_config());
    let options = SessionOptions {
        max_players: Some(3),
        ..SessionOptions::default()
    };
    let id = lobby(&state, options, &["p2", "p3"]).await;

    assert!(matches!(
        session_service::join_session(&state, id, "p4", "p4", false).await,
        Err(ServiceError::Capacity { max: 3 })
    ));
    let watcher = session_service::join_session(&state, id, "p4", "p4", true)
        .await
        .unwrap();
    assert!(watcher.is_spectator);
    assert_eq!(
        session_service::list_players(&state, id)
            .await
            .unwrap()
            .len(),
        4
    );
}

#[tokio::test]
async fn rejoining_reconnects_the_same_record() {
    let state = AppState::in_memory(quiet_config());
    let id = lobby(&state, SessionOptions::default(), &["p2"]).await;
    let first = player(&state, id, "p2").await;

    let again = session_service::join_session(&state, id, "p2", "p2", false)
        .await
        .unwrap();
    assert_eq!(again.joined_at, first.joined_at);

    session_service::leave_session(&state, id, "p2").await.unwrap();
    assert!(!player(&state, id, "p2").await.is_connected);

    session_service::join_session(&state, id, "p2", "p2", false)
        .await
        .unwrap();
    let players = session_service::list_players(&state, id).await.unwrap();
    assert_eq!(players.len(), 2);
    assert!(players.iter().all(|player| player.is_connected));
}

#[tokio::test]
async fn reconnecting_mid_game_keeps_the_dealt_role() {
    let state = AppState::in_memory(quiet_config());
    let table = started_table(&state).await;

    session_service::leave_session(&state, table.id, &table.b)
        .await
        .unwrap();
    let back = session_service::join_session(&state, table.id, &table.b, "B", false)
        .await
        .unwrap();
    assert_eq!(back.role, Role::Imposter);
    assert!(back.is_connected && !back.is_spectator);
}

#[tokio::test]
async fn late_joiners_are_dealt_in_when_allowed() {
    let state = AppState::in_memory(quiet_config());
    let options = SessionOptions {
        allow_join_after_start: true,
        ..SessionOptions::default()
    };
    let table = started_table_with(&state, options).await;

    let late = session_service::join_session(&state, table.id, "p9", "Late", false)
        .await
        .unwrap();
    assert!(!late.is_spectator);
    assert_eq!(late.role, Role::Player);
    assert_eq!(late.word.as_deref(), Some("ALPHA"));

    let stored = player(&state, table.id, "p9").await;
    assert!(stored.is_active());
    assert_eq!(stored.word.as_deref(), Some("ALPHA"));

    session_service::start_voting(&state, table.id, HOST)
        .await
        .unwrap();
    vote(&state, table.id, "p9", &table.b).await;
}

/// Lobby of five where `p5` disconnects before the deal.
async fn started_without_p5(state: &SharedState, allow_join_after_start: bool) -> Uuid {
    let options = SessionOptions {
        allow_join_after_start,
        ..SessionOptions::default()
    };
    let id = lobby(state, options, &["p2", "p3", "p4", "p5"]).await;
    session_service::leave_session(state, id, "p5").await.unwrap();
    let session = session_service::start_session(state, id, HOST).await.unwrap();
    assert_ne!(session.imposter_id.as_deref(), Some("p5"));
    assert_eq!(player(state, id, "p5").await.word, None);
    id
}

#[tokio::test]
async fn missing_the_deal_is_made_up_on_reconnect_when_allowed() {
    let state = AppState::in_memory(quiet_config());
    let id = started_without_p5(&state, true).await;

    let back = session_service::join_session(&state, id, "p5", "p5", false)
        .await
        .unwrap();
    assert!(back.is_connected && !back.is_spectator);
    assert_eq!(back.role, Role::Player);
    assert_eq!(back.word.as_deref(), Some("ALPHA"));
    assert_eq!(player(&state, id, "p5").await.word.as_deref(), Some("ALPHA"));
}

#[tokio::test]
async fn missing_the_deal_turns_a_reconnect_into_a_spectator() {
    let state = AppState::in_memory(quiet_config());
    let id = started_without_p5(&state, false).await;

    let back = session_service::join_session(&state, id, "p5", "p5", false)
        .await
        .unwrap();
    assert!(back.is_connected && back.is_spectator);
    assert_eq!(back.word, None);

    session_service::start_voting(&state, id, HOST).await.unwrap();
    assert!(matches!(
        session_service::cast_vote(&state, id, "p5", "p2").await,
        Err(ServiceError::Forbidden(_))
    ));
}

#[tokio::test]
async fn concurrent_joins_never_overfill_the_lobby() {
    let state = AppState::new(
        Arc::new(YieldingStore(Arc::new(MemorySessionStore::new()))),
        quiet_config(),
    );
    let options = SessionOptions {
        max_players: Some(3),
        ..SessionOptions::default()
    };
    let id = lobby(&state, options, &[]).await;

    let results = {
        let (p2, p3, p4, p5) = tokio::join!(
            session_service::join_session(&state, id, "p2", "p2", false),
            session_service::join_session(&state, id, "p3", "p3", false),
            session_service::join_session(&state, id, "p4", "p4", false),
            session_service::join_session(&state, id, "p5", "p5", false),
        );
        [p2, p3, p4, p5]
    };
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 2);
    for refused in results.iter().filter_map(|result| result.as_ref().err()) {
        assert!(matches!(refused, ServiceError::Capacity { max: 3 }));
    }

    let players = session_service::list_players(&state, id).await.unwrap();
    assert_eq!(players.iter().filter(|player| player.is_active()).count(), 3);
}

#[tokio::test]
async fn events_expire_after_their_ttl() {
    let state = AppState::in_memory(quiet_config().with_event_ttl(Duration::from_millis(100)));
    let mut feed = state.store().watch_events().await.unwrap();

    let id = lobby(&state, SessionOptions::default(), &[]).await;
    {
        let events = feed.borrow_and_update();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::NewSession);
        assert_eq!(events[0].session_id, id);
    }

    timeout(Duration::from_secs(2), async {
        while !feed.borrow_and_update().is_empty() {
            feed.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn bots_vote_on_their_own() {
    let config = quiet_config().with_bot_timing(
        Duration::from_millis(10),
        Duration::from_millis(5),
        Duration::ZERO,
    );
    let state = AppState::in_memory(config);
    let id = lobby(&state, SessionOptions::default(), &[]).await;
    for _ in 0..3 {
        session_service::add_bot(&state, id, HOST).await.unwrap();
    }
    session_service::start_session(&state, id, HOST).await.unwrap();
    session_service::start_voting(&state, id, HOST).await.unwrap();

    timeout(Duration::from_secs(2), async {
        loop {
            let progress = session_service::voting_progress(&state, id).await.unwrap();
            if progress.cast == 3 {
                assert_eq!(progress.humans_cast, 0);
                assert!(!progress.all_humans_voted());
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    for bot in session_service::list_players(&state, id)
        .await
        .unwrap()
        .iter()
        .filter(|player| player.is_bot)
    {
        assert!(bot.has_voted);
        assert_ne!(bot.vote_for.as_deref(), Some(bot.id.as_str()));
    }
}

#[tokio::test]
async fn resolving_cancels_pending_bot_votes() {
    let state = AppState::in_memory(quiet_config());
    let id = lobby(&state, SessionOptions::default(), &["p2"]).await;
    session_service::add_bot(&state, id, HOST).await.unwrap();
    session_service::add_bot(&state, id, HOST).await.unwrap();
    session_service::start_session(&state, id, HOST).await.unwrap();
    session_service::start_voting(&state, id, HOST).await.unwrap();
    assert_eq!(state.pending_bot_tasks(id), 2);

    let report = session_service::resolve_voting(&state, id, HOST)
        .await
        .unwrap();
    assert_eq!(report.tally.ballots(), 0);
    assert_eq!(state.pending_bot_tasks(id), 0);
}

/// In-memory store that hands control back to the scheduler before every operation, so that
/// concurrent callers interleave between their reads and writes.
struct YieldingStore(Arc<dyn SessionStore>);

fn after_yield<T: Send + 'static>(
    op: BoxFuture<'static, StorageResult<T>>,
) -> BoxFuture<'static, StorageResult<T>> {
    async move {
        tokio::task::yield_now().await;
        op.await
    }
    .boxed()
}

impl SessionStore for YieldingStore {
    fn insert_session(
        &self,
        draft: SessionDraft,
    ) -> BoxFuture<'static, StorageResult<SessionEntity>> {
        after_yield(self.0.insert_session(draft))
    }
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        after_yield(self.0.find_session(id))
    }
    fn list_sessions(&self) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        after_yield(self.0.list_sessions())
    }
    fn insert_player(
        &self,
        session_id: Uuid,
        player: PlayerEntity,
        guard: PlayerGuard,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        after_yield(self.0.insert_player(session_id, player, guard))
    }
    fn find_player(
        &self,
        session_id: Uuid,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        after_yield(self.0.find_player(session_id, player_id))
    }
    fn list_players(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        after_yield(self.0.list_players(session_id))
    }
    fn update_player(
        &self,
        session_id: Uuid,
        player_id: PlayerId,
        patch: PlayerPatch,
        guard: PlayerGuard,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        after_yield(self.0.update_player(session_id, player_id, patch, guard))
    }
    fn commit_batch(
        &self,
        session_id: Uuid,
        batch: SessionBatch,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        after_yield(self.0.commit_batch(session_id, batch))
    }
    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        after_yield(self.0.delete_session(id))
    }
    fn watch_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionWatch>>> {
        after_yield(self.0.watch_session(id))
    }
    fn watch_players(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PlayersWatch>>> {
        after_yield(self.0.watch_players(id))
    }
    fn append_event(&self, event: EventEntity) -> BoxFuture<'static, StorageResult<()>> {
        after_yield(self.0.append_event(event))
    }
    fn delete_event(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        after_yield(self.0.delete_event(id))
    }
    fn watch_events(&self) -> BoxFuture<'static, StorageResult<EventsWatch>> {
        after_yield(self.0.watch_events())
    }
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        after_yield(self.0.health_check())
    }
}

/// Store whose backend never answers.
struct FailingStore;

fn down<T: Send + 'static>() -> BoxFuture<'static, StorageResult<T>> {
    future::ready(Err(StorageError::unavailable(
        "reach the backend",
        io::Error::other("connection refused"),
    )))
    .boxed()
}

impl SessionStore for FailingStore {
    fn insert_session(&self, _: SessionDraft) -> BoxFuture<'static, StorageResult<SessionEntity>> {
        down()
    }
    fn find_session(&self, _: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        down()
    }
    fn list_sessions(&self) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        down()
    }
    fn insert_player(
        &self,
        _: Uuid,
        _: PlayerEntity,
        _: PlayerGuard,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        down()
    }
    fn find_player(
        &self,
        _: Uuid,
        _: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        down()
    }
    fn list_players(&self, _: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        down()
    }
    fn update_player(
        &self,
        _: Uuid,
        _: PlayerId,
        _: PlayerPatch,
        _: PlayerGuard,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        down()
    }
    fn commit_batch(
        &self,
        _: Uuid,
        _: SessionBatch,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        down()
    }
    fn delete_session(&self, _: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        down()
    }
    fn watch_session(&self, _: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionWatch>>> {
        down()
    }
    fn watch_players(&self, _: Uuid) -> BoxFuture<'static, StorageResult<Option<PlayersWatch>>> {
        down()
    }
    fn append_event(&self, _: EventEntity) -> BoxFuture<'static, StorageResult<()>> {
        down()
    }
    fn delete_event(&self, _: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        down()
    }
    fn watch_events(&self) -> BoxFuture<'static, StorageResult<EventsWatch>> {
        down()
    }
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        down()
    }
}

#[tokio::test]
async fn unreachable_store_degrades_gracefully() {
    let state = AppState::new(Arc::new(FailingStore), quiet_config());

    assert!(session_service::list_sessions(&state).await.is_empty());
    assert_eq!(health_service::health_status(&state).await.status, "degraded");
    assert!(matches!(
        session_service::get_session(&state, Uuid::new_v4()).await,
        Err(ServiceError::Unavailable(_))
    ));
    assert!(matches!(
        session_service::create_session(&state, HOST, "Host", "Friday", SessionOptions::default())
            .await,
        Err(ServiceError::Unavailable(_))
    ));
}
