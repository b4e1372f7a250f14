//! Simulated players voting on their own during a round.

use std::time::Duration;

use rand::{Rng, seq::IndexedRandom};
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::{PlayerEntity, PlayerId},
    error::ServiceError,
    services::session_service,
    state::SharedState,
};

/// Schedule one vote per connected bot of `players`, each after its index-staggered delay.
///
/// The tasks are registered on the session so that leaving the voting phase aborts them.
pub fn schedule_votes(state: &SharedState, session_id: Uuid, players: &[PlayerEntity]) {
    let bots: Vec<PlayerId> = players
        .iter()
        .filter(|player| player.is_bot && player.is_active())
        .map(|player| player.id.clone())
        .collect();
    if bots.is_empty() {
        state.cancel_bot_tasks(session_id);
        return;
    }

    let config = state.config();
    let jitter_ms = config.bot_vote_jitter().as_millis() as u64;
    let handles = bots
        .into_iter()
        .enumerate()
        .map(|(index, bot_id)| {
            let jitter = state.with_rng(|rng| rng.random_range(0..=jitter_ms));
            let delay = config.bot_vote_delay(index) + Duration::from_millis(jitter);
            let state = state.clone();
            tokio::spawn(async move {
                sleep(delay).await;
                bot_vote(&state, session_id, &bot_id).await;
            })
            .abort_handle()
        })
        .collect::<Vec<_>>();

    debug!(session.id = %session_id, bots = handles.len(), "scheduled bot votes");
    state.register_bot_tasks(session_id, handles);
}

async fn bot_vote(state: &SharedState, session_id: Uuid, bot_id: &str) {
    let players = match session_service::list_players(state, session_id).await {
        Ok(players) => players,
        Err(err) => {
            debug!(session.id = %session_id, player.id = %bot_id, error = %err, "bot skipped its vote");
            return;
        }
    };

    let Some(target) = pick_target(state, &players, bot_id) else {
        debug!(session.id = %session_id, player.id = %bot_id, "bot found nobody to vote for");
        return;
    };

    match session_service::cast_vote(state, session_id, bot_id, &target).await {
        Ok(()) => debug!(session.id = %session_id, player.id = %bot_id, target.id = %target, "bot voted"),
        Err(
            err @ (ServiceError::InvalidPhase(_)
            | ServiceError::DuplicateVote
            | ServiceError::NotFound(_)),
        ) => {
            debug!(session.id = %session_id, player.id = %bot_id, error = %err, "bot vote no longer applicable")
        }
        Err(err) => warn!(session.id = %session_id, player.id = %bot_id, error = %err, "bot vote failed"),
    }
}

/// Uniformly random active player other than the bot itself.
fn pick_target(state: &SharedState, players: &[PlayerEntity], bot_id: &str) -> Option<PlayerId> {
    let candidates: Vec<&PlayerEntity> = players
        .iter()
        .filter(|player| player.is_active() && player.id != bot_id)
        .collect();
    state.with_rng(|rng| candidates.choose(rng).map(|player| player.id.clone()))
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::{config::AppConfig, state::AppState};

    fn player(id: &str) -> PlayerEntity {
        PlayerEntity::new(Uuid::nil(), id.into(), id.into(), SystemTime::now())
    }

    #[test]
    fn bots_never_target_themselves_or_inactive_players() {
        let state = AppState::in_memory(AppConfig::default().with_rng_seed(5));
        let mut gone = player("gone");
        gone.is_connected = false;
        let mut watcher = player("watcher");
        watcher.is_spectator = true;
        let players = vec![player("bot"), player("a"), gone, watcher];

        for _ in 0..32 {
            assert_eq!(pick_target(&state, &players, "bot").as_deref(), Some("a"));
        }
        assert_eq!(pick_target(&state, &players[..1], "bot"), None);
    }

    #[tokio::test]
    async fn scheduling_without_bots_registers_nothing() {
        let state = AppState::in_memory(AppConfig::default());
        let session_id = Uuid::new_v4();
        schedule_votes(&state, session_id, &[player("a"), player("b")]);
        assert_eq!(state.pending_bot_tasks(session_id), 0);
    }
}
