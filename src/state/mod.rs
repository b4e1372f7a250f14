/// Imposter selection and word dealing.
pub mod roles;
/// Per-session rule strategy and word pool.
pub mod rules;
/// Legal phase transitions.
pub mod state_machine;
/// Vote counting.
pub mod tally;

use std::{
    future::Future,
    sync::{Arc, Mutex as StdMutex, PoisonError},
};

use dashmap::DashMap;
use rand::{SeedableRng, rngs::StdRng};
use tokio::{sync::Mutex, task::AbortHandle, time::timeout};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        models::SessionPhase,
        session_store::{MemorySessionStore, SessionStore},
    },
    error::ServiceError,
    state::rules::WordPool,
};

/// Shared handle passed to every handler and service.
pub type SharedState = Arc<AppState>;

/// Central application state: the injected store, runtime configuration, and the per-session
/// registries the coordinator serializes and cancels work through.
pub struct AppState {
    store: Arc<dyn SessionStore>,
    config: AppConfig,
    rng: StdMutex<StdRng>,
    transition_gates: DashMap<Uuid, Arc<Mutex<()>>>,
    bot_tasks: DashMap<Uuid, Vec<AbortHandle>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(store: Arc<dyn SessionStore>, config: AppConfig) -> SharedState {
        let rng = match config.rng_seed() {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Arc::new(Self {
            store,
            config,
            rng: StdMutex::new(rng),
            transition_gates: DashMap::new(),
            bot_tasks: DashMap::new(),
        })
    }

    /// State backed by a fresh [`MemorySessionStore`].
    pub fn in_memory(config: AppConfig) -> SharedState {
        Self::new(Arc::new(MemorySessionStore::new()), config)
    }

    /// Injected session store.
    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Configured secret word pool.
    pub fn words(&self) -> Arc<WordPool> {
        self.config.words()
    }

    /// Run `f` with exclusive access to the shared RNG.
    ///
    /// A single generator keeps whole runs reproducible when a seed is configured.
    pub fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    /// Serialize host-driven control operations on one session and bound their duration.
    ///
    /// Player self-writes (joins, votes, disconnects) never go through here.
    pub async fn run_transition<F, Fut, T>(&self, session_id: Uuid, work: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let gate = self.gate(session_id).await?;
        let _guard = gate.lock().await;

        let limit = self.config.transition_timeout();
        let result = match timeout(limit, work()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    session.id = %session_id,
                    timeout_ms = limit.as_millis() as u64,
                    "session transition timed out"
                );
                Err(ServiceError::Timeout)
            }
        };
        if matches!(result, Err(ServiceError::NotFound(_))) {
            self.transition_gates.remove(&session_id);
        }
        result
    }

    /// Gate of an existing session. Unknown sessions never get one, and ended sessions only
    /// get an untracked one.
    async fn gate(&self, session_id: Uuid) -> Result<Arc<Mutex<()>>, ServiceError> {
        if let Some(gate) = self.transition_gates.get(&session_id) {
            return Ok(gate.value().clone());
        }
        let Some(session) = self.store.find_session(session_id).await? else {
            return Err(ServiceError::NotFound(format!(
                "session `{session_id}` not found"
            )));
        };
        if session.phase == SessionPhase::Ended {
            // Only deletion is legal from here and the store makes it idempotent.
            return Ok(Arc::default());
        }
        Ok(self
            .transition_gates
            .entry(session_id)
            .or_default()
            .value()
            .clone())
    }

    #[cfg(test)]
    pub(crate) fn tracked_gates(&self) -> usize {
        self.transition_gates.len()
    }

    /// Track pending bot vote tasks for a session, aborting any previously registered ones.
    pub fn register_bot_tasks(&self, session_id: Uuid, handles: Vec<AbortHandle>) {
        if let Some(previous) = self.bot_tasks.insert(session_id, handles) {
            abort_all(previous);
        }
    }

    /// Abort every pending bot vote of a session. Returns how many tasks were registered.
    pub fn cancel_bot_tasks(&self, session_id: Uuid) -> usize {
        match self.bot_tasks.remove(&session_id) {
            Some((_, handles)) => {
                let count = handles.len();
                abort_all(handles);
                debug!(session.id = %session_id, count, "cancelled pending bot votes");
                count
            }
            None => 0,
        }
    }

    /// Number of bot vote tasks still running for a session.
    pub fn pending_bot_tasks(&self, session_id: Uuid) -> usize {
        self.bot_tasks
            .get(&session_id)
            .map(|handles| handles.iter().filter(|handle| !handle.is_finished()).count())
            .unwrap_or(0)
    }

    /// Drop every per-session registry entry once the session is gone.
    pub fn forget_session(&self, session_id: Uuid) {
        self.cancel_bot_tasks(session_id);
        self.transition_gates.remove(&session_id);
    }
}

fn abort_all(handles: Vec<AbortHandle>) {
    for handle in handles {
        handle.abort();
    }
}
