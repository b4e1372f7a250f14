//! Short-lived notifications on the shared event feed.

use std::{
    collections::HashSet,
    time::{Duration, SystemTime},
};

use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::{EventEntity, EventKind, SessionEntity},
    state::SharedState,
};

/// Append a notification about `session` and schedule its deletion after the configured TTL.
///
/// Failures are logged and swallowed: a missing notification never fails the operation that
/// triggered it. Expiry runs whether or not anyone is observing the feed.
pub async fn emit(state: &SharedState, kind: EventKind, session: &SessionEntity) {
    let event = EventEntity {
        id: Uuid::new_v4(),
        kind,
        session_id: session.id,
        session_name: session.name.clone(),
        host_name: session.host_name.clone(),
        message: describe(kind, session),
        created_at: SystemTime::now(),
    };
    let event_id = event.id;

    let store = state.store();
    if let Err(err) = store.append_event(event).await {
        warn!(
            session.id = %session.id,
            kind = ?kind,
            error = %err,
            "failed to publish session event"
        );
        return;
    }

    let ttl = state.config().event_ttl();
    tokio::spawn(async move {
        sleep(ttl).await;
        match store.delete_event(event_id).await {
            Ok(true) => debug!(event.id = %event_id, "session event expired"),
            Ok(false) => {}
            Err(err) => warn!(event.id = %event_id, error = %err, "failed to expire session event"),
        }
    });
}

fn describe(kind: EventKind, session: &SessionEntity) -> String {
    match kind {
        EventKind::NewSession => format!("{} opened \"{}\"", session.host_name, session.name),
        EventKind::Started => format!("\"{}\" has started", session.name),
        EventKind::VotingStarted => format!("Voting is open in \"{}\"", session.name),
        EventKind::Ended => format!("\"{}\" is over", session.name),
    }
}

/// Consumer-side view over the event feed.
///
/// Keeps events younger than `max_age`, optionally restricted to some kinds, and only the
/// newest event per (kind, session) pair.
#[derive(Debug, Clone)]
pub struct EventFilter {
    max_age: Duration,
    kinds: Option<Vec<EventKind>>,
}

impl EventFilter {
    /// Keep every kind of event younger than `max_age`.
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            kinds: None,
        }
    }

    /// Only keep events of `kinds`.
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Apply the filter to `events` (oldest first), returning the survivors oldest first.
    pub fn apply(&self, events: &[EventEntity], now: SystemTime) -> Vec<EventEntity> {
        let mut seen = HashSet::new();
        let mut kept: Vec<EventEntity> = events
            .iter()
            .rev()
            .filter(|event| self.is_recent(event, now))
            .filter(|event| {
                self.kinds
                    .as_ref()
                    .is_none_or(|kinds| kinds.contains(&event.kind))
            })
            .filter(|event| seen.insert((event.kind, event.session_id)))
            .cloned()
            .collect();
        kept.reverse();
        kept
    }

    fn is_recent(&self, event: &EventEntity, now: SystemTime) -> bool {
        match now.duration_since(event.created_at) {
            Ok(age) => age <= self.max_age,
            // Clock skew: events from the future count as fresh.
            Err(_) => true,
        }
    }
}
