//! Client subscriptions: live session, roster and event-feed streams.
//!
//! Every stream starts with the current value and then yields each committed change.
//! Dropping a stream only unsubscribes; it never cancels anything on the session.

use std::{convert::Infallible, time::Duration, time::SystemTime};

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use futures::{Stream, StreamExt, stream::BoxStream};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{EventEntity, PlayerEntity, SessionEntity, SessionPhase},
    dto::{
        session::{EventSummary, PlayerView, SessionSummary},
        sse::{ServerEvent, SessionDeletedEvent},
    },
    error::ServiceError,
    services::event_service::EventFilter,
    state::SharedState,
};

const EVENT_SESSION: &str = "session";
const EVENT_SESSION_DELETED: &str = "session.deleted";
const EVENT_PLAYERS: &str = "players";
const EVENT_FEED: &str = "events";

/// Response body shared by every SSE route.
pub type SseBody = Sse<KeepAliveStream<ReceiverStream<Result<Event, Infallible>>>>;

/// Yield the current value of `receiver`, then every later value until the sender goes away.
pub fn watch_stream<T>(mut receiver: watch::Receiver<T>) -> impl Stream<Item = T>
where
    T: Clone + Send + Sync + 'static,
{
    stream! {
        loop {
            let value = receiver.borrow_and_update().clone();
            yield value;
            if receiver.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Live session document; yields `None` once when the session is deleted, then ends.
pub async fn subscribe_session(
    state: &SharedState,
    id: Uuid,
) -> Result<BoxStream<'static, Option<SessionEntity>>, ServiceError> {
    let receiver = state
        .store()
        .watch_session(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{id}` not found")))?;

    let mut finished = false;
    Ok(watch_stream(receiver)
        .take_while(move |session| {
            let keep = !finished;
            finished = session.is_none();
            futures::future::ready(keep)
        })
        .boxed())
}

/// Live roster of a session as seen by `viewer`, in join order.
pub async fn subscribe_players(
    state: &SharedState,
    id: Uuid,
    viewer: Option<String>,
) -> Result<BoxStream<'static, Vec<PlayerView>>, ServiceError> {
    let store = state.store();
    let (Some(players), Some(session)) = (
        store.watch_players(id).await?,
        store.watch_session(id).await?,
    ) else {
        return Err(ServiceError::NotFound(format!("session `{id}` not found")));
    };

    Ok(watch_stream(players)
        .map(move |players: Vec<PlayerEntity>| {
            // Players are published before the session, so the phase read here is never
            // newer than the roster it is applied to.
            let phase = session
                .borrow()
                .as_ref()
                .map(|session| session.phase)
                .unwrap_or(SessionPhase::Ended);
            PlayerView::project_all(&players, viewer.as_deref(), phase)
        })
        .boxed())
}

/// Live event feed after applying `filter`.
pub async fn subscribe_events(
    state: &SharedState,
    filter: EventFilter,
) -> Result<BoxStream<'static, Vec<EventEntity>>, ServiceError> {
    let receiver = state.store().watch_events().await?;
    Ok(watch_stream(receiver)
        .map(move |events| filter.apply(&events, SystemTime::now()))
        .boxed())
}

/// Time left in the voting countdown, derived from when the phase was entered.
pub fn voting_time_left(
    session: &SessionEntity,
    voting_duration: Duration,
    now: SystemTime,
) -> Option<Duration> {
    if session.phase != SessionPhase::Voting {
        return None;
    }
    let elapsed = now
        .duration_since(session.phase_entered_at)
        .unwrap_or_default();
    Some(voting_duration.saturating_sub(elapsed))
}

// ---------------------------------------------------------------------------
// SSE adapters
// ---------------------------------------------------------------------------

/// SSE body for a session document.
pub async fn session_sse(state: &SharedState, id: Uuid) -> Result<SseBody, ServiceError> {
    let voting_duration = state.config().voting_duration();
    let updates = subscribe_session(state, id).await?.map(move |session| match session {
        Some(session) => ServerEvent::json(
            Some(EVENT_SESSION.to_string()),
            &SessionSummary::from_entity(session, voting_duration),
        ),
        None => ServerEvent::json(
            Some(EVENT_SESSION_DELETED.to_string()),
            &SessionDeletedEvent { session_id: id },
        ),
    });
    info!(session.id = %id, "new session SSE connection");
    Ok(to_sse_stream(updates, "session"))
}

/// SSE body for a session roster, redacted for `viewer`.
pub async fn players_sse(
    state: &SharedState,
    id: Uuid,
    viewer: Option<String>,
) -> Result<SseBody, ServiceError> {
    let updates = subscribe_players(state, id, viewer)
        .await?
        .map(|players| ServerEvent::json(Some(EVENT_PLAYERS.to_string()), &players));
    info!(session.id = %id, "new players SSE connection");
    Ok(to_sse_stream(updates, "players"))
}

/// SSE body for the shared event feed.
pub async fn events_sse(state: &SharedState) -> Result<SseBody, ServiceError> {
    let filter = EventFilter::new(state.config().event_ttl());
    let updates = subscribe_events(state, filter).await?.map(|events| {
        let events: Vec<EventSummary> = events.into_iter().map(Into::into).collect();
        ServerEvent::json(Some(EVENT_FEED.to_string()), &events)
    });
    info!("new event feed SSE connection");
    Ok(to_sse_stream(updates, "events"))
}

/// Convert a stream of payloads into an SSE response, forwarding events until either side
/// goes away.
fn to_sse_stream<S>(updates: S, label: &'static str) -> SseBody
where
    S: Stream<Item = serde_json::Result<ServerEvent>> + Send + 'static,
{
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let mut updates = Box::pin(updates);
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                next = updates.next() => {
                    match next {
                        Some(Ok(payload)) => {
                            let mut event = Event::default().data(payload.data);
                            if let Some(name) = payload.event {
                                event = event.event(name);
                            }
                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(err)) => {
                            warn!(stream = label, error = %err, "failed to serialize SSE payload");
                        }
                        None => break,
                    }
                }
            }
        }
        info!(stream = label, "SSE stream disconnected");
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
