use thiserror::Error;

use crate::dao::models::SessionPhase;

/// Events that move a session between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Host deals roles and words.
    Start,
    /// Host opens a voting round.
    OpenVoting,
    /// A resolution eliminated a non-imposter (or nobody); discussion resumes.
    ContinueRound,
    /// A resolution eliminated the imposter.
    ImposterCaught,
    /// Host finishes the game.
    End,
}

/// Error returned when an event cannot be applied from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the session was in when the event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// Compute the phase reached by applying `event` while in `from`.
///
/// ```text
/// lobby --Start--> started --OpenVoting--> voting --ContinueRound--> started
///                                            \--ImposterCaught--> revealed
/// any phase except ended --End--> ended
/// ```
pub fn next_phase(from: SessionPhase, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
    let next = match (from, event) {
        (SessionPhase::Lobby, SessionEvent::Start) => SessionPhase::Started,
        (SessionPhase::Started, SessionEvent::OpenVoting) => SessionPhase::Voting,
        (SessionPhase::Voting, SessionEvent::ContinueRound) => SessionPhase::Started,
        (SessionPhase::Voting, SessionEvent::ImposterCaught) => SessionPhase::Revealed,
        (
            SessionPhase::Lobby
            | SessionPhase::Started
            | SessionPhase::Voting
            | SessionPhase::Revealed,
            SessionEvent::End,
        ) => SessionPhase::Ended,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

/// Whether roles have been dealt and the game has not finished yet.
pub fn is_in_progress(phase: SessionPhase) -> bool {
    matches!(
        phase,
        SessionPhase::Started | SessionPhase::Voting | SessionPhase::Revealed
    )
}
