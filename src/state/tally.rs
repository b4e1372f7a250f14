//! Plurality vote counting.

use indexmap::IndexMap;
use rand::{Rng, seq::IndexedRandom};

use crate::dao::models::{PlayerEntity, PlayerId, TieBreakPolicy};

/// Votes counted at resolution time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    /// Votes per target, in the order targets first appear while walking the voters.
    pub counts: IndexMap<PlayerId, u32>,
    /// Player to eliminate, if the policy picked one.
    pub eliminated: Option<PlayerId>,
    /// Targets sharing the top count when there was a tie; empty otherwise.
    pub tied: Vec<PlayerId>,
}

impl Tally {
    /// Highest number of votes received by any target.
    pub fn max_count(&self) -> u32 {
        self.counts.values().copied().max().unwrap_or(0)
    }

    /// Total number of counted ballots.
    pub fn ballots(&self) -> u32 {
        self.counts.values().sum()
    }
}

/// Count the ballots of active voters in `players` (expected in join order) and pick the
/// player to eliminate.
///
/// Only connected, non-spectator, non-eliminated voters are counted. A strict plurality wins
/// outright; a shared top count is settled by `policy`.
pub fn tally<R>(players: &[PlayerEntity], policy: TieBreakPolicy, rng: &mut R) -> Tally
where
    R: Rng + ?Sized,
{
    let mut counts: IndexMap<PlayerId, u32> = IndexMap::new();
    for voter in players.iter().filter(|voter| voter.is_active() && voter.has_voted) {
        if let Some(target) = &voter.vote_for {
            *counts.entry(target.clone()).or_default() += 1;
        }
    }

    let Some(max) = counts.values().copied().max() else {
        return Tally::default();
    };
    let leaders: Vec<PlayerId> = counts
        .iter()
        .filter(|(_, count)| **count == max)
        .map(|(target, _)| target.clone())
        .collect();

    let (eliminated, tied) = if leaders.len() == 1 {
        (leaders.into_iter().next(), Vec::new())
    } else {
        let pick = match policy {
            TieBreakPolicy::FirstSeen => leaders.first().cloned(),
            TieBreakPolicy::Random => leaders.choose(rng).cloned(),
            TieBreakPolicy::NoElimination => None,
        };
        (pick, leaders)
    };

    Tally {
        counts,
        eliminated,
        tied,
    }
}
