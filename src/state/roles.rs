//! Imposter selection and word dealing.

use rand::{
    Rng,
    seq::{IndexedRandom, SliceRandom},
};
use thiserror::Error;

use crate::{
    dao::models::{GameVariant, PlayerId, Role},
    state::rules::WordPool,
};

/// Minimum number of active players required to deal a game.
pub const MIN_PLAYERS: usize = 3;

/// Outcome of dealing roles for one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    /// Player dealt the imposter role.
    pub imposter_id: PlayerId,
    /// Word every other player receives.
    pub secret_word: String,
    /// Only set for [`GameVariant::DualWord`]; always differs from `secret_word`.
    pub imposter_word: Option<String>,
}

impl RoleAssignment {
    /// Role and word a given dealt player receives.
    pub fn deal_for(&self, player_id: &str) -> (Role, Option<String>) {
        if self.imposter_id == player_id {
            (Role::Imposter, self.imposter_word.clone())
        } else {
            (Role::Player, Some(self.secret_word.clone()))
        }
    }
}

/// Reasons a deal cannot happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignError {
    /// Fewer active players than [`MIN_PLAYERS`].
    #[error("at least {needed} active players are required, found {found}")]
    NotEnoughPlayers {
        /// Minimum number of players.
        needed: usize,
        /// Players offered to the deal.
        found: usize,
    },
    /// The pool cannot supply enough distinct words for the variant.
    #[error("word pool holds {available} word(s), {needed} required")]
    WordPoolTooSmall {
        /// Distinct words the variant draws.
        needed: usize,
        /// Words in the pool.
        available: usize,
    },
}

/// Pick the imposter uniformly among `players` and draw the secret word(s) from `pool`.
pub fn assign_roles<R>(
    players: &[PlayerId],
    pool: &WordPool,
    variant: GameVariant,
    rng: &mut R,
) -> Result<RoleAssignment, AssignError>
where
    R: Rng + ?Sized,
{
    if players.len() < MIN_PLAYERS {
        return Err(AssignError::NotEnoughPlayers {
            needed: MIN_PLAYERS,
            found: players.len(),
        });
    }

    let needed = variant.words_per_deal();
    if pool.len() < needed {
        return Err(AssignError::WordPoolTooSmall {
            needed,
            available: pool.len(),
        });
    }

    let secret_word = pool
        .words()
        .choose(rng)
        .cloned()
        .ok_or(AssignError::WordPoolTooSmall {
            needed,
            available: 0,
        })?;
    let imposter_word = match variant {
        GameVariant::SingleWord => None,
        GameVariant::DualWord => {
            let others: Vec<&String> = pool
                .words()
                .iter()
                .filter(|word| **word != secret_word)
                .collect();
            let word = others.choose(rng).ok_or(AssignError::WordPoolTooSmall {
                needed,
                available: 1,
            })?;
            Some((*word).clone())
        }
    };

    let mut order = players.to_vec();
    order.shuffle(rng);
    let imposter_id = order.swap_remove(0);

    Ok(RoleAssignment {
        imposter_id,
        secret_word,
        imposter_word,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn roster(ids: &[&str]) -> Vec<PlayerId> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn imposter_is_one_of_the_players() {
        let pool = WordPool::new(["ALPHA", "BRAVO", "CHARLIE"]);
        let players = roster(&["a", "b", "c", "d"]);
        let mut rng = StdRng::seed_from_u64(7);

        let assignment = assign_roles(&players, &pool, GameVariant::SingleWord, &mut rng).unwrap();
        assert!(players.contains(&assignment.imposter_id));
        assert!(pool.words().contains(&assignment.secret_word));
        assert!(assignment.imposter_word.is_none());

        let imposters = players
            .iter()
            .filter(|id| assignment.deal_for(id).0 == Role::Imposter)
            .count();
        assert_eq!(imposters, 1);
    }

    #[test]
    fn same_seed_same_assignment() {
        let pool = WordPool::new(["ALPHA", "BRAVO", "CHARLIE", "DELTA"]);
        let players = roster(&["a", "b", "c", "d", "e"]);

        let first = assign_roles(
            &players,
            &pool,
            GameVariant::DualWord,
            &mut StdRng::seed_from_u64(42),
        )
        .unwrap();
        let second = assign_roles(
            &players,
            &pool,
            GameVariant::DualWord,
            &mut StdRng::seed_from_u64(42),
        )
        .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn dual_word_draws_two_distinct_words() {
        let pool = WordPool::new(["ALPHA", "BRAVO"]);
        let players = roster(&["a", "b", "c"]);
        for seed in 0..32 {
            let assignment = assign_roles(
                &players,
                &pool,
                GameVariant::DualWord,
                &mut StdRng::seed_from_u64(seed),
            )
            .unwrap();
            let imposter_word = assignment.imposter_word.clone().unwrap();
            assert_ne!(imposter_word, assignment.secret_word);
            assert_eq!(
                assignment.deal_for(&assignment.imposter_id),
                (Role::Imposter, Some(imposter_word))
            );
        }
    }

    #[test]
    fn every_player_can_be_picked() {
        let pool = WordPool::new(["ALPHA"]);
        let players = roster(&["a", "b", "c"]);
        let mut rng = StdRng::seed_from_u64(1);
        let mut picks: HashMap<PlayerId, usize> = HashMap::new();
        for _ in 0..300 {
            let assignment =
                assign_roles(&players, &pool, GameVariant::SingleWord, &mut rng).unwrap();
            *picks.entry(assignment.imposter_id).or_default() += 1;
        }
        assert_eq!(picks.len(), 3);
        assert!(picks.values().all(|count| *count > 50));
    }

    #[test]
    fn rejects_small_rosters_and_pools() {
        let pool = WordPool::new(["ALPHA"]);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            assign_roles(&roster(&["a", "b"]), &pool, GameVariant::SingleWord, &mut rng),
            Err(AssignError::NotEnoughPlayers {
                needed: 3,
                found: 2
            })
        );
        assert_eq!(
            assign_roles(
                &roster(&["a", "b", "c"]),
                &pool,
                GameVariant::DualWord,
                &mut rng
            ),
            Err(AssignError::WordPoolTooSmall {
                needed: 2,
                available: 1
            })
        );
    }
}
