//! Per-session game rules selected when the session is created.

use std::sync::Arc;

use crate::dao::models::{GameVariant, SessionEntity, TieBreakPolicy};

/// Deduplicated set of candidate secret words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordPool {
    words: Vec<String>,
}

impl WordPool {
    /// Build a pool, trimming entries and dropping blanks and duplicates (case-insensitive).
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = std::collections::HashSet::new();
        let words = words
            .into_iter()
            .map(|word| word.as_ref().trim().to_string())
            .filter(|word| !word.is_empty())
            .filter(|word| seen.insert(word.to_lowercase()))
            .collect();
        Self { words }
    }

    /// Words in insertion order.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Number of distinct words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether no word survived cleanup.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Strategy object parameterizing the coordinator for one session.
#[derive(Debug, Clone)]
pub struct GameRules {
    /// Single or dual word deal.
    pub variant: GameVariant,
    /// How a tied vote is settled.
    pub tie_break: TieBreakPolicy,
    /// Pool the deal draws from.
    pub words: Arc<WordPool>,
}

impl GameRules {
    /// Rules recorded on `session`, drawing words from `words`.
    pub fn for_session(session: &SessionEntity, words: Arc<WordPool>) -> Self {
        Self {
            variant: session.variant,
            tie_break: session.tie_break,
            words,
        }
    }
}
