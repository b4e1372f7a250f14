//! Application-level configuration loading, including the secret word pool.

use std::{env, fs, io::ErrorKind, path::PathBuf, sync::Arc, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use tracing::{info, warn};

use crate::state::rules::WordPool;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "IMPOSTER_BACK_CONFIG_PATH";

const DEFAULT_MAX_PLAYERS: u32 = 10;
const DEFAULT_EVENT_TTL: Duration = Duration::from_secs(15);
const MIN_EVENT_TTL: Duration = Duration::from_secs(10);
const MAX_EVENT_TTL: Duration = Duration::from_secs(30);
const DEFAULT_VOTING_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_BOT_VOTE_DELAY: Duration = Duration::from_millis(2_000);
const DEFAULT_BOT_VOTE_STAGGER: Duration = Duration::from_millis(1_500);
const DEFAULT_BOT_VOTE_JITTER: Duration = Duration::from_millis(1_000);
const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    words: Arc<WordPool>,
    bot_names: Vec<String>,
    default_max_players: u32,
    event_ttl: Duration,
    voting_duration: Duration,
    bot_vote_delay: Duration,
    bot_vote_stagger: Duration,
    bot_vote_jitter: Duration,
    transition_timeout: Duration,
    rng_seed: Option<u64>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        words = app_config.words.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Pool the secret words are drawn from.
    pub fn words(&self) -> Arc<WordPool> {
        self.words.clone()
    }

    /// Display name for the `index`-th bot of a session (zero based), wrapping with a suffix
    /// once the configured names are exhausted.
    pub fn bot_name(&self, index: usize) -> String {
        if self.bot_names.is_empty() {
            return format!("Bot {}", index + 1);
        }
        let base = &self.bot_names[index % self.bot_names.len()];
        match index / self.bot_names.len() {
            0 => base.clone(),
            lap => format!("{base} {}", lap + 1),
        }
    }

    /// Seat limit of sessions created without one.
    pub fn default_max_players(&self) -> u32 {
        self.default_max_players
    }

    /// How long an event stays on the shared feed.
    pub fn event_ttl(&self) -> Duration {
        self.event_ttl
    }

    /// Countdown length clients display once voting opens.
    pub fn voting_duration(&self) -> Duration {
        self.voting_duration
    }

    /// Delay before the `index`-th bot casts its vote, without the random jitter.
    pub fn bot_vote_delay(&self, index: usize) -> Duration {
        let stagger = u32::try_from(index).unwrap_or(u32::MAX);
        self.bot_vote_delay + self.bot_vote_stagger.saturating_mul(stagger)
    }

    /// Upper bound of the random extra delay added to every bot vote.
    pub fn bot_vote_jitter(&self) -> Duration {
        self.bot_vote_jitter
    }

    /// Upper bound on a single host-driven phase transition.
    pub fn transition_timeout(&self) -> Duration {
        self.transition_timeout
    }

    /// Fixed seed for the session RNG, used to replay games deterministically.
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }

    /// Replace the word pool; blanks and duplicates are dropped.
    pub fn with_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.words = Arc::new(WordPool::new(words));
        self
    }

    /// Override the event TTL as-is, bypassing the bounds applied to file configuration.
    pub fn with_event_ttl(mut self, ttl: Duration) -> Self {
        self.event_ttl = ttl;
        self
    }

    /// Override the bot vote base delay, per-bot stagger and jitter bound.
    pub fn with_bot_timing(mut self, delay: Duration, stagger: Duration, jitter: Duration) -> Self {
        self.bot_vote_delay = delay;
        self.bot_vote_stagger = stagger;
        self.bot_vote_jitter = jitter;
        self
    }

    /// Seed the session RNG.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            words: Arc::new(WordPool::new(default_words())),
            bot_names: default_bot_names(),
            default_max_players: DEFAULT_MAX_PLAYERS,
            event_ttl: DEFAULT_EVENT_TTL,
            voting_duration: DEFAULT_VOTING_DURATION,
            bot_vote_delay: DEFAULT_BOT_VOTE_DELAY,
            bot_vote_stagger: DEFAULT_BOT_VOTE_STAGGER,
            bot_vote_jitter: DEFAULT_BOT_VOTE_JITTER,
            transition_timeout: DEFAULT_TRANSITION_TIMEOUT,
            rng_seed: None,
        }
    }
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    words: Option<Vec<String>>,
    bot_names: Option<Vec<String>>,
    max_players: Option<u32>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    event_ttl_secs: Option<Duration>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    voting_duration_secs: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    bot_vote_delay_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    bot_vote_stagger_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    bot_vote_jitter_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    transition_timeout_ms: Option<Duration>,
    rng_seed: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();

        let words = match value.words.map(WordPool::new) {
            Some(pool) if pool.len() >= 2 => Arc::new(pool),
            Some(pool) => {
                warn!(
                    count = pool.len(),
                    "configured word pool needs at least two words; using built-in words"
                );
                defaults.words.clone()
            }
            None => defaults.words.clone(),
        };

        let max_players = match value.max_players {
            Some(max) if max >= 3 => max,
            Some(max) => {
                warn!(max, "max_players below 3 cannot start a game; using default");
                defaults.default_max_players
            }
            None => defaults.default_max_players,
        };

        let event_ttl = value
            .event_ttl_secs
            .map(|ttl| ttl.clamp(MIN_EVENT_TTL, MAX_EVENT_TTL))
            .unwrap_or(defaults.event_ttl);

        Self {
            words,
            bot_names: value
                .bot_names
                .filter(|names| !names.is_empty())
                .unwrap_or(defaults.bot_names),
            default_max_players: max_players,
            event_ttl,
            voting_duration: value.voting_duration_secs.unwrap_or(defaults.voting_duration),
            bot_vote_delay: value.bot_vote_delay_ms.unwrap_or(defaults.bot_vote_delay),
            bot_vote_stagger: value.bot_vote_stagger_ms.unwrap_or(defaults.bot_vote_stagger),
            bot_vote_jitter: value.bot_vote_jitter_ms.unwrap_or(defaults.bot_vote_jitter),
            transition_timeout: value
                .transition_timeout_ms
                .unwrap_or(defaults.transition_timeout),
            rng_seed: value.rng_seed,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in word pool shipped with the binary.
fn default_words() -> Vec<&'static str> {
    vec![
        "Lighthouse",
        "Volcano",
        "Submarine",
        "Pyramid",
        "Carousel",
        "Glacier",
        "Telescope",
        "Orchestra",
        "Cactus",
        "Lantern",
        "Waterfall",
        "Saxophone",
        "Igloo",
        "Parachute",
        "Compass",
        "Hammock",
        "Skyscraper",
        "Pineapple",
        "Tornado",
        "Chandelier",
    ]
}

fn default_bot_names() -> Vec<String> {
    ["Ada", "Babbage", "Curie", "Dijkstra", "Euler", "Fermat"]
        .into_iter()
        .map(String::from)
        .collect()
}
