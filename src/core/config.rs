//! Configuration types.
//!
//! - `GameId`: which rule set owns a match
//! - `CatalogEntry`: static facts about a game (player range, fixtures)
//! - `MatchOptions`: per-match setup inputs handed to the rule engine
//! - `SessionConfig`: tuning of the per-match serialization boundary
//!
//! All of these deserialize from JSON so hosts can load them from files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Game identifier. Fixed for the lifetime of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameId {
    Splendor,
    Gomoku,
    Gostop,
    Catan,
    Azul,
}

impl GameId {
    /// Every supported game, in catalog order.
    pub const ALL: [GameId; 5] = [
        GameId::Splendor,
        GameId::Gomoku,
        GameId::Gostop,
        GameId::Catan,
        GameId::Azul,
    ];

    /// Wire name of the game.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            GameId::Splendor => "splendor",
            GameId::Gomoku => "gomoku",
            GameId::Gostop => "gostop",
            GameId::Catan => "catan",
            GameId::Azul => "azul",
        }
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown game id.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unsupported game id: {0}")]
pub struct UnknownGameId(pub String);

impl FromStr for GameId {
    type Err = UnknownGameId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UnknownGameId(s.to_string()))
    }
}

/// Static description of a hosted game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub game_id: GameId,
    pub display_name: String,
    pub min_players: usize,
    pub max_players: usize,
    pub expected_duration_minutes: u32,
    /// Relative path of the game's test-vector document.
    pub test_vector_path: String,
}

impl CatalogEntry {
    /// Create an entry with the given player range.
    pub fn new(game_id: GameId, display_name: impl Into<String>, min_players: usize, max_players: usize) -> Self {
        assert!(min_players > 0, "Must allow at least 1 player");
        assert!(min_players <= max_players, "Player range is empty");

        Self {
            game_id,
            display_name: display_name.into(),
            min_players,
            max_players,
            expected_duration_minutes: 30,
            test_vector_path: format!("test_vectors/{}.json", game_id),
        }
    }

    /// Set the expected duration.
    #[must_use]
    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.expected_duration_minutes = minutes;
        self
    }

    /// Set the test-vector path.
    #[must_use]
    pub fn with_test_vector_path(mut self, path: impl Into<String>) -> Self {
        self.test_vector_path = path.into();
        self
    }

    /// Whether `count` players may start a match of this game.
    #[must_use]
    pub fn accepts_player_count(&self, count: usize) -> bool {
        (self.min_players..=self.max_players).contains(&count)
    }
}

/// The catalog of the five hosted games.
#[must_use]
pub fn standard_catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new(GameId::Splendor, "Splendor", 2, 4).with_duration(30),
        CatalogEntry::new(GameId::Gomoku, "Gomoku", 2, 2).with_duration(20),
        CatalogEntry::new(GameId::Gostop, "Go-Stop / Matgo", 2, 3).with_duration(40),
        CatalogEntry::new(GameId::Catan, "Catan", 3, 4).with_duration(90),
        CatalogEntry::new(GameId::Azul, "Azul", 2, 4).with_duration(45),
    ]
}

/// Per-match setup inputs.
///
/// The seed is written into the initial state, so every random draw a
/// reducer makes is reproducible from the state alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOptions {
    pub seed: u64,
    /// Game-specific variant tag (e.g. `"matgo_2p"`). `None` picks the default.
    #[serde(default)]
    pub variant: Option<String>,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self { seed: 42, variant: None }
    }
}

impl MatchOptions {
    /// Set the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the variant tag.
    #[must_use]
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }
}

/// Tuning for the per-match serialization boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Largest allowed jump between consecutive accepted `seq` values.
    /// `None` allows any gap as long as `seq` strictly increases.
    pub max_seq_gap: Option<u64>,

    /// Hash the state after every accepted action so the session can be
    /// verified against a replay of its log.
    pub record_frames: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_seq_gap: None,
            record_frames: true,
        }
    }
}

impl SessionConfig {
    /// Bound the allowed seq gap.
    #[must_use]
    pub fn with_max_seq_gap(mut self, gap: u64) -> Self {
        self.max_seq_gap = Some(gap);
        self
    }

    /// Disable per-action frame hashing.
    #[must_use]
    pub fn without_frames(mut self) -> Self {
        self.record_frames = false;
        self
    }
}
