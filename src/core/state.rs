//! Game state: the authoritative snapshot of one match.
//!
//! ## GameState
//!
//! A value type. Rule engines never mutate a state they were handed; they
//! build a `successor()` and return it. Seats and payload use `im`
//! persistent structures, so keeping every intermediate state (replay
//! frames, snapshots) shares structure instead of deep-copying.
//!
//! ## Payload
//!
//! Open-ended game-specific data. The pipeline never looks inside; each
//! engine encodes its own typed board into it and decodes it back.

use im::OrdMap;
use serde::de::DeserializeOwned;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::config::GameId;
use super::player::{PlayerId, Seats};

/// Lifecycle status of a match.
///
/// `Finished` and `Aborted` are absorbing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    #[default]
    Pending,
    Active,
    Finished,
    Aborted,
}

impl MatchStatus {
    /// Whether no further action may mutate the match.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Finished | MatchStatus::Aborted)
    }
}

/// Game-specific state, keyed by field name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(OrdMap<String, Value>);

impl Payload {
    /// Create an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a typed value whose serialized form is a JSON object.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            other => Err(serde_json::Error::custom(format!(
                "payload must encode to an object, got {}",
                other
            ))),
        }
    }

    /// Decode the whole payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_value())
    }

    /// The payload as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Map<_, _>>())
    }

    /// Get a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Remove a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Merge every field of `fields` over this payload.
    pub fn merge(&mut self, fields: &Map<String, Value>) {
        for (key, value) in fields {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// Authoritative snapshot of one match at one point in logical time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Owning game. Never changes.
    pub game_id: GameId,

    /// Match identifier. Never changes.
    pub match_id: String,

    /// Increments by exactly one per accepted action.
    pub version: u64,

    /// Engine-defined phase tag, opaque to the pipeline.
    pub phase: String,

    /// Turn counter (starts at 1).
    pub turn: u32,

    /// Whose action is currently admissible.
    pub current_player_id: PlayerId,

    pub status: MatchStatus,

    /// Seated players, fixed at match start.
    pub players: Seats,

    /// Empty until finished; empty when finished means a draw.
    pub winner_ids: Vec<PlayerId>,

    pub payload: Payload,
}

impl GameState {
    /// Create a pending state at version 0 with the first seat to act.
    ///
    /// Panics if `players` is empty.
    pub fn new(game_id: GameId, match_id: impl Into<String>, players: Seats) -> Self {
        let first = players
            .id_at(0)
            .cloned()
            .unwrap_or_else(|| panic!("Must have at least 1 player"));

        Self {
            game_id,
            match_id: match_id.into(),
            version: 0,
            phase: String::new(),
            turn: 1,
            current_player_id: first,
            status: MatchStatus::Pending,
            players,
            winner_ids: Vec::new(),
            payload: Payload::new(),
        }
    }

    /// Set the phase.
    #[must_use]
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = phase.into();
        self
    }

    /// Set the status.
    #[must_use]
    pub fn with_status(mut self, status: MatchStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Number of seated players.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Whether the match reached an absorbing status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether `player` is the one allowed to act.
    #[must_use]
    pub fn is_current(&self, player: &PlayerId) -> bool {
        &self.current_player_id == player
    }

    /// Seat index of the current player.
    #[must_use]
    pub fn current_seat(&self) -> Option<usize> {
        self.players.seat_of(&self.current_player_id)
    }

    /// A copy of this state one version later.
    ///
    /// Reducers start from this and never touch `self`.
    #[must_use]
    pub fn successor(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next
    }

    /// Hand the turn to the next seat.
    pub fn pass_turn(&mut self) {
        if let Some(next) = self.players.next_after(&self.current_player_id).cloned() {
            self.current_player_id = next;
        }
        self.turn += 1;
    }

    /// Hand the turn to a specific player.
    pub fn pass_turn_to(&mut self, player: PlayerId) {
        self.current_player_id = player;
        self.turn += 1;
    }
}
