//! Action representation: one attributed, sequenced mutation request.
//!
//! An action is a type tag (the "verb", e.g. `PLACE_STONE`) plus a
//! game-specific JSON payload (the arguments). The pipeline does not
//! interpret either; the owning rule engine does.
//!
//! `seq` and `idempotency_key` exist for the per-match serialization
//! boundary, which rejects duplicates before an action reaches the
//! pipeline. `client_timestamp` is advisory and never used for ordering.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::GameId;
use super::player::PlayerId;

/// A proposed mutation submitted by one actor.
///
/// ## Example
///
/// ```
/// use boardgame_core::core::{GameAction, GameId};
/// use serde_json::json;
///
/// let action = GameAction::new(GameId::Gomoku, "m1", "p1", "PLACE_STONE", 1)
///     .with_payload(json!({"x": 7, "y": 7}));
///
/// assert_eq!(action.action_id, "m1-1");
/// assert_eq!(action.idempotency_key, "m1-1");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameAction {
    pub game_id: GameId,
    pub match_id: String,
    pub action_id: String,

    /// Strictly increasing per match across accepted actions.
    pub seq: u64,

    pub actor_id: PlayerId,

    /// Move kind, interpreted by the rule engine.
    #[serde(rename = "type")]
    pub action_type: String,

    /// Move arguments.
    #[serde(default = "empty_object")]
    pub payload: Value,

    /// Advisory only.
    #[serde(default)]
    pub client_timestamp: String,

    /// Resubmitting the same key never applies the action twice.
    pub idempotency_key: String,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl GameAction {
    /// Create an action with an empty payload.
    ///
    /// `action_id` and `idempotency_key` default to `"{match_id}-{seq}"`.
    pub fn new(
        game_id: GameId,
        match_id: impl Into<String>,
        actor_id: impl Into<PlayerId>,
        action_type: impl Into<String>,
        seq: u64,
    ) -> Self {
        let match_id = match_id.into();
        let action_id = format!("{}-{}", match_id, seq);
        Self {
            game_id,
            idempotency_key: action_id.clone(),
            action_id,
            match_id,
            seq,
            actor_id: actor_id.into(),
            action_type: action_type.into(),
            payload: empty_object(),
            client_timestamp: String::new(),
        }
    }

    /// Set the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the action id.
    #[must_use]
    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = action_id.into();
        self
    }

    /// Set the idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = key.into();
        self
    }

    /// Set the client timestamp.
    #[must_use]
    pub fn with_client_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.client_timestamp = timestamp.into();
        self
    }

    /// Whether this action is of the given type.
    #[must_use]
    pub fn is(&self, action_type: &str) -> bool {
        self.action_type == action_type
    }
}
