//! Persisted action log.
//!
//! Append-only: accepted actions go in with strictly increasing `seq` and are
//! never mutated or reordered. Replay consumes `actions()` directly.
//!
//! On disk the log is bincode. Action payloads are open-ended JSON, which
//! bincode cannot describe, so each record carries its payload as canonical
//! JSON text:
//!
//! ```text
//! [ActionLogFile { gameId, matchId, records: [ActionLogRecord ..] }]
//! ```

use serde::{Deserialize, Serialize};

use crate::core::{GameAction, GameId, PlayerId};
use crate::replay::hash::canonical_value;

/// Persisted log failures.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("action for match {found} appended to log of match {expected}")]
    WrongMatch { expected: String, found: String },

    #[error("seq {seq} does not follow last logged seq {last}")]
    OutOfOrder { seq: u64, last: u64 },

    #[error("bincode: {0}")]
    Codec(#[from] bincode::Error),

    #[error("payload of seq {seq} is not valid JSON: {source}")]
    Payload {
        seq: u64,
        #[source]
        source: serde_json::Error,
    },
}

/// Wire and storage shape of one logged action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLogRecord {
    pub match_id: String,
    pub seq: u64,
    pub action_id: String,
    pub actor_id: PlayerId,
    pub action_type: String,
    /// Canonical JSON text.
    pub action_payload: String,
    pub idempotency_key: String,
    pub client_timestamp: String,
}

impl ActionLogRecord {
    pub fn from_action(action: &GameAction) -> Self {
        Self {
            match_id: action.match_id.clone(),
            seq: action.seq,
            action_id: action.action_id.clone(),
            actor_id: action.actor_id.clone(),
            action_type: action.action_type.clone(),
            action_payload: canonical_value(&action.payload),
            idempotency_key: action.idempotency_key.clone(),
            client_timestamp: action.client_timestamp.clone(),
        }
    }

    /// Rebuild the action for a match of `game_id`.
    pub fn to_action(&self, game_id: GameId) -> Result<GameAction, LogError> {
        let payload = serde_json::from_str(&self.action_payload).map_err(|source| LogError::Payload {
            seq: self.seq,
            source,
        })?;
        Ok(GameAction {
            game_id,
            match_id: self.match_id.clone(),
            action_id: self.action_id.clone(),
            seq: self.seq,
            actor_id: self.actor_id.clone(),
            action_type: self.action_type.clone(),
            payload,
            client_timestamp: self.client_timestamp.clone(),
            idempotency_key: self.idempotency_key.clone(),
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionLogFile {
    game_id: GameId,
    match_id: String,
    records: Vec<ActionLogRecord>,
}

/// Ordered, append-only list of accepted actions for one match.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionLog {
    game_id: GameId,
    match_id: String,
    actions: Vec<GameAction>,
}

impl ActionLog {
    /// Create an empty log.
    pub fn new(game_id: GameId, match_id: impl Into<String>) -> Self {
        Self {
            game_id,
            match_id: match_id.into(),
            actions: Vec::new(),
        }
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Append an accepted action.
    pub fn append(&mut self, action: GameAction) -> Result<(), LogError> {
        if action.match_id != self.match_id {
            return Err(LogError::WrongMatch {
                expected: self.match_id.clone(),
                found: action.match_id,
            });
        }
        if let Some(last) = self.last_seq().filter(|&last| action.seq <= last) {
            return Err(LogError::OutOfOrder { seq: action.seq, last });
        }
        self.actions.push(action);
        Ok(())
    }

    /// Logged actions in order.
    pub fn actions(&self) -> &[GameAction] {
        &self.actions
    }

    /// Actions with `seq` strictly above `seq`.
    pub fn since(&self, seq: u64) -> &[GameAction] {
        let start = self.actions.partition_point(|a| a.seq <= seq);
        &self.actions[start..]
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.actions.last().map(|a| a.seq)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Storage records in order.
    pub fn records(&self) -> Vec<ActionLogRecord> {
        self.actions.iter().map(ActionLogRecord::from_action).collect()
    }

    /// Encode with bincode.
    pub fn encode(&self) -> Result<Vec<u8>, LogError> {
        let file = ActionLogFile {
            game_id: self.game_id,
            match_id: self.match_id.clone(),
            records: self.records(),
        };
        Ok(bincode::serialize(&file)?)
    }

    /// Decode a log written by `encode`, re-checking ordering.
    pub fn decode(bytes: &[u8]) -> Result<Self, LogError> {
        let file: ActionLogFile = bincode::deserialize(bytes)?;
        let mut log = Self::new(file.game_id, file.match_id);
        for record in &file.records {
            log.append(record.to_action(file.game_id)?)?;
        }
        Ok(log)
    }
}
