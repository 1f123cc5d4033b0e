//! Checks every rule engine runs before its game-specific legality.
//!
//! Order matters only for which code is reported first; the order below
//! (match, game, terminal, seat, turn) is the order fixtures expect.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::engine::{ReasonCode, Rejection, RuleEngine, RuleFault};
use crate::core::{GameAction, GameId, GameState, MatchStatus, Payload};

/// Reject actions addressed to another match or game.
pub fn ensure_addressed(state: &GameState, action: &GameAction) -> Result<(), Rejection> {
    if action.match_id != state.match_id {
        return Err(Rejection::new(
            ReasonCode::MATCH_MISMATCH,
            format!("action targets match {}, state is {}", action.match_id, state.match_id),
        ));
    }
    if action.game_id != state.game_id {
        return Err(Rejection::new(
            ReasonCode::GAME_MISMATCH,
            format!("action is for {}, match plays {}", action.game_id, state.game_id),
        ));
    }
    Ok(())
}

/// Reject anything once the match reached an absorbing status.
pub fn ensure_open(state: &GameState) -> Result<(), Rejection> {
    match state.status {
        MatchStatus::Finished => Err(Rejection::new(ReasonCode::MATCH_FINISHED, "match is already finished")),
        MatchStatus::Aborted => Err(Rejection::new(ReasonCode::MATCH_ABORTED, "match was aborted")),
        MatchStatus::Pending | MatchStatus::Active => Ok(()),
    }
}

/// Reject actors who are not seated in the match.
pub fn ensure_seated(state: &GameState, action: &GameAction) -> Result<(), Rejection> {
    if state.players.contains(&action.actor_id) {
        Ok(())
    } else {
        Err(Rejection::new(
            ReasonCode::NOT_A_PLAYER,
            format!("{} is not seated in this match", action.actor_id),
        ))
    }
}

/// Reject actors who do not hold the turn.
pub fn ensure_turn(state: &GameState, action: &GameAction) -> Result<(), Rejection> {
    if state.is_current(&action.actor_id) {
        Ok(())
    } else {
        Err(Rejection::new(
            ReasonCode::NOT_PLAYER_TURN,
            format!("it is {}'s turn, not {}'s", state.current_player_id, action.actor_id),
        ))
    }
}

/// All envelope checks, honoring the engine's turn-exempt action types.
pub fn ensure_admissible<E>(engine: &E, state: &GameState, action: &GameAction) -> Result<(), Rejection>
where
    E: RuleEngine + ?Sized,
{
    ensure_addressed(state, action)?;
    ensure_open(state)?;
    ensure_seated(state, action)?;
    if !engine.is_turn_exempt(&action.action_type) {
        ensure_turn(state, action)?;
    }
    Ok(())
}

/// Decode typed action arguments; structural errors become `INVALID_PAYLOAD`.
pub fn args<T: DeserializeOwned>(action: &GameAction) -> Result<T, Rejection> {
    serde_json::from_value(action.payload.clone()).map_err(|e| {
        Rejection::new(
            ReasonCode::INVALID_PAYLOAD,
            format!("bad {} payload: {}", action.action_type, e),
        )
    })
}

/// Decode typed arguments inside a reducer.
pub fn reduce_args<T: DeserializeOwned>(action: &GameAction) -> Result<T, RuleFault> {
    serde_json::from_value(action.payload.clone()).map_err(|e| RuleFault::MalformedArgs {
        action_type: action.action_type.clone(),
        reason: e.to_string(),
    })
}

/// Decode an engine's board inside `validate`; failure is `INVALID_STATE`.
pub fn board<T: DeserializeOwned>(state: &GameState) -> Result<T, Rejection> {
    state
        .payload
        .decode()
        .map_err(|e| Rejection::new(ReasonCode::INVALID_STATE, format!("unreadable board: {}", e)))
}

/// Decode an engine's board inside `reduce`/`evaluate_win`.
pub fn load_board<T: DeserializeOwned>(game: GameId, state: &GameState) -> Result<T, RuleFault> {
    state.payload.decode().map_err(|e| RuleFault::CorruptPayload {
        game,
        reason: e.to_string(),
    })
}

/// Encode an engine's board back into a payload.
pub fn store_board<T: Serialize>(game: GameId, board: &T) -> Result<Payload, RuleFault> {
    Payload::encode(board).map_err(|e| RuleFault::CorruptPayload {
        game,
        reason: e.to_string(),
    })
}

/// Shorthand for a game-specific rejection.
pub fn reject<T>(code: ReasonCode, message: impl Into<String>) -> Result<T, Rejection> {
    Err(Rejection::new(code, message))
}
