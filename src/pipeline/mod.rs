//! Action pipeline: one action against one engine instance.
//!
//! ```text
//! validate ──rejected──▶ Applied::Rejected (state untouched)
//!    │ ok
//!    ▼
//! reduce ──▶ invariant checks ──▶ evaluate_win ──finished──▶ status/winners override
//!                                                            + "finish:<reason>" event
//! ```
//!
//! Win evaluation always runs on the state produced by *this* action, never
//! before reduction and never on hypothetical states. Seq and idempotency
//! enforcement is the caller's job (see `session`), not the pipeline's.

use tracing::{debug, error};

use crate::core::{GameAction, GameId, GameState, MatchStatus, PlayerId};
use crate::rules::{Events, Finish, Rejections, RuleEngine, RuleFault};

/// A reducer returned a state that breaks the state model.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("version went from {before} to {after}, expected {}", before + 1)]
    Version { before: u64, after: u64 },

    #[error("match identity changed")]
    Identity,

    #[error("seated players changed")]
    Seats,

    #[error("current player {0} is not seated")]
    UnseatedCurrentPlayer(PlayerId),

    #[error("reducer set terminal status {0:?} itself")]
    TerminalStatus(MatchStatus),
}

/// Contract violations. Fatal for the call; never a validation outcome.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("{engine} engine cannot run a {state} match")]
    EngineMismatch { engine: GameId, state: GameId },

    #[error("cannot reduce against a {0:?} match")]
    TerminalState(MatchStatus),

    #[error("rule fault: {0}")]
    Fault(#[from] RuleFault),

    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}

/// Successful state transition.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub next_state: GameState,
    pub events: Events,
    /// Set when this action ended the match.
    pub finish: Option<Finish>,
}

/// Outcome of `apply`.
#[derive(Clone, Debug, PartialEq)]
pub enum Applied {
    Accepted(Transition),
    /// Validation refused the action; the caller's state stands as it was.
    Rejected(Rejections),
}

impl Applied {
    /// Whether the action was accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Applied::Accepted(_))
    }

    /// The transition, if accepted.
    #[must_use]
    pub fn transition(&self) -> Option<&Transition> {
        match self {
            Applied::Accepted(t) => Some(t),
            Applied::Rejected(_) => None,
        }
    }

    /// The rejections (empty if accepted).
    #[must_use]
    pub fn rejections(&self) -> &[crate::rules::Rejection] {
        match self {
            Applied::Accepted(_) => &[],
            Applied::Rejected(errors) => errors,
        }
    }
}

/// Validate, reduce, and evaluate one action.
///
/// The input state is borrowed and never modified; on rejection the caller
/// simply keeps it.
pub fn apply<E>(engine: &E, state: &GameState, action: &GameAction) -> Result<Applied, PipelineError>
where
    E: RuleEngine + ?Sized,
{
    ensure_engine(engine, state)?;

    let validation = engine.validate(state, action);
    if !validation.is_ok() {
        debug!(
            match_id = %state.match_id,
            seq = action.seq,
            action_type = %action.action_type,
            reason = %validation.errors()[0].code,
            "action rejected"
        );
        return Ok(Applied::Rejected(validation.into_errors()));
    }

    let transition = advance(engine, state, action)?;
    debug!(
        match_id = %state.match_id,
        seq = action.seq,
        action_type = %action.action_type,
        version = transition.next_state.version,
        "action applied"
    );
    Ok(Applied::Accepted(transition))
}

/// Reduce and evaluate without validating.
///
/// Shared by `apply` (after validation) and replay (which reproduces
/// history instead of re-adjudicating it).
pub fn advance<E>(engine: &E, state: &GameState, action: &GameAction) -> Result<Transition, PipelineError>
where
    E: RuleEngine + ?Sized,
{
    ensure_engine(engine, state)?;
    if state.is_terminal() {
        error!(match_id = %state.match_id, seq = action.seq, status = ?state.status, "reduce on terminal state");
        return Err(PipelineError::TerminalState(state.status));
    }

    let reduction = engine.reduce(state, action).inspect_err(|fault| {
        error!(match_id = %state.match_id, seq = action.seq, %fault, "reducer fault");
    })?;
    let mut next_state = reduction.next_state;
    let mut events = reduction.events;

    check_invariants(state, &next_state).inspect_err(|violation| {
        error!(match_id = %state.match_id, seq = action.seq, %violation, "reducer broke invariant");
    })?;

    let finish = engine.evaluate_win(&next_state)?;
    if let Some(finish) = &finish {
        next_state.status = MatchStatus::Finished;
        next_state.winner_ids = finish.result.winner_ids();
        if let Some(reason) = &finish.reason {
            events.push(format!("finish:{}", reason).into());
        }
    }

    Ok(Transition {
        next_state,
        events,
        finish,
    })
}

fn ensure_engine<E>(engine: &E, state: &GameState) -> Result<(), PipelineError>
where
    E: RuleEngine + ?Sized,
{
    if engine.game_id() == state.game_id {
        Ok(())
    } else {
        error!(engine = %engine.game_id(), state = %state.game_id, "engine/game mismatch");
        Err(PipelineError::EngineMismatch {
            engine: engine.game_id(),
            state: state.game_id,
        })
    }
}

/// Check what every accepted action must preserve.
pub fn check_invariants(before: &GameState, after: &GameState) -> Result<(), InvariantViolation> {
    if after.version != before.version + 1 {
        return Err(InvariantViolation::Version {
            before: before.version,
            after: after.version,
        });
    }
    if after.game_id != before.game_id || after.match_id != before.match_id {
        return Err(InvariantViolation::Identity);
    }
    if !after.players.ids().eq(before.players.ids()) {
        return Err(InvariantViolation::Seats);
    }
    if !after.players.contains(&after.current_player_id) {
        return Err(InvariantViolation::UnseatedCurrentPlayer(after.current_player_id.clone()));
    }
    if after.status.is_terminal() {
        return Err(InvariantViolation::TerminalStatus(after.status));
    }
    Ok(())
}
