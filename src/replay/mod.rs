//! Replay: re-derive state by folding a logged action history.
//!
//! `replay` trusts the log: it reproduces history and does not re-adjudicate
//! legality, but it still runs win evaluation after every reduction so the
//! hashes it records are the hashes the live match saw. `replay_audited`
//! validates every step as well, for disputed matches.
//!
//! Replay never returns a partial result. The first step that cannot be
//! reproduced stops the fold and is reported with its index and seq.

pub mod hash;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{GameAction, GameState, MatchStatus, PlayerId};
use crate::pipeline::{self, PipelineError, Transition};
use crate::rules::{ReasonCode, RuleEngine};

pub use hash::{canonicalize, content_hash, fnv1a32, state_hash, StateHash};

/// Trace entry recorded after one step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFrame {
    pub seq: u64,
    pub action_id: String,
    pub actor_id: PlayerId,
    #[serde(rename = "type")]
    pub action_type: String,
    pub state_version: u64,
    pub state_hash: StateHash,
}

impl ReplayFrame {
    /// Frame for `action` having produced `state`.
    pub fn record(action: &GameAction, state: &GameState) -> Result<Self, serde_json::Error> {
        Ok(Self {
            seq: action.seq,
            action_id: action.action_id.clone(),
            actor_id: action.actor_id.clone(),
            action_type: action.action_type.clone(),
            state_version: state.version,
            state_hash: state_hash(state)?,
        })
    }
}

/// Final state and one frame per action.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayResult {
    pub final_state: GameState,
    pub frames: Vec<ReplayFrame>,
}

/// A step that could not be reproduced.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ReplayError {
    #[error("step {step}: seq {seq} does not follow seq {previous}")]
    OutOfOrder { step: usize, seq: u64, previous: u64 },

    #[error("step {step} (seq {seq}): match already {status:?}")]
    PastTerminal { step: usize, seq: u64, status: MatchStatus },

    #[error("step {step} (seq {seq}): rejected with {code}: {message}")]
    Rejected {
        step: usize,
        seq: u64,
        code: ReasonCode,
        message: String,
    },

    #[error("step {step} (seq {seq}): {source}")]
    Pipeline {
        step: usize,
        seq: u64,
        #[source]
        source: PipelineError,
    },

    #[error("step {step} (seq {seq}): cannot hash state: {reason}")]
    Hash { step: usize, seq: u64, reason: String },
}

impl ReplayError {
    /// Zero-based index of the failing action.
    #[must_use]
    pub fn step(&self) -> usize {
        match self {
            ReplayError::OutOfOrder { step, .. }
            | ReplayError::PastTerminal { step, .. }
            | ReplayError::Rejected { step, .. }
            | ReplayError::Pipeline { step, .. }
            | ReplayError::Hash { step, .. } => *step,
        }
    }
}

/// Fold `actions` through `engine` from `initial` without validation.
pub fn replay<E>(initial: &GameState, actions: &[GameAction], engine: &E) -> Result<ReplayResult, ReplayError>
where
    E: RuleEngine + ?Sized,
{
    fold(initial, actions, engine, false)
}

/// Like `replay`, but every step must also pass `validate`.
pub fn replay_audited<E>(
    initial: &GameState,
    actions: &[GameAction],
    engine: &E,
) -> Result<ReplayResult, ReplayError>
where
    E: RuleEngine + ?Sized,
{
    fold(initial, actions, engine, true)
}

fn fold<E>(initial: &GameState, actions: &[GameAction], engine: &E, audit: bool) -> Result<ReplayResult, ReplayError>
where
    E: RuleEngine + ?Sized,
{
    let mut state = initial.clone();
    let mut frames = Vec::with_capacity(actions.len());
    let mut previous: Option<u64> = None;

    for (step, action) in actions.iter().enumerate() {
        let seq = action.seq;
        if let Some(previous) = previous.filter(|&p| seq <= p) {
            return Err(ReplayError::OutOfOrder { step, seq, previous });
        }
        if state.is_terminal() {
            return Err(ReplayError::PastTerminal {
                step,
                seq,
                status: state.status,
            });
        }

        if audit {
            let validation = engine.validate(&state, action);
            if let Some(first) = validation.errors().first() {
                return Err(ReplayError::Rejected {
                    step,
                    seq,
                    code: first.code,
                    message: first.message.clone(),
                });
            }
        }

        let Transition { next_state, .. } =
            pipeline::advance(engine, &state, action).map_err(|source| ReplayError::Pipeline { step, seq, source })?;

        let frame = ReplayFrame::record(action, &next_state).map_err(|e| ReplayError::Hash {
            step,
            seq,
            reason: e.to_string(),
        })?;
        frames.push(frame);
        state = next_state;
        previous = Some(seq);
    }

    debug!(
        match_id = %initial.match_id,
        steps = frames.len(),
        version = state.version,
        "replay complete"
    );
    Ok(ReplayResult {
        final_state: state,
        frames,
    })
}

/// What differs at the first diverging step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mismatch {
    /// Different actions were applied at this step.
    Action { left_seq: u64, right_seq: u64 },
    /// Same action, different resulting version.
    Version { left: u64, right: u64 },
    /// Same action and version, different state content.
    Hash { left: StateHash, right: StateHash },
    /// Only the left trace has this step.
    MissingRight,
    /// Only the right trace has this step.
    MissingLeft,
}

/// First step where two traces disagree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Divergence {
    pub step: usize,
    pub mismatch: Mismatch,
}

/// Compare two traces step by step.
///
/// Returns `None` when they are identical.
#[must_use]
pub fn first_divergence(left: &[ReplayFrame], right: &[ReplayFrame]) -> Option<Divergence> {
    let longest = left.len().max(right.len());
    let divergence = (0..longest).find_map(|step| {
        let mismatch = match (left.get(step), right.get(step)) {
            (Some(l), Some(r)) => compare(l, r)?,
            (Some(_), None) => Mismatch::MissingRight,
            (None, Some(_)) => Mismatch::MissingLeft,
            (None, None) => return None,
        };
        Some(Divergence { step, mismatch })
    });
    if let Some(d) = &divergence {
        warn!(step = d.step, mismatch = ?d.mismatch, "replay traces diverge");
    }
    divergence
}

fn compare(left: &ReplayFrame, right: &ReplayFrame) -> Option<Mismatch> {
    if left.seq != right.seq || left.action_id != right.action_id || left.action_type != right.action_type {
        Some(Mismatch::Action {
            left_seq: left.seq,
            right_seq: right.seq,
        })
    } else if left.state_version != right.state_version {
        Some(Mismatch::Version {
            left: left.state_version,
            right: right.state_version,
        })
    } else if left.state_hash != right.state_hash {
        Some(Mismatch::Hash {
            left: left.state_hash,
            right: right.state_hash,
        })
    } else {
        None
    }
}
