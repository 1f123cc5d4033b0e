//! # boardgame-core
//!
//! Deterministic action pipeline and replay verification for turn-based
//! board games (Splendor, Gomoku, Go-Stop, Catan, Azul).
//!
//! ## Design Principles
//!
//! 1. **One Contract**: Every game plugs in through `RuleEngine`
//!    (validate → reduce → evaluate-win). The pipeline, the session and
//!    replay never look inside a game's payload.
//!
//! 2. **Exactly One Transition**: An accepted action produces one successor
//!    state at `version + 1`. Rejections leave the state untouched.
//!    Finished and aborted matches absorb every further action.
//!
//! 3. **Reproducible From The Log**: All randomness is drawn from the match
//!    seed and the state version, so folding the action log over the
//!    initial state reproduces every intermediate state bit for bit.
//!
//! ## Architecture
//!
//! - **Persistent Data Structures**: Players and payloads live in `im`
//!   collections, so states clone in O(1) and replay can keep every frame.
//!
//! - **Content Hashing**: States are compared by an FNV-1a digest of their
//!   canonical JSON (sorted keys), so two hosts can compare runs step by
//!   step without shipping whole states.
//!
//! ## Modules
//!
//! - `core`: Players, states, actions, RNG, configuration
//! - `rules`: `RuleEngine` trait, reason codes, shared guards
//! - `pipeline`: validate → reduce → evaluate-win for one action
//! - `replay`: Log folding, frames, divergence search, hashing
//! - `log`: Append-only persisted action log
//! - `session`: Per-match serialization boundary (idempotency, seq order)
//! - `games`: The five rule engines and the engine registry
//! - `fixtures`: Test-vector documents and the scenario runner

pub mod core;
pub mod rules;
pub mod pipeline;
pub mod replay;
pub mod log;
pub mod session;
pub mod games;
pub mod fixtures;

// Re-export commonly used types
pub use crate::core::{
    GameAction, GameId, GameRng, GameState, MatchOptions, MatchStatus, Payload, PlayerId, PlayerState, Seats,
    SessionConfig,
};

pub use crate::rules::{Finish, GameResult, ReasonCode, Reduction, Rejection, RuleEngine, RuleFault, Validation};

pub use crate::pipeline::{apply, Applied, PipelineError, Transition};

pub use crate::replay::{replay, replay_audited, state_hash, ReplayError, ReplayFrame, ReplayResult, StateHash};

pub use crate::log::{ActionLog, ActionLogRecord};

pub use crate::session::{new_match, MatchSession, SessionError, SessionEvent};

pub use crate::games::EngineRegistry;

pub use crate::fixtures::{run_scenario, FixtureError, ScenarioReport, TestVector};
