//! Rule engine trait for game implementations.
//!
//! Games implement `RuleEngine` to define their rules:
//! - Whether an action is legal right now (`validate`)
//! - How an accepted action produces the next state (`reduce`)
//! - Whether a state is terminal, and who won (`evaluate_win`)
//!
//! The pipeline calls these in that order and owns everything else
//! (status override, winner assignment, invariant checks).

use std::borrow::Cow;
use std::fmt;

use serde::{Serialize, Serializer};
use smallvec::SmallVec;

use crate::core::{GameAction, GameId, GameState, MatchOptions, Payload, PlayerId, Seats};

/// Machine-readable rejection reason.
///
/// Opaque to the pipeline. Shared codes live here; engines declare their
/// own with `ReasonCode::new`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReasonCode(&'static str);

impl ReasonCode {
    pub const NOT_PLAYER_TURN: ReasonCode = ReasonCode("NOT_PLAYER_TURN");
    pub const NOT_A_PLAYER: ReasonCode = ReasonCode("NOT_A_PLAYER");
    pub const MATCH_FINISHED: ReasonCode = ReasonCode("MATCH_FINISHED");
    pub const MATCH_ABORTED: ReasonCode = ReasonCode("MATCH_ABORTED");
    pub const MATCH_MISMATCH: ReasonCode = ReasonCode("MATCH_MISMATCH");
    pub const GAME_MISMATCH: ReasonCode = ReasonCode("GAME_MISMATCH");
    pub const INVALID_PAYLOAD: ReasonCode = ReasonCode("INVALID_PAYLOAD");
    pub const INVALID_STATE: ReasonCode = ReasonCode("INVALID_STATE");
    pub const UNKNOWN_ACTION: ReasonCode = ReasonCode("UNKNOWN_ACTION");
    pub const STAGE_VIOLATION: ReasonCode = ReasonCode("STAGE_VIOLATION");
    pub const SEQ_CONFLICT: ReasonCode = ReasonCode("SEQ_CONFLICT");
    pub const SEQ_GAP: ReasonCode = ReasonCode("SEQ_GAP");
    pub const IDEMPOTENCY_REPLAY: ReasonCode = ReasonCode("IDEMPOTENCY_REPLAY");

    /// Declare a reason code.
    #[must_use]
    pub const fn new(code: &'static str) -> Self {
        Self(code)
    }

    /// The code as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for ReasonCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

impl PartialEq<str> for ReasonCode {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// One reason an action was refused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub code: ReasonCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Rejection {
    /// Create a rejection.
    pub fn new(code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
        }
    }

    /// Point the rejection at a payload field.
    #[must_use]
    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Rejections are usually single.
pub type Rejections = SmallVec<[Rejection; 1]>;

/// Verdict of `validate`: ok, or one or more rejections.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Validation {
    errors: Rejections,
}

impl Validation {
    /// An accepting verdict.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// A verdict with a single rejection.
    #[must_use]
    pub fn reject(rejection: Rejection) -> Self {
        let mut errors = Rejections::new();
        errors.push(rejection);
        Self { errors }
    }

    /// Add another rejection.
    pub fn push(&mut self, rejection: Rejection) {
        self.errors.push(rejection);
    }

    /// Whether the action may be reduced.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// The rejections (empty when ok).
    #[must_use]
    pub fn errors(&self) -> &[Rejection] {
        &self.errors
    }

    /// Take the rejections.
    #[must_use]
    pub fn into_errors(self) -> Rejections {
        self.errors
    }
}

impl From<Result<(), Rejection>> for Validation {
    fn from(result: Result<(), Rejection>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(rejection) => Self::reject(rejection),
        }
    }
}

/// Semantic event tags emitted by a reduction (e.g. `"capture"`).
///
/// For observability and notification, never for control flow.
pub type Events = SmallVec<[Cow<'static, str>; 4]>;

/// Output of `reduce`.
#[derive(Clone, Debug, PartialEq)]
pub struct Reduction {
    pub next_state: GameState,
    pub events: Events,
}

impl Reduction {
    /// A reduction with no events.
    #[must_use]
    pub fn new(next_state: GameState) -> Self {
        Self {
            next_state,
            events: Events::new(),
        }
    }

    /// Append an event tag.
    pub fn emit(&mut self, event: impl Into<Cow<'static, str>>) {
        self.events.push(event.into());
    }
}

/// Result of a completed game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameResult {
    /// Single winner.
    Winner(PlayerId),
    /// Draw (no winner).
    Draw,
    /// Multiple winners (shared victory, ties).
    Winners(Vec<PlayerId>),
}

impl GameResult {
    /// Build a result from a list of tied leaders.
    #[must_use]
    pub fn from_leaders(mut leaders: Vec<PlayerId>) -> Self {
        match leaders.len() {
            0 => GameResult::Draw,
            1 => GameResult::Winner(leaders.remove(0)),
            _ => GameResult::Winners(leaders),
        }
    }

    /// Check if a player won.
    #[must_use]
    pub fn is_winner(&self, player: &PlayerId) -> bool {
        match self {
            GameResult::Winner(p) => p == player,
            GameResult::Winners(ps) => ps.contains(player),
            GameResult::Draw => false,
        }
    }

    /// Winner ids as stored on the state (empty for a draw).
    #[must_use]
    pub fn winner_ids(&self) -> Vec<PlayerId> {
        match self {
            GameResult::Winner(p) => vec![p.clone()],
            GameResult::Winners(ps) => ps.clone(),
            GameResult::Draw => Vec::new(),
        }
    }
}

/// A terminal verdict from `evaluate_win`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Finish {
    pub result: GameResult,
    /// Short tag, surfaced as a `finish:<reason>` event.
    pub reason: Option<String>,
}

impl Finish {
    /// A finish with a reason tag.
    pub fn new(result: GameResult, reason: impl Into<String>) -> Self {
        Self {
            result,
            reason: Some(reason.into()),
        }
    }

    /// A single-winner finish.
    pub fn winner(player: PlayerId, reason: impl Into<String>) -> Self {
        Self::new(GameResult::Winner(player), reason)
    }

    /// A draw.
    pub fn draw(reason: impl Into<String>) -> Self {
        Self::new(GameResult::Draw, reason)
    }
}

/// A reducer or evaluator could not proceed.
///
/// Never expected after a successful `validate`; when it happens it is a
/// validation gap or a corrupt log, and the call that hit it fails.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RuleFault {
    #[error("{game} does not handle action type {action_type}")]
    UnsupportedAction { game: GameId, action_type: String },

    #[error("malformed {action_type} arguments: {reason}")]
    MalformedArgs { action_type: String, reason: String },

    #[error("corrupt {game} payload: {reason}")]
    CorruptPayload { game: GameId, reason: String },

    #[error("illegal {action_type}: {reason}")]
    Illegal { action_type: String, reason: String },
}

impl RuleFault {
    /// Turn a rejection met during reduction into a fault.
    #[must_use]
    pub fn from_rejection(action: &GameAction, rejection: Rejection) -> Self {
        RuleFault::Illegal {
            action_type: action.action_type.clone(),
            reason: rejection.to_string(),
        }
    }
}

/// Setup could not build an initial payload.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    #[error("{game} cannot seat {count} players")]
    PlayerCount { game: GameId, count: usize },

    #[error("unknown {game} variant {variant}")]
    UnknownVariant { game: GameId, variant: String },

    #[error("cannot encode {game} payload: {reason}")]
    Encode { game: GameId, reason: String },
}

/// Initial engine-owned parts of a state.
#[derive(Clone, Debug, PartialEq)]
pub struct Setup {
    pub phase: String,
    pub payload: Payload,
    /// Seat that acts first.
    pub first_seat: usize,
}

/// Rule engine trait.
///
/// ## Implementation Notes
///
/// - `validate`: no side effects; same inputs always give the same verdict
/// - `reduce`: start from `state.successor()`, never mutate `state`
/// - `reduce`: must not set a terminal status; `evaluate_win` decides that
/// - `evaluate_win`: no wall clock, no unseeded randomness, no hash-order
///   iteration in tie-breaks
pub trait RuleEngine: Send + Sync {
    /// The game this engine owns.
    fn game_id(&self) -> GameId;

    /// Build the initial phase and payload for a new match.
    fn setup(&self, players: &Seats, options: &MatchOptions) -> Result<Setup, SetupError>;

    /// Decide legality of `action` against `state`.
    fn validate(&self, state: &GameState, action: &GameAction) -> Validation;

    /// Produce the next state for an accepted action.
    fn reduce(&self, state: &GameState, action: &GameAction) -> Result<Reduction, RuleFault>;

    /// Check if the game is over.
    ///
    /// Returns `Some(finish)` if the state is terminal, `None` if it continues.
    fn evaluate_win(&self, state: &GameState) -> Result<Option<Finish>, RuleFault>;

    /// Action types any seated player may submit regardless of turn.
    fn is_turn_exempt(&self, _action_type: &str) -> bool {
        false
    }
}
