//! Per-match serialization boundary.
//!
//! The pipeline assumes it runs against the single authoritative state and
//! knows nothing about duplicates. `MatchSession` supplies both guarantees:
//!
//! - `submit` takes `&mut self`, so at most one apply is in flight per match
//!   (hosts wrap a session in whatever per-match lock or actor they use).
//! - Before an action reaches `apply`, the session rejects replayed
//!   idempotency keys (`IDEMPOTENCY_REPLAY`), non-increasing seq
//!   (`SEQ_CONFLICT`), and, if configured, seq jumps (`SEQ_GAP`). A rejected
//!   action consumes neither its key nor its seq.
//!
//! Accepted actions are appended to the log and, when frames are recorded,
//! hashed, so `verify` can replay the log and compare.

use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::{GameAction, GameId, GameState, MatchOptions, MatchStatus, PlayerId, Seats, SessionConfig};
use crate::games::EngineRegistry;
use crate::log::{ActionLog, LogError};
use crate::pipeline::{self, Applied, PipelineError};
use crate::replay::{self, first_divergence, state_hash, Divergence, Mismatch, ReplayError, ReplayFrame};
use crate::rules::{Events, ReasonCode, Rejection, RuleEngine, SetupError};

/// Reason code reported when the catalog refuses a player count.
pub const INVALID_PLAYER_COUNT: ReasonCode = ReasonCode::new("INVALID_PLAYER_COUNT");

/// Failures of the session itself. Rejected actions are not errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no engine registered for {0}")]
    UnknownGame(GameId),

    #[error("{game} needs {min}-{max} players, got {count}")]
    InvalidPlayerCount {
        game: GameId,
        count: usize,
        min: usize,
        max: usize,
    },

    #[error("player {0} is seated twice")]
    DuplicatePlayer(PlayerId),

    #[error("setup failed: {0}")]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("action log: {0}")]
    Log(#[from] LogError),

    #[error("cannot hash state: {0}")]
    Hash(#[from] serde_json::Error),

    #[error("match is already {0:?}")]
    AlreadyTerminal(MatchStatus),

    #[error("version {requested} is ahead of current version {current}")]
    FutureVersion { requested: u64, current: u64 },

    #[error("replay failed: {0}")]
    Replay(#[from] ReplayError),
}

impl SessionError {
    /// Wire reason code, for errors that map to one.
    #[must_use]
    pub fn code(&self) -> Option<ReasonCode> {
        match self {
            SessionError::InvalidPlayerCount { .. } => Some(INVALID_PLAYER_COUNT),
            SessionError::AlreadyTerminal(MatchStatus::Aborted) => Some(ReasonCode::MATCH_ABORTED),
            SessionError::AlreadyTerminal(_) => Some(ReasonCode::MATCH_FINISHED),
            _ => None,
        }
    }
}

/// Notifications for connected clients, in wire shape.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    ActionAccepted {
        match_id: String,
        action_id: String,
        seq: u64,
        state_version: u64,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        events: Vec<String>,
    },
    ActionRejected {
        match_id: String,
        action_id: String,
        reason_code: ReasonCode,
        reason_message: String,
    },
    MatchStatusChanged {
        match_id: String,
        status: MatchStatus,
        winner_ids: Vec<PlayerId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    StateSynced {
        match_id: String,
        state: GameState,
        last_applied_seq: u64,
        /// Actions accepted after the client's version, in order.
        missed: Vec<GameAction>,
    },
}

impl SessionEvent {
    /// Reason code of a rejection event.
    #[must_use]
    pub fn reason_code(&self) -> Option<ReasonCode> {
        match self {
            SessionEvent::ActionRejected { reason_code, .. } => Some(*reason_code),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, SessionEvent::ActionAccepted { .. })
    }
}

/// Build the initial state for a new match.
///
/// Checks the catalog's player range and unique seats, then lets the
/// engine lay out its payload. The result is active at version 0.
pub fn new_match(
    registry: &EngineRegistry,
    game_id: GameId,
    match_id: impl Into<String>,
    players: Seats,
    options: &MatchOptions,
) -> Result<GameState, SessionError> {
    let engine = registry.engine(game_id).ok_or(SessionError::UnknownGame(game_id))?;
    let entry = registry.entry(game_id).ok_or(SessionError::UnknownGame(game_id))?;

    if !entry.accepts_player_count(players.len()) {
        return Err(SessionError::InvalidPlayerCount {
            game: game_id,
            count: players.len(),
            min: entry.min_players,
            max: entry.max_players,
        });
    }
    let mut seen = FxHashSet::default();
    for id in players.ids() {
        if !seen.insert(id) {
            return Err(SessionError::DuplicatePlayer(id.clone()));
        }
    }

    let setup = engine.setup(&players, options)?;
    let first = players
        .id_at(setup.first_seat)
        .cloned()
        .ok_or(SetupError::PlayerCount {
            game: game_id,
            count: players.len(),
        })?;

    let mut state = GameState::new(game_id, match_id, players)
        .with_phase(setup.phase)
        .with_payload(setup.payload)
        .with_status(MatchStatus::Active);
    state.current_player_id = first;
    Ok(state)
}

/// One hosted match.
pub struct MatchSession<'r> {
    engine: &'r dyn RuleEngine,
    config: SessionConfig,
    initial: GameState,
    state: GameState,
    log: ActionLog,
    seen_keys: FxHashSet<String>,
    frames: Vec<ReplayFrame>,
}

impl<'r> MatchSession<'r> {
    /// Create a match and open a session on it.
    pub fn start(
        registry: &'r EngineRegistry,
        game_id: GameId,
        match_id: impl Into<String>,
        players: Seats,
        options: &MatchOptions,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let initial = new_match(registry, game_id, match_id, players, options)?;
        Self::open(registry, initial, config)
    }

    /// Open a session on a prepared initial state.
    pub fn open(registry: &'r EngineRegistry, initial: GameState, config: SessionConfig) -> Result<Self, SessionError> {
        let engine = registry
            .engine(initial.game_id)
            .ok_or(SessionError::UnknownGame(initial.game_id))?;
        info!(
            game = %initial.game_id,
            match_id = %initial.match_id,
            players = initial.player_count(),
            "match opened"
        );
        Ok(Self {
            engine,
            config,
            log: ActionLog::new(initial.game_id, initial.match_id.clone()),
            state: initial.clone(),
            initial,
            seen_keys: FxHashSet::default(),
            frames: Vec::new(),
        })
    }

    /// Current authoritative state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// State the log replays from.
    pub fn initial_state(&self) -> &GameState {
        &self.initial
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// Frames recorded for accepted actions (empty if disabled).
    pub fn frames(&self) -> &[ReplayFrame] {
        &self.frames
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.log.last_seq()
    }

    pub fn engine(&self) -> &'r dyn RuleEngine {
        self.engine
    }

    /// Submit one action.
    ///
    /// Returns the events to broadcast. A rejection is an
    /// `ActionRejected` event, not an error; errors mean the engine broke
    /// its contract and the session state was left as it was.
    pub fn submit(&mut self, action: GameAction) -> Result<Vec<SessionEvent>, SessionError> {
        if let Some(rejection) = self.precheck(&action) {
            debug!(
                match_id = %self.state.match_id,
                seq = action.seq,
                reason = %rejection.code,
                "action refused before pipeline"
            );
            return Ok(vec![self.rejected(&action, &rejection)]);
        }

        let transition = match pipeline::apply(self.engine, &self.state, &action)? {
            Applied::Rejected(rejections) => {
                let first = rejections
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| Rejection::new(ReasonCode::INVALID_STATE, "rejected"));
                return Ok(vec![self.rejected(&action, &first)]);
            }
            Applied::Accepted(transition) => transition,
        };

        let frame = if self.config.record_frames {
            Some(ReplayFrame::record(&action, &transition.next_state)?)
        } else {
            None
        };

        let mut out = vec![SessionEvent::ActionAccepted {
            match_id: self.state.match_id.clone(),
            action_id: action.action_id.clone(),
            seq: action.seq,
            state_version: transition.next_state.version,
            events: tags(&transition.events),
        }];
        if transition.next_state.status != self.state.status {
            let reason = transition.finish.as_ref().and_then(|f| f.reason.clone());
            info!(
                match_id = %self.state.match_id,
                status = ?transition.next_state.status,
                winners = ?transition.next_state.winner_ids,
                reason = reason.as_deref().unwrap_or(""),
                "match status changed"
            );
            out.push(SessionEvent::MatchStatusChanged {
                match_id: self.state.match_id.clone(),
                status: transition.next_state.status,
                winner_ids: transition.next_state.winner_ids.clone(),
                reason,
            });
        }

        let key = action.idempotency_key.clone();
        self.log.append(action)?;
        self.seen_keys.insert(key);
        self.frames.extend(frame);
        self.state = transition.next_state;
        Ok(out)
    }

    fn precheck(&self, action: &GameAction) -> Option<Rejection> {
        if self.seen_keys.contains(&action.idempotency_key) {
            return Some(Rejection::new(
                ReasonCode::IDEMPOTENCY_REPLAY,
                format!("idempotency key {} was already applied", action.idempotency_key),
            ));
        }
        let last = self.log.last_seq();
        if let Some(last) = last.filter(|&last| action.seq <= last) {
            return Some(Rejection::new(
                ReasonCode::SEQ_CONFLICT,
                format!("seq {} does not follow last accepted seq {}", action.seq, last),
            ));
        }
        if let Some(max_gap) = self.config.max_seq_gap {
            let gap = action.seq - last.unwrap_or(0);
            if gap > max_gap {
                return Some(Rejection::new(
                    ReasonCode::SEQ_GAP,
                    format!("seq jumps by {}, at most {} allowed", gap, max_gap),
                ));
            }
        }
        None
    }

    fn rejected(&self, action: &GameAction, rejection: &Rejection) -> SessionEvent {
        SessionEvent::ActionRejected {
            match_id: self.state.match_id.clone(),
            action_id: action.action_id.clone(),
            reason_code: rejection.code,
            reason_message: rejection.message.clone(),
        }
    }

    /// Current state plus every action accepted after `from_version`.
    pub fn resync(&self, from_version: u64) -> Result<SessionEvent, SessionError> {
        if from_version > self.state.version {
            return Err(SessionError::FutureVersion {
                requested: from_version,
                current: self.state.version,
            });
        }
        // Version n is produced by the (n - initial)th logged action.
        let skip = from_version.saturating_sub(self.initial.version) as usize;
        let missed = self.log.actions().get(skip..).unwrap_or_default().to_vec();
        Ok(SessionEvent::StateSynced {
            match_id: self.state.match_id.clone(),
            state: self.state.clone(),
            last_applied_seq: self.log.last_seq().unwrap_or(0),
            missed,
        })
    }

    /// Replay the log from the initial state and compare with what the
    /// session recorded.
    ///
    /// `Ok(None)` means the replay reproduced the session exactly.
    pub fn verify(&self) -> Result<Option<Divergence>, SessionError> {
        let replayed = replay::replay(&self.initial, self.log.actions(), self.engine)?;
        if self.config.record_frames {
            if let Some(divergence) = first_divergence(&self.frames, &replayed.frames) {
                return Ok(Some(divergence));
            }
        }

        let mut expected = replayed.final_state;
        if self.state.status == MatchStatus::Aborted {
            expected.status = MatchStatus::Aborted;
        }
        let live = state_hash(&self.state)?;
        let derived = state_hash(&expected)?;
        if live == derived {
            Ok(None)
        } else {
            Ok(Some(Divergence {
                step: self.log.len().saturating_sub(1),
                mismatch: Mismatch::Hash {
                    left: live,
                    right: derived,
                },
            }))
        }
    }

    /// Abort the match. Terminal states cannot be aborted.
    pub fn abort(&mut self, reason: impl Into<String>) -> Result<SessionEvent, SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::AlreadyTerminal(self.state.status));
        }
        let reason = reason.into();
        info!(match_id = %self.state.match_id, %reason, "match aborted");
        self.state = self.state.clone().with_status(MatchStatus::Aborted);
        Ok(SessionEvent::MatchStatusChanged {
            match_id: self.state.match_id.clone(),
            status: MatchStatus::Aborted,
            winner_ids: Vec::new(),
            reason: Some(reason),
        })
    }
}

fn tags(events: &Events) -> Vec<String> {
    events.iter().map(|e| e.to_string()).collect()
}
