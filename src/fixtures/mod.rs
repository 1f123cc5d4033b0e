//! Test-vector documents.
//!
//! A vector pins the expected behavior of one game as data: a set of named
//! initial-state overrides, and scenarios that each name one of them, list
//! ordered steps with the verdict every step must get, and state how the
//! match must end.
//!
//! ```text
//! { gameId, rulesetVersion, scenarioCounts: {normal, illegal, edge},
//!   initialStates: { name: { phase?, currentPlayerId?, players?, seed?, variant?, ..payload } },
//!   scenarios: [ { id, kind, title, description, initialStateRef,
//!                  steps: [ { seq, actorId, type, payload, expect: {accepted, reasonCode?},
//!                             idempotencyKey? } ],
//!                  expected: { terminalPhase, winners, stateAssertions } } ],
//!   sources: [url ..] }
//! ```
//!
//! `run_scenario` drives a scenario through a real [`MatchSession`], so the
//! sequencing checks of the session (idempotency keys, seq order) are part of
//! what a vector can pin down.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::{GameAction, GameId, GameState, MatchOptions, MatchStatus, PlayerId, Seats, SessionConfig};
use crate::games::EngineRegistry;
use crate::session::{self, MatchSession, SessionError, SessionEvent};

/// Override keys that address the state rather than the payload.
const PHASE_KEY: &str = "phase";
const CURRENT_PLAYER_KEY: &str = "currentPlayerId";
const PLAYERS_KEY: &str = "players";
const SEED_KEY: &str = "seed";
const VARIANT_KEY: &str = "variant";

/// `terminalPhase` value that asks for a finished match instead of a phase.
pub const FINISHED: &str = "finished";

/// Fixture loading and checking failures.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed test vector: {0}")]
    Json(#[from] serde_json::Error),

    #[error("vector is for {found}, expected {expected}")]
    WrongGame { expected: GameId, found: GameId },

    #[error("vector has no scenarios")]
    NoScenarios,

    #[error("vector cites no sources")]
    NoSources,

    #[error("{kind} scenarios: {declared} declared, {found} present")]
    CountMismatch {
        kind: ScenarioKind,
        declared: usize,
        found: usize,
    },

    #[error("scenario {scenario} refers to unknown initial state {reference}")]
    UnknownInitialState { scenario: String, reference: String },

    #[error("scenario {0} has no steps")]
    EmptyScenario(String),

    #[error("initial state {reference}: {reason}")]
    InvalidOverride { reference: String, reason: String },

    #[error("no engine registered for {0}")]
    UnknownGame(GameId),

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    Normal,
    Illegal,
    Edge,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 3] = [ScenarioKind::Normal, ScenarioKind::Illegal, ScenarioKind::Edge];

    pub const fn as_str(self) -> &'static str {
        match self {
            ScenarioKind::Normal => "normal",
            ScenarioKind::Illegal => "illegal",
            ScenarioKind::Edge => "edge",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared number of scenarios per kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioCounts {
    pub normal: usize,
    pub illegal: usize,
    pub edge: usize,
}

impl ScenarioCounts {
    pub fn get(&self, kind: ScenarioKind) -> usize {
        match kind {
            ScenarioKind::Normal => self.normal,
            ScenarioKind::Illegal => self.illegal,
            ScenarioKind::Edge => self.edge,
        }
    }
}

/// Verdict a step must receive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioStep {
    pub seq: u64,
    pub actor_id: PlayerId,
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    pub expect: Expectation,
    /// Defaults to a key unique to the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// How a scenario must end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedOutcome {
    pub terminal_phase: String,
    pub winners: Vec<PlayerId>,
    /// Human-readable notes; not checked.
    #[serde(default)]
    pub state_assertions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    pub kind: ScenarioKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub initial_state_ref: String,
    pub steps: Vec<ScenarioStep>,
    pub expected: ExpectedOutcome,
}

impl Scenario {
    /// Match id used when the scenario runs.
    pub fn match_id(&self) -> String {
        format!("fixture-{}", self.id)
    }
}

/// One game's test-vector document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestVector {
    pub game_id: GameId,
    pub ruleset_version: String,
    pub scenario_counts: ScenarioCounts,
    pub initial_states: BTreeMap<String, Map<String, Value>>,
    pub scenarios: Vec<Scenario>,
    pub sources: Vec<String>,
}

impl TestVector {
    pub fn from_json(text: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Structural checks: right game, declared counts honest, every
    /// reference resolvable, every scenario non-empty.
    pub fn check(&self, expected: GameId) -> Result<(), FixtureError> {
        if self.game_id != expected {
            return Err(FixtureError::WrongGame {
                expected,
                found: self.game_id,
            });
        }
        if self.scenarios.is_empty() {
            return Err(FixtureError::NoScenarios);
        }
        if self.sources.is_empty() {
            return Err(FixtureError::NoSources);
        }
        for kind in ScenarioKind::ALL {
            let found = self.scenarios.iter().filter(|s| s.kind == kind).count();
            let declared = self.scenario_counts.get(kind);
            if found != declared {
                return Err(FixtureError::CountMismatch { kind, declared, found });
            }
        }
        for scenario in &self.scenarios {
            if !self.initial_states.contains_key(&scenario.initial_state_ref) {
                return Err(FixtureError::UnknownInitialState {
                    scenario: scenario.id.clone(),
                    reference: scenario.initial_state_ref.clone(),
                });
            }
            if scenario.steps.is_empty() {
                return Err(FixtureError::EmptyScenario(scenario.id.clone()));
            }
        }
        Ok(())
    }

    pub fn scenario(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// Initial state for `scenario`: a fresh match with the named overrides
    /// applied on top.
    pub fn initial_state(&self, registry: &EngineRegistry, scenario: &Scenario) -> Result<GameState, FixtureError> {
        let reference = &scenario.initial_state_ref;
        let overrides = self
            .initial_states
            .get(reference)
            .ok_or_else(|| FixtureError::UnknownInitialState {
                scenario: scenario.id.clone(),
                reference: reference.clone(),
            })?;
        let invalid = |reason: String| FixtureError::InvalidOverride {
            reference: reference.clone(),
            reason,
        };

        let entry = registry.entry(self.game_id).ok_or(FixtureError::UnknownGame(self.game_id))?;
        let players: Vec<String> = match overrides.get(PLAYERS_KEY) {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| invalid(format!("players: {}", e)))?,
            None => (1..=entry.min_players).map(|n| format!("p{}", n)).collect(),
        };
        let mut options = MatchOptions::default();
        if let Some(value) = overrides.get(SEED_KEY) {
            options.seed = value
                .as_u64()
                .ok_or_else(|| invalid("seed must be an unsigned integer".into()))?;
        }
        if let Some(value) = overrides.get(VARIANT_KEY) {
            let variant = value.as_str().ok_or_else(|| invalid("variant must be a string".into()))?;
            options = options.with_variant(variant);
        }

        let mut state = session::new_match(
            registry,
            self.game_id,
            scenario.match_id(),
            Seats::from_ids(players),
            &options,
        )?;

        let mut fields = Map::new();
        for (key, value) in overrides {
            match key.as_str() {
                PHASE_KEY => {
                    state.phase = value
                        .as_str()
                        .ok_or_else(|| invalid("phase must be a string".into()))?
                        .to_string();
                }
                CURRENT_PLAYER_KEY => {
                    let player = PlayerId::new(
                        value
                            .as_str()
                            .ok_or_else(|| invalid("currentPlayerId must be a string".into()))?,
                    );
                    if !state.players.contains(&player) {
                        return Err(invalid(format!("{} is not seated", player)));
                    }
                    state.current_player_id = player;
                }
                PLAYERS_KEY | SEED_KEY | VARIANT_KEY => {}
                _ => {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }
        state.payload.merge(&fields);
        Ok(state)
    }
}

/// A step whose verdict differed from the expectation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepMismatch {
    pub index: usize,
    pub seq: u64,
    pub expected: Expectation,
    pub accepted: bool,
    pub reason_code: Option<String>,
}

/// Terminal outcome that differed from the expectation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerminalMismatch {
    pub expected_phase: String,
    pub phase: String,
    pub status: MatchStatus,
    pub expected_winners: Vec<PlayerId>,
    pub winners: Vec<PlayerId>,
}

/// Result of running one scenario.
#[derive(Clone, Debug)]
pub struct ScenarioReport {
    pub scenario_id: String,
    pub steps: Vec<StepMismatch>,
    pub terminal: Option<TerminalMismatch>,
    pub final_state: GameState,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.steps.is_empty() && self.terminal.is_none()
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            return write!(f, "{}: ok", self.scenario_id);
        }
        write!(f, "{}:", self.scenario_id)?;
        for m in &self.steps {
            write!(
                f,
                " step {} (seq {}) expected accepted={} {:?}, got accepted={} {:?};",
                m.index, m.seq, m.expected.accepted, m.expected.reason_code, m.accepted, m.reason_code
            )?;
        }
        if let Some(t) = &self.terminal {
            write!(
                f,
                " expected {} {:?}, got {} ({:?}) {:?}",
                t.expected_phase, t.expected_winners, t.phase, t.status, t.winners
            )?;
        }
        Ok(())
    }
}

/// Run `scenario` of `vector` through a fresh session.
///
/// Verdict mismatches are reported, not raised; `Err` means the scenario
/// could not be run at all.
pub fn run_scenario(
    registry: &EngineRegistry,
    vector: &TestVector,
    scenario: &Scenario,
) -> Result<ScenarioReport, FixtureError> {
    let initial = vector.initial_state(registry, scenario)?;
    let match_id = initial.match_id.clone();
    let mut session = MatchSession::open(registry, initial, SessionConfig::default())?;
    let mut mismatches = Vec::new();

    for (index, step) in scenario.steps.iter().enumerate() {
        let key = step
            .idempotency_key
            .clone()
            .unwrap_or_else(|| format!("{}-step-{}", match_id, index));
        let action = GameAction::new(vector.game_id, match_id.as_str(), step.actor_id.clone(), step.action_type.as_str(), step.seq)
            .with_payload(Value::Object(step.payload.clone()))
            .with_action_id(format!("{}-step-{}", match_id, index))
            .with_idempotency_key(key);

        let events = session.submit(action)?;
        let accepted = events.iter().any(SessionEvent::is_accepted);
        let reason_code = events
            .iter()
            .find_map(SessionEvent::reason_code)
            .map(|code| code.as_str().to_string());

        let matches = accepted == step.expect.accepted
            && (step.expect.reason_code.is_none() || step.expect.reason_code == reason_code);
        if !matches {
            debug!(
                scenario = %scenario.id,
                index,
                seq = step.seq,
                accepted,
                reason = reason_code.as_deref().unwrap_or(""),
                "step verdict differs from fixture"
            );
            mismatches.push(StepMismatch {
                index,
                seq: step.seq,
                expected: step.expect.clone(),
                accepted,
                reason_code,
            });
        }
    }

    let state = session.state().clone();
    let expected = &scenario.expected;
    let phase_ok = if expected.terminal_phase == FINISHED {
        state.status == MatchStatus::Finished
    } else {
        state.phase == expected.terminal_phase && !state.is_terminal()
    };
    let winners_ok = same_players(&state.winner_ids, &expected.winners);
    let terminal = (!phase_ok || !winners_ok).then(|| TerminalMismatch {
        expected_phase: expected.terminal_phase.clone(),
        phase: state.phase.clone(),
        status: state.status,
        expected_winners: expected.winners.clone(),
        winners: state.winner_ids.clone(),
    });

    Ok(ScenarioReport {
        scenario_id: scenario.id.clone(),
        steps: mismatches,
        terminal,
        final_state: state,
    })
}

/// Run every scenario of `vector`.
pub fn run_all(registry: &EngineRegistry, vector: &TestVector) -> Result<Vec<ScenarioReport>, FixtureError> {
    vector
        .scenarios
        .iter()
        .map(|scenario| run_scenario(registry, vector, scenario))
        .collect()
}

/// Winner lists compare as sets.
fn same_players(actual: &[PlayerId], expected: &[PlayerId]) -> bool {
    let mut a = actual.to_vec();
    let mut b = expected.to_vec();
    a.sort();
    b.sort();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vector() -> TestVector {
        let doc = json!({
            "gameId": "gomoku",
            "rulesetVersion": "freestyle-15",
            "scenarioCounts": {"normal": 1, "illegal": 1, "edge": 0},
            "initialStates": {
                "empty": {"phase": "placing", "currentPlayerId": "p1"}
            },
            "scenarios": [
                {
                    "id": "n1",
                    "kind": "normal",
                    "title": "Center stone",
                    "description": "",
                    "initialStateRef": "empty",
                    "steps": [
                        {"seq": 1, "actorId": "p1", "type": "PLACE_STONE",
                         "payload": {"x": 7, "y": 7}, "expect": {"accepted": true}}
                    ],
                    "expected": {"terminalPhase": "placing", "winners": [], "stateAssertions": []}
                },
                {
                    "id": "i1",
                    "kind": "illegal",
                    "title": "Out of turn",
                    "description": "",
                    "initialStateRef": "empty",
                    "steps": [
                        {"seq": 1, "actorId": "p2", "type": "PLACE_STONE",
                         "payload": {"x": 0, "y": 0},
                         "expect": {"accepted": false, "reasonCode": "NOT_PLAYER_TURN"}}
                    ],
                    "expected": {"terminalPhase": "placing", "winners": [], "stateAssertions": []}
                }
            ],
            "sources": ["https://example.org/gomoku"]
        });
        serde_json::from_value(doc).unwrap()
    }

    #[test]
    fn test_check_accepts_consistent_vector() {
        vector().check(GameId::Gomoku).unwrap();
    }

    #[test]
    fn test_check_rejects_wrong_game() {
        let err = vector().check(GameId::Azul).unwrap_err();
        assert!(matches!(err, FixtureError::WrongGame { .. }));
    }

    #[test]
    fn test_check_rejects_dishonest_counts() {
        let mut v = vector();
        v.scenario_counts.edge = 2;
        let err = v.check(GameId::Gomoku).unwrap_err();
        assert!(matches!(
            err,
            FixtureError::CountMismatch {
                kind: ScenarioKind::Edge,
                declared: 2,
                found: 0
            }
        ));
    }

    #[test]
    fn test_check_rejects_dangling_reference() {
        let mut v = vector();
        v.scenarios[0].initial_state_ref = "missing".into();
        assert!(matches!(
            v.check(GameId::Gomoku),
            Err(FixtureError::UnknownInitialState { .. })
        ));
    }

    #[test]
    fn test_check_rejects_missing_sources() {
        let mut v = vector();
        v.sources.clear();
        assert!(matches!(v.check(GameId::Gomoku), Err(FixtureError::NoSources)));
    }

    #[test]
    fn test_scenarios_pass() {
        let registry = EngineRegistry::standard();
        let v = vector();
        for report in run_all(&registry, &v).unwrap() {
            assert!(report.passed(), "{}", report);
        }
    }

    #[test]
    fn test_wrong_expectation_is_reported() {
        let registry = EngineRegistry::standard();
        let mut v = vector();
        v.scenarios[0].steps[0].expect = Expectation {
            accepted: false,
            reason_code: Some("CELL_OCCUPIED".into()),
        };
        let report = run_scenario(&registry, &v, &v.scenarios[0]).unwrap();
        assert!(!report.passed());
        assert_eq!(report.steps.len(), 1);
        assert!(report.steps[0].accepted);
        assert!(report.terminal.is_none());
    }

    #[test]
    fn test_overrides_reach_state_and_payload() {
        let registry = EngineRegistry::standard();
        let mut v = vector();
        v.initial_states
            .get_mut("empty")
            .unwrap()
            .insert("currentPlayerId".into(), json!("p2"));
        v.initial_states
            .get_mut("empty")
            .unwrap()
            .insert("nextColor".into(), json!("W"));
        let state = v.initial_state(&registry, &v.scenarios[0]).unwrap();
        assert_eq!(state.current_player_id, PlayerId::new("p2"));
        assert_eq!(state.payload.get("nextColor"), Some(&json!("W")));
        assert_eq!(state.match_id, "fixture-n1");
    }

    #[test]
    fn test_unseated_current_player_is_refused() {
        let registry = EngineRegistry::standard();
        let mut v = vector();
        v.initial_states
            .get_mut("empty")
            .unwrap()
            .insert("currentPlayerId".into(), json!("p9"));
        assert!(matches!(
            v.initial_state(&registry, &v.scenarios[0]),
            Err(FixtureError::InvalidOverride { .. })
        ));
    }
}
