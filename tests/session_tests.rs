//! Session boundary and persisted log, end to end.
//!
//! Covers what a host sees: match creation against the catalog, duplicate
//! and out-of-order submissions, reconnect sync, and restoring a match from
//! its bincode log.

use boardgame_core::core::{GameAction, GameId, MatchOptions, MatchStatus, PlayerId, Seats, SessionConfig};
use boardgame_core::games::{azul, gomoku, EngineRegistry};
use boardgame_core::log::ActionLog;
use boardgame_core::replay::{replay, state_hash};
use boardgame_core::rules::ReasonCode;
use boardgame_core::session::{new_match, MatchSession, SessionError, SessionEvent, INVALID_PLAYER_COUNT};
use serde_json::json;

fn stone(actor: &str, seq: u64, x: u64, y: u64) -> GameAction {
    GameAction::new(GameId::Gomoku, "g1", actor, gomoku::PLACE_STONE, seq).with_payload(json!({"x": x, "y": y}))
}

fn gomoku_session(registry: &EngineRegistry, config: SessionConfig) -> MatchSession<'_> {
    MatchSession::start(
        registry,
        GameId::Gomoku,
        "g1",
        Seats::from_ids(["p1", "p2"]),
        &MatchOptions::default(),
        config,
    )
    .unwrap()
}

#[test]
fn test_catalog_player_ranges() {
    let registry = EngineRegistry::standard();
    let cases: [(GameId, usize, bool); 8] = [
        (GameId::Gomoku, 2, true),
        (GameId::Gomoku, 3, false),
        (GameId::Catan, 2, false),
        (GameId::Catan, 4, true),
        (GameId::Gostop, 3, true),
        (GameId::Gostop, 4, false),
        (GameId::Azul, 4, true),
        (GameId::Splendor, 5, false),
    ];
    for (game, count, ok) in cases {
        let ids: Vec<String> = (1..=count).map(|n| format!("p{}", n)).collect();
        let result = new_match(&registry, game, "m", Seats::from_ids(ids), &MatchOptions::default());
        match result {
            Ok(state) => {
                assert!(ok, "{} accepted {} players", game, count);
                assert_eq!(state.status, MatchStatus::Active);
                assert_eq!(state.version, 0);
            }
            Err(err) => {
                assert!(!ok, "{} refused {} players: {}", game, count, err);
                assert_eq!(err.code(), Some(INVALID_PLAYER_COUNT));
            }
        }
    }
}

#[test]
fn test_unregistered_game() {
    let registry = EngineRegistry::new();
    let err = new_match(&registry, GameId::Azul, "m", Seats::from_ids(["p1", "p2"]), &MatchOptions::default())
        .unwrap_err();
    assert!(matches!(err, SessionError::UnknownGame(GameId::Azul)));
}

#[test]
fn test_unknown_variant_fails_setup() {
    let registry = EngineRegistry::standard();
    let err = new_match(
        &registry,
        GameId::Azul,
        "m",
        Seats::from_ids(["p1", "p2"]),
        &MatchOptions::default().with_variant("joker_tiles"),
    )
    .unwrap_err();
    assert!(matches!(err, SessionError::Setup(_)));
}

#[test]
fn test_resubmission_is_harmless() {
    let registry = EngineRegistry::standard();
    let mut session = gomoku_session(&registry, SessionConfig::default());

    let first = session.submit(stone("p1", 1, 7, 7)).unwrap();
    let again = session.submit(stone("p1", 1, 7, 7)).unwrap();

    assert!(first[0].is_accepted());
    assert_eq!(again[0].reason_code(), Some(ReasonCode::IDEMPOTENCY_REPLAY));
    assert_eq!(session.state().version, 1);
    assert_eq!(session.log().len(), 1);
}

#[test]
fn test_seq_must_increase() {
    let registry = EngineRegistry::standard();
    let mut session = gomoku_session(&registry, SessionConfig::default());
    session.submit(stone("p1", 5, 7, 7)).unwrap();

    let stale = stone("p2", 3, 8, 8).with_idempotency_key("fresh");
    let events = session.submit(stale).unwrap();

    assert_eq!(events[0].reason_code(), Some(ReasonCode::SEQ_CONFLICT));
    // Gaps are fine when unbounded.
    assert!(session.submit(stone("p2", 9, 8, 8)).unwrap()[0].is_accepted());
}

#[test]
fn test_bounded_gap() {
    let registry = EngineRegistry::standard();
    let mut session = gomoku_session(&registry, SessionConfig::default().with_max_seq_gap(1));

    let events = session.submit(stone("p1", 2, 7, 7)).unwrap();
    assert_eq!(events[0].reason_code(), Some(ReasonCode::SEQ_GAP));

    assert!(session.submit(stone("p1", 1, 7, 7)).unwrap()[0].is_accepted());
}

#[test]
fn test_winning_move_announces_status_change() {
    let registry = EngineRegistry::standard();
    let mut session = gomoku_session(&registry, SessionConfig::default());
    let mut seq = 0;
    for x in 0..4 {
        seq += 1;
        session.submit(stone("p1", seq, x, 0)).unwrap();
        seq += 1;
        session.submit(stone("p2", seq, x, 1)).unwrap();
    }

    let events = session.submit(stone("p1", seq + 1, 4, 0)).unwrap();

    assert_eq!(events.len(), 2);
    match &events[1] {
        SessionEvent::MatchStatusChanged {
            status,
            winner_ids,
            reason,
            ..
        } => {
            assert_eq!(*status, MatchStatus::Finished);
            assert_eq!(winner_ids, &vec![PlayerId::new("p1")]);
            assert_eq!(reason.as_deref(), Some("five_in_row"));
        }
        other => panic!("expected status change, got {:?}", other),
    }
}

#[test]
fn test_resync_after_disconnect() {
    let registry = EngineRegistry::standard();
    let mut session = gomoku_session(&registry, SessionConfig::default());
    for (seq, (actor, x)) in [("p1", 0), ("p2", 1), ("p1", 2), ("p2", 3)].into_iter().enumerate() {
        session.submit(stone(actor, seq as u64 + 1, x, 0)).unwrap();
    }

    // The client last saw version 2.
    let synced = session.resync(2).unwrap();

    let wire = serde_json::to_value(&synced).unwrap();
    assert_eq!(wire["kind"], "state_synced");
    assert_eq!(wire["lastAppliedSeq"], 4);
    assert_eq!(wire["state"]["version"], 4);
    let missed: Vec<u64> = wire["missed"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["seq"].as_u64().unwrap())
        .collect();
    assert_eq!(missed, vec![3, 4]);

    assert!(matches!(session.resync(9), Err(SessionError::FutureVersion { .. })));
}

#[test]
fn test_restore_from_persisted_log() {
    let registry = EngineRegistry::standard();
    let mut session = MatchSession::start(
        &registry,
        GameId::Azul,
        "a1",
        Seats::from_ids(["p1", "p2", "p3"]),
        &MatchOptions::default().with_seed(77),
        SessionConfig::default(),
    )
    .unwrap();
    let opening = session.state().payload.to_value();
    let color = opening["factories"][0][0].as_str().unwrap().to_string();
    let action = GameAction::new(GameId::Azul, "a1", "p1", azul::TAKE_FROM_FACTORY, 1)
        .with_payload(json!({"factoryIndex": 0, "color": color, "targetLine": 4}));
    assert!(session.submit(action).unwrap()[0].is_accepted());

    let bytes = session.log().encode().unwrap();
    let restored = ActionLog::decode(&bytes).unwrap();

    assert_eq!(restored.actions(), session.log().actions());
    let rebuilt = replay(session.initial_state(), restored.actions(), session.engine()).unwrap();
    assert_eq!(state_hash(&rebuilt.final_state).unwrap(), state_hash(session.state()).unwrap());
}

#[test]
fn test_abort_then_verify() {
    let registry = EngineRegistry::standard();
    let mut session = gomoku_session(&registry, SessionConfig::default().without_frames());
    session.submit(stone("p1", 1, 7, 7)).unwrap();

    let event = session.abort("players left").unwrap();

    assert!(matches!(
        event,
        SessionEvent::MatchStatusChanged {
            status: MatchStatus::Aborted,
            ..
        }
    ));
    assert_eq!(session.state().version, 1);
    assert!(session.frames().is_empty());
    assert_eq!(session.verify().unwrap(), None);
    assert_eq!(
        session.abort("again").unwrap_err().code(),
        Some(ReasonCode::MATCH_ABORTED)
    );
}
