//! Property tests for the pipeline guarantees.
//!
//! Random legal play (picked among moves the engine validates) interleaved
//! with junk submissions. Whatever happens, accepted actions move the
//! version by exactly one, refused actions change nothing, finished matches
//! absorb everything, and the log replays to the live state.

use boardgame_core::core::{GameAction, GameId, MatchOptions, MatchStatus, Seats, SessionConfig};
use boardgame_core::games::{gomoku, gostop, EngineRegistry};
use boardgame_core::pipeline::{apply, Applied};
use boardgame_core::replay::{replay, state_hash};
use boardgame_core::rules::ReasonCode;
use boardgame_core::session::MatchSession;
use proptest::prelude::*;
use serde_json::{json, Value};

fn open(registry: &EngineRegistry, game: GameId, seed: u64) -> MatchSession<'_> {
    MatchSession::start(
        registry,
        game,
        "prop",
        Seats::from_ids(["p1", "p2"]),
        &MatchOptions::default().with_seed(seed),
        SessionConfig::default(),
    )
    .unwrap()
}

/// Every move the engine accepts right now, over a coarse candidate set.
fn legal_moves(session: &MatchSession<'_>, seq: u64) -> Vec<GameAction> {
    let state = session.state();
    let payload = state.payload.to_value();
    let mut candidates: Vec<(&str, Value)> = Vec::new();
    match state.game_id {
        GameId::Gomoku => {
            for y in 5..10 {
                for x in 5..10 {
                    candidates.push((gomoku::PLACE_STONE, json!({"x": x, "y": y})));
                }
            }
            candidates.push((gomoku::REQUEST_DRAW, json!({})));
        }
        _ => {
            for kind in [gostop::DRAW_FROM_PILE, gostop::DECLARE_GO, gostop::DECLARE_STOP] {
                candidates.push((kind, json!({})));
            }
            let me = state.current_player_id.as_str();
            for card in payload["hands"][me].as_array().into_iter().flatten() {
                candidates.push((gostop::PLAY_HAND_CARD, json!({"cardId": card})));
            }
            for card in payload["pending"]["options"].as_array().into_iter().flatten() {
                candidates.push((gostop::CHOOSE_CAPTURE_TARGET, json!({"cardId": card})));
            }
        }
    }
    candidates
        .into_iter()
        .map(|(kind, args)| {
            GameAction::new(state.game_id, "prop", state.current_player_id.clone(), kind, seq).with_payload(args)
        })
        .filter(|action| session.engine().validate(state, action).is_ok())
        .collect()
}

fn junk(game: GameId, seq: u64, pick: u8) -> GameAction {
    let (actor, kind, payload) = match pick % 5 {
        0 => ("p1", "NOT_A_MOVE", json!({})),
        1 => ("p2", "PLAY_HAND_CARD", json!({"cardId": 42})),
        2 => ("p9", "RESPOND_DRAW", json!({"accept": true})),
        3 => ("p1", "PLACE_STONE", json!({"x": -1, "y": 99})),
        _ => ("p2", "DECLARE_STOP", json!({"extra": [1, 2, 3]})),
    };
    GameAction::new(game, "prop", actor, kind, seq).with_payload(payload)
}

/// Drive a match with `choices`; returns the session for inspection.
fn play<'r>(registry: &'r EngineRegistry, game: GameId, seed: u64, choices: &[(u8, bool)]) -> MatchSession<'r> {
    let mut session = open(registry, game, seed);
    for &(pick, noise) in choices {
        if session.state().is_terminal() {
            break;
        }
        let seq = session.last_seq().unwrap_or(0) + 1;
        if noise {
            let before = session.state().clone();
            let last = session.last_seq();
            let events = session.submit(junk(game, seq, pick)).unwrap();
            if !events[0].is_accepted() {
                assert_eq!(session.state(), &before);
                assert_eq!(session.last_seq(), last);
            }
            continue;
        }
        let moves = legal_moves(&session, seq);
        if moves.is_empty() {
            break;
        }
        let before = session.state().version;
        let action = moves[pick as usize % moves.len()].clone();
        let events = session.submit(action).unwrap();
        assert!(events[0].is_accepted());
        assert_eq!(session.state().version, before + 1);
        assert!(session.state().players.contains(&session.state().current_player_id));
    }
    session
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_version_counts_accepted_actions(
        seed in any::<u64>(),
        gostop_game in any::<bool>(),
        choices in proptest::collection::vec((any::<u8>(), any::<bool>()), 1..60),
    ) {
        let registry = EngineRegistry::standard();
        let game = if gostop_game { GameId::Gostop } else { GameId::Gomoku };
        let session = play(&registry, game, seed, &choices);

        prop_assert_eq!(session.state().version, session.log().len() as u64);
        prop_assert_eq!(session.frames().len(), session.log().len());
        for (i, frame) in session.frames().iter().enumerate() {
            prop_assert_eq!(frame.state_version, i as u64 + 1);
        }
    }

    #[test]
    fn prop_log_replays_to_live_state(
        seed in any::<u64>(),
        choices in proptest::collection::vec((any::<u8>(), any::<bool>()), 1..60),
    ) {
        let registry = EngineRegistry::standard();
        let session = play(&registry, GameId::Gostop, seed, &choices);

        let first = replay(session.initial_state(), session.log().actions(), session.engine()).unwrap();
        let second = replay(session.initial_state(), session.log().actions(), session.engine()).unwrap();

        prop_assert_eq!(&first.frames, &second.frames);
        prop_assert_eq!(first.frames.as_slice(), session.frames());
        prop_assert_eq!(state_hash(&first.final_state).unwrap(), state_hash(session.state()).unwrap());
        prop_assert_eq!(session.verify().unwrap(), None);
    }

    #[test]
    fn prop_setup_is_a_function_of_the_seed(seed in any::<u64>()) {
        let registry = EngineRegistry::standard();
        for game in [GameId::Gostop, GameId::Splendor, GameId::Azul] {
            let a = open(&registry, game, seed);
            let b = open(&registry, game, seed);
            prop_assert_eq!(state_hash(a.state()).unwrap(), state_hash(b.state()).unwrap());
        }
    }
}

#[test]
fn test_finished_match_absorbs_everything() {
    let registry = EngineRegistry::standard();
    let mut session = open(&registry, GameId::Gomoku, 1);
    session
        .submit(GameAction::new(GameId::Gomoku, "prop", "p1", gomoku::RESIGN, 1))
        .unwrap();
    assert_eq!(session.state().status, MatchStatus::Finished);
    let frozen = session.state().clone();

    for (seq, kind) in [(2, gomoku::PLACE_STONE), (3, gomoku::RESIGN), (4, gomoku::REQUEST_DRAW)] {
        let action = GameAction::new(GameId::Gomoku, "prop", "p2", kind, seq).with_payload(json!({"x": 0, "y": 0}));
        let events = session.submit(action.clone()).unwrap();

        assert_eq!(events[0].reason_code(), Some(ReasonCode::MATCH_FINISHED));
        assert_eq!(session.state(), &frozen);
        match apply(session.engine(), &frozen, &action).unwrap() {
            Applied::Rejected(errors) => assert_eq!(errors[0].code, ReasonCode::MATCH_FINISHED),
            Applied::Accepted(_) => panic!("finished match accepted {}", kind),
        }
    }
}

#[test]
fn test_aborted_match_absorbs_everything() {
    let registry = EngineRegistry::standard();
    let mut session = open(&registry, GameId::Gostop, 1);
    session.abort("host shutdown").unwrap();
    let frozen = session.state().clone();

    let action = GameAction::new(GameId::Gostop, "prop", "p1", gostop::DRAW_FROM_PILE, 1);
    let events = session.submit(action).unwrap();

    assert_eq!(events[0].reason_code(), Some(ReasonCode::MATCH_ABORTED));
    assert_eq!(session.state(), &frozen);
    assert_eq!(frozen.version, 0);
}
