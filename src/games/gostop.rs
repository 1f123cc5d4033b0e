//! Go-Stop with the 48-card hwatu deck: matgo for two players, go-stop for
//! three.
//!
//! A turn has up to three stages:
//!
//! ```text
//! play ──(two floor matches)──▶ choose_capture ──▶ draw ──▶ score_decision?
//!   └──────────────────────────────────────────────┘
//! ```
//!
//! Playing or drawing a card captures the floor cards of the same month
//! (one match takes it, three take all four). With two matches the player
//! chooses for a played card; a drawn card takes the first in floor order.
//! Reaching the threshold with a higher score than at the last go forces a
//! go/stop decision. Stop wins; hands running out without a stop is nagari.
//!
//! Card ids are `{month:02}{a-d}`, e.g. `01a` is the January bright.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{GameAction, GameId, GameRng, GameState, MatchOptions, PlayerId, Seats};
use crate::rules::guards::{self, reject};
use crate::rules::{
    Finish, GameResult, ReasonCode, Reduction, Rejection, RuleEngine, RuleFault, Setup, SetupError, Validation,
};

pub const PLAY_HAND_CARD: &str = "PLAY_HAND_CARD";
pub const CHOOSE_CAPTURE_TARGET: &str = "CHOOSE_CAPTURE_TARGET";
pub const DRAW_FROM_PILE: &str = "DRAW_FROM_PILE";
pub const DECLARE_GO: &str = "DECLARE_GO";
pub const DECLARE_STOP: &str = "DECLARE_STOP";
pub const ADMIN_SET_MODE: &str = "ADMIN_SET_MODE";
pub const RESIGN: &str = "RESIGN";

pub const UNKNOWN_CARD_ID: ReasonCode = ReasonCode::new("UNKNOWN_CARD_ID");
pub const CARD_NOT_IN_HAND: ReasonCode = ReasonCode::new("CARD_NOT_IN_HAND");
pub const NO_CAPTURE_PENDING: ReasonCode = ReasonCode::new("NO_CAPTURE_PENDING");
pub const INVALID_CAPTURE_TARGET: ReasonCode = ReasonCode::new("INVALID_CAPTURE_TARGET");
pub const PILE_EMPTY: ReasonCode = ReasonCode::new("PILE_EMPTY");
pub const NOT_IN_SCORE_DECISION: ReasonCode = ReasonCode::new("NOT_IN_SCORE_DECISION");
pub const IMMUTABLE_MATCH_MODE: ReasonCode = ReasonCode::new("IMMUTABLE_MATCH_MODE");

const PLAY: &str = "play";
const CHOOSE: &str = "choose_capture";
const DRAW: &str = "draw";
const DECIDE: &str = "score_decision";

const MATGO: &str = "matgo_2p";
const GOSTOP: &str = "gostop_3p";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RibbonSet {
    /// Hongdan, January to March.
    Red,
    /// Cheongdan, June, September, October.
    Blue,
    /// Chodan, April, May, July.
    Grass,
    Plain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Bright,
    Animal,
    Ribbon(RibbonSet),
    Junk,
    DoubleJunk,
}

use Kind::{Animal, Bright, DoubleJunk, Junk, Ribbon};
use RibbonSet::{Blue, Grass, Plain, Red};

const DECK: [[Kind; 4]; 12] = [
    [Bright, Ribbon(Red), Junk, Junk],
    [Animal, Ribbon(Red), Junk, Junk],
    [Bright, Ribbon(Red), Junk, Junk],
    [Animal, Ribbon(Grass), Junk, Junk],
    [Animal, Ribbon(Grass), Junk, Junk],
    [Animal, Ribbon(Blue), Junk, Junk],
    [Animal, Ribbon(Grass), Junk, Junk],
    [Bright, Animal, Junk, Junk],
    [Animal, Ribbon(Blue), Junk, Junk],
    [Animal, Ribbon(Blue), Junk, Junk],
    [Bright, DoubleJunk, Junk, Junk],
    [Bright, Animal, Ribbon(Plain), DoubleJunk],
];

const RAIN_BRIGHT: &str = "12a";
const GODORI: [&str; 3] = ["02a", "04a", "08b"];

/// A hwatu card.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hwatu {
    pub month: u8,
    pub kind: Kind,
}

/// Look up a card by id.
pub fn hwatu(id: &str) -> Option<Hwatu> {
    if id.len() != 3 || !id.is_ascii() {
        return None;
    }
    let month: u8 = id[..2].parse().ok().filter(|m| (1..=12).contains(m))?;
    let slot = match &id[2..] {
        "a" => 0,
        "b" => 1,
        "c" => 2,
        "d" => 3,
        _ => return None,
    };
    Some(Hwatu {
        month,
        kind: DECK[usize::from(month) - 1][slot],
    })
}

fn full_deck() -> Vec<String> {
    (1..=12)
        .flat_map(|month| ['a', 'b', 'c', 'd'].map(|slot| format!("{:02}{}", month, slot)))
        .collect()
}

/// Points for a pile of captured cards, before go bonuses.
pub fn score(captured: &[String]) -> u32 {
    let cards: Vec<(&str, Hwatu)> = captured.iter().filter_map(|id| hwatu(id).map(|c| (id.as_str(), c))).collect();
    let count = |pred: &dyn Fn(Kind) -> bool| cards.iter().filter(|(_, c)| pred(c.kind)).count() as u32;
    let has = |id: &str| cards.iter().any(|(c, _)| *c == id);

    let brights = count(&|k| k == Bright);
    let rain = has(RAIN_BRIGHT);
    let mut points = match brights {
        5 => 15,
        4 => 4,
        3 if rain => 2,
        3 => 3,
        _ => 0,
    };

    let animals = count(&|k| k == Animal);
    points += animals.saturating_sub(4);
    if GODORI.iter().all(|&id| has(id)) {
        points += 5;
    }

    let ribbons = count(&|k| matches!(k, Ribbon(_)));
    points += ribbons.saturating_sub(4);
    for set in [Red, Blue, Grass] {
        if count(&|k| k == Ribbon(set)) == 3 {
            points += 3;
        }
    }

    let junk = count(&|k| k == Junk) + 2 * count(&|k| k == DoubleJunk);
    points += junk.saturating_sub(9);
    points
}

/// A played card waiting for its capture target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pending {
    pub card: String,
    pub options: Vec<String>,
}

/// Go-Stop payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub mode: String,
    pub hands: BTreeMap<PlayerId, Vec<String>>,
    pub captured: BTreeMap<PlayerId, Vec<String>>,
    pub floor: Vec<String>,
    /// Draw pile, top first.
    pub pile: Vec<String>,
    #[serde(default)]
    pub pending: Option<Pending>,
    #[serde(default)]
    pub gos: BTreeMap<PlayerId, u32>,
    /// Score at each player's last go.
    #[serde(default)]
    pub go_scores: BTreeMap<PlayerId, u32>,
    #[serde(default)]
    pub stopped: Option<PlayerId>,
    #[serde(default)]
    pub resigned: Option<PlayerId>,
    #[serde(default)]
    pub exhausted: bool,
}

impl Table {
    fn threshold(&self) -> u32 {
        if self.mode == GOSTOP {
            3
        } else {
            7
        }
    }

    pub fn score_of(&self, player: &PlayerId) -> u32 {
        self.captured.get(player).map_or(0, |c| score(c))
    }

    fn same_month(&self, month: u8) -> Vec<String> {
        self.floor
            .iter()
            .filter(|id| hwatu(id).is_some_and(|c| c.month == month))
            .cloned()
            .collect()
    }

    fn take_from_floor(&mut self, cards: &[String]) {
        self.floor.retain(|id| !cards.contains(id));
    }

    fn capture(&mut self, player: &PlayerId, cards: impl IntoIterator<Item = String>) {
        self.captured.entry(player.clone()).or_default().extend(cards);
    }

    /// Land `card` on the floor for `player`. Returns the floor options
    /// when the player must choose.
    fn land(&mut self, player: &PlayerId, card: String, choose: bool) -> Result<Option<Vec<String>>, Rejection> {
        let month = hwatu(&card)
            .ok_or_else(|| Rejection::new(UNKNOWN_CARD_ID, format!("{} is not a hwatu card", card)))?
            .month;
        let matches = self.same_month(month);
        match matches.len() {
            0 => self.floor.push(card),
            2 if choose => return Ok(Some(matches)),
            2 => {
                let first = matches[0].clone();
                self.take_from_floor(std::slice::from_ref(&first));
                self.capture(player, [card, first]);
            }
            _ => {
                self.take_from_floor(&matches);
                self.capture(player, std::iter::once(card).chain(matches));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardArgs {
    card_id: String,
}

struct Resolved {
    table: Table,
    phase: &'static str,
    pass_turn: bool,
    events: Vec<&'static str>,
}

/// Go-Stop rule engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct GoStop;

impl GoStop {
    fn resolve(&self, state: &GameState, action: &GameAction) -> Result<Resolved, Rejection> {
        let mut table: Table = guards::board(state)?;
        let actor = &action.actor_id;
        let stage = |phase: &str| -> Result<(), Rejection> {
            if state.phase == phase {
                Ok(())
            } else {
                reject(
                    ReasonCode::STAGE_VIOLATION,
                    format!("{} needs stage {}, not {}", action.action_type, phase, state.phase),
                )
            }
        };
        let stay = |table: Table, phase: &'static str, events: Vec<&'static str>| Resolved {
            table,
            phase,
            pass_turn: false,
            events,
        };

        match action.action_type.as_str() {
            ADMIN_SET_MODE => reject(IMMUTABLE_MATCH_MODE, format!("mode is fixed to {}", table.mode)),
            RESIGN => {
                table.resigned = Some(actor.clone());
                let phase = phase_name(&state.phase);
                Ok(stay(table, phase, vec!["resigned"]))
            }
            PLAY_HAND_CARD => {
                stage(PLAY)?;
                let args: CardArgs = guards::args(action)?;
                if hwatu(&args.card_id).is_none() {
                    return reject(UNKNOWN_CARD_ID, format!("{} is not a hwatu card", args.card_id));
                }
                let hand = table.hands.entry(actor.clone()).or_default();
                let slot = hand
                    .iter()
                    .position(|id| id == &args.card_id)
                    .ok_or_else(|| Rejection::new(CARD_NOT_IN_HAND, format!("{} is not in your hand", args.card_id)))?;
                let card = hand.remove(slot);
                match table.land(actor, card.clone(), true)? {
                    Some(options) => {
                        table.pending = Some(Pending { card, options });
                        Ok(stay(table, CHOOSE, vec!["card_played", "capture_choice"]))
                    }
                    None => Ok(stay(table, DRAW, vec!["card_played"])),
                }
            }
            CHOOSE_CAPTURE_TARGET => {
                let pending = table
                    .pending
                    .take()
                    .filter(|_| state.phase == CHOOSE)
                    .ok_or_else(|| Rejection::new(NO_CAPTURE_PENDING, "nothing to capture"))?;
                let args: CardArgs = guards::args(action)?;
                if !pending.options.contains(&args.card_id) {
                    return reject(INVALID_CAPTURE_TARGET, format!("{} cannot be captured", args.card_id));
                }
                table.take_from_floor(std::slice::from_ref(&args.card_id));
                table.capture(actor, [pending.card, args.card_id]);
                Ok(stay(table, DRAW, vec!["capture"]))
            }
            DRAW_FROM_PILE => {
                stage(DRAW)?;
                if table.pile.is_empty() {
                    return reject(PILE_EMPTY, "the draw pile is empty");
                }
                let card = table.pile.remove(0);
                table.land(actor, card, false)?;
                Ok(self.after_draw(table, actor))
            }
            DECLARE_GO | DECLARE_STOP => {
                if state.phase != DECIDE {
                    return reject(NOT_IN_SCORE_DECISION, "no go/stop decision pending");
                }
                if action.is(DECLARE_STOP) {
                    table.stopped = Some(actor.clone());
                    return Ok(stay(table, DECIDE, vec!["stop"]));
                }
                if table.hands.get(actor).map_or(true, Vec::is_empty) {
                    return reject(ReasonCode::STAGE_VIOLATION, "no cards left to go on");
                }
                let score = table.score_of(actor);
                *table.gos.entry(actor.clone()).or_insert(0) += 1;
                table.go_scores.insert(actor.clone(), score);
                Ok(Resolved {
                    table,
                    phase: PLAY,
                    pass_turn: true,
                    events: vec!["go"],
                })
            }
            other => reject(ReasonCode::UNKNOWN_ACTION, format!("go-stop has no {} action", other)),
        }
    }

    fn after_draw(&self, mut table: Table, actor: &PlayerId) -> Resolved {
        let score = table.score_of(actor);
        let last_go = table.go_scores.get(actor).copied().unwrap_or(0);
        if score >= table.threshold() && score > last_go {
            return Resolved {
                table,
                phase: DECIDE,
                pass_turn: false,
                events: vec!["card_drawn", "score_decision"],
            };
        }
        if table.hands.values().all(Vec::is_empty) {
            table.exhausted = true;
            return Resolved {
                table,
                phase: PLAY,
                pass_turn: false,
                events: vec!["card_drawn", "nagari"],
            };
        }
        Resolved {
            table,
            phase: PLAY,
            pass_turn: true,
            events: vec!["card_drawn"],
        }
    }
}

fn phase_name(phase: &str) -> &'static str {
    match phase {
        CHOOSE => CHOOSE,
        DRAW => DRAW,
        DECIDE => DECIDE,
        _ => PLAY,
    }
}

impl RuleEngine for GoStop {
    fn game_id(&self) -> GameId {
        GameId::Gostop
    }

    fn setup(&self, players: &Seats, options: &MatchOptions) -> Result<Setup, SetupError> {
        let (mode, hand_size, floor_size) = match players.len() {
            2 => (MATGO, 10, 8),
            3 => (GOSTOP, 7, 6),
            count => return Err(SetupError::PlayerCount { game: GameId::Gostop, count }),
        };
        if let Some(variant) = options.variant.as_deref().filter(|v| *v != mode) {
            return Err(SetupError::UnknownVariant {
                game: GameId::Gostop,
                variant: variant.to_string(),
            });
        }

        let mut deck = full_deck();
        GameRng::for_step(options.seed, 0, "deal").shuffle(&mut deck);
        let mut cards = deck.into_iter();
        let hands = players
            .ids()
            .map(|p| (p.clone(), cards.by_ref().take(hand_size).collect()))
            .collect();
        let floor = cards.by_ref().take(floor_size).collect();
        let table = Table {
            mode: mode.to_string(),
            hands,
            captured: players.ids().map(|p| (p.clone(), Vec::new())).collect(),
            floor,
            pile: cards.collect(),
            pending: None,
            gos: BTreeMap::new(),
            go_scores: BTreeMap::new(),
            stopped: None,
            resigned: None,
            exhausted: false,
        };
        let payload = guards::store_board(GameId::Gostop, &table).map_err(|e| SetupError::Encode {
            game: GameId::Gostop,
            reason: e.to_string(),
        })?;
        Ok(Setup {
            phase: PLAY.to_string(),
            payload,
            first_seat: 0,
        })
    }

    fn validate(&self, state: &GameState, action: &GameAction) -> Validation {
        guards::ensure_admissible(self, state, action)
            .and_then(|()| self.resolve(state, action).map(drop))
            .into()
    }

    fn reduce(&self, state: &GameState, action: &GameAction) -> Result<Reduction, RuleFault> {
        let resolved = self
            .resolve(state, action)
            .map_err(|rejection| RuleFault::from_rejection(action, rejection))?;

        let mut next = state.successor();
        next.phase = resolved.phase.to_string();
        next.payload = guards::store_board(GameId::Gostop, &resolved.table)?;
        if resolved.pass_turn {
            next.pass_turn();
        }
        let mut reduction = Reduction::new(next);
        for event in resolved.events {
            reduction.emit(event);
        }
        Ok(reduction)
    }

    fn evaluate_win(&self, state: &GameState) -> Result<Option<Finish>, RuleFault> {
        let table: Table = guards::load_board(GameId::Gostop, state)?;
        if let Some(stopper) = &table.stopped {
            return Ok(Some(Finish::winner(stopper.clone(), "stop")));
        }
        if let Some(resigned) = &table.resigned {
            let others: Vec<&PlayerId> = state.players.others(resigned).collect();
            let best = others.iter().map(|p| table.score_of(p)).max().unwrap_or(0);
            let winners = others.into_iter().filter(|p| table.score_of(p) == best).cloned().collect();
            return Ok(Some(Finish::new(GameResult::from_leaders(winners), "resign")));
        }
        if table.exhausted {
            return Ok(Some(Finish::draw("nagari")));
        }
        Ok(None)
    }

    fn is_turn_exempt(&self, action_type: &str) -> bool {
        matches!(action_type, RESIGN | ADMIN_SET_MODE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MatchStatus, Payload};
    use crate::pipeline::{apply, Applied, Transition};
    use serde_json::json;

    fn start(players: &[&str]) -> GameState {
        let seats = Seats::from_ids(players.iter().copied());
        let setup = GoStop.setup(&seats, &MatchOptions::default()).unwrap();
        GameState::new(GameId::Gostop, "h1", seats)
            .with_phase(setup.phase)
            .with_payload(setup.payload)
            .with_status(MatchStatus::Active)
    }

    fn table(state: &GameState) -> Table {
        state.payload.decode().unwrap()
    }

    fn with_table(state: &GameState, phase: &str, f: impl FnOnce(&mut Table)) -> GameState {
        let mut table = table(state);
        f(&mut table);
        state.clone().with_phase(phase).with_payload(Payload::encode(&table).unwrap())
    }

    fn act(actor: &str, kind: &str, payload: serde_json::Value) -> GameAction {
        GameAction::new(GameId::Gostop, "h1", actor, kind, 1).with_payload(payload)
    }

    fn play(state: &GameState, action: GameAction) -> Transition {
        match apply(&GoStop, state, &action).unwrap() {
            Applied::Accepted(t) => t,
            Applied::Rejected(errors) => panic!("rejected: {:?}", errors),
        }
    }

    fn code(state: &GameState, action: GameAction) -> ReasonCode {
        GoStop.validate(state, &action).errors()[0].code
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_deck_composition() {
        let deck: Vec<_> = full_deck().iter().filter_map(|id| hwatu(id)).collect();

        assert_eq!(deck.len(), 48);
        assert_eq!(deck.iter().filter(|c| c.kind == Bright).count(), 5);
        assert_eq!(deck.iter().filter(|c| c.kind == Animal).count(), 9);
        assert_eq!(deck.iter().filter(|c| matches!(c.kind, Ribbon(_))).count(), 10);
        assert!(hwatu("13a").is_none());
        assert!(hwatu("01e").is_none());
    }

    #[test]
    fn test_deal() {
        let two = table(&start(&["p1", "p2"]));
        assert_eq!(two.mode, "matgo_2p");
        assert_eq!(two.hands[&PlayerId::new("p1")].len(), 10);
        assert_eq!(two.floor.len(), 8);
        assert_eq!(two.pile.len(), 20);

        let three = table(&start(&["p1", "p2", "p3"]));
        assert_eq!(three.mode, "gostop_3p");
        assert_eq!(three.pile.len(), 21);
        assert_eq!(three.threshold(), 3);
    }

    #[test]
    fn test_scoring() {
        assert_eq!(score(&ids(&["01a", "03a", "08a"])), 3);
        assert_eq!(score(&ids(&["01a", "03a", "12a"])), 2);
        assert_eq!(score(&ids(&["02a", "04a", "08b"])), 5);
        assert_eq!(score(&ids(&["01b", "02b", "03b"])), 3);
        let junk = ids(&["01c", "01d", "02c", "02d", "03c", "03d", "04c", "04d", "11b"]);
        assert_eq!(score(&junk), 1);
    }

    #[test]
    fn test_play_then_draw() {
        let state = with_table(&start(&["p1", "p2"]), PLAY, |t| {
            t.hands.insert("p1".into(), ids(&["01a", "05c"]));
            t.floor = ids(&["01c", "07c"]);
            t.pile = ids(&["09c", "10c"]);
        });

        let played = play(&state, act("p1", PLAY_HAND_CARD, json!({"cardId": "01a"})));
        assert_eq!(played.next_state.phase, "draw");
        assert_eq!(table(&played.next_state).captured[&PlayerId::new("p1")], ids(&["01a", "01c"]));

        let drawn = play(&played.next_state, act("p1", DRAW_FROM_PILE, json!({})));
        let after = table(&drawn.next_state);
        assert_eq!(after.floor, ids(&["07c", "09c"]));
        assert_eq!(drawn.next_state.phase, "play");
        assert_eq!(drawn.next_state.current_player_id, PlayerId::new("p2"));
    }

    #[test]
    fn test_two_matches_need_a_choice() {
        let state = with_table(&start(&["p1", "p2"]), PLAY, |t| {
            t.hands.insert("p1".into(), ids(&["02a"]));
            t.floor = ids(&["02c", "02b"]);
        });

        let played = play(&state, act("p1", PLAY_HAND_CARD, json!({"cardId": "02a"})));
        assert_eq!(played.next_state.phase, "choose_capture");
        assert_eq!(
            code(&played.next_state, act("p1", CHOOSE_CAPTURE_TARGET, json!({"cardId": "05a"}))),
            INVALID_CAPTURE_TARGET
        );
        assert_eq!(
            code(&played.next_state, act("p1", DRAW_FROM_PILE, json!({}))),
            ReasonCode::STAGE_VIOLATION
        );

        let chosen = play(&played.next_state, act("p1", CHOOSE_CAPTURE_TARGET, json!({"cardId": "02b"})));
        let after = table(&chosen.next_state);
        assert_eq!(after.floor, ids(&["02c"]));
        assert_eq!(after.captured[&PlayerId::new("p1")], ids(&["02a", "02b"]));
        assert_eq!(chosen.next_state.phase, "draw");
    }

    #[test]
    fn test_card_errors() {
        let state = with_table(&start(&["p1", "p2"]), PLAY, |t| {
            t.hands.insert("p1".into(), ids(&["01a"]));
        });

        assert_eq!(code(&state, act("p1", PLAY_HAND_CARD, json!({"cardId": "zz9"}))), UNKNOWN_CARD_ID);
        assert_eq!(code(&state, act("p1", PLAY_HAND_CARD, json!({"cardId": "03a"}))), CARD_NOT_IN_HAND);
        assert_eq!(
            code(&state, act("p1", CHOOSE_CAPTURE_TARGET, json!({"cardId": "01c"}))),
            NO_CAPTURE_PENDING
        );
        assert_eq!(code(&state, act("p1", DECLARE_STOP, json!({}))), NOT_IN_SCORE_DECISION);
        assert_eq!(code(&state, act("p2", ADMIN_SET_MODE, json!({"mode": "gostop_3p"}))), IMMUTABLE_MATCH_MODE);
    }

    fn near_threshold() -> GameState {
        // p1 sits at 5 points; drawing 03b completes the red ribbons.
        with_table(&start(&["p1", "p2"]), DRAW, |t| {
            t.captured.insert("p1".into(), ids(&["01b", "02b", "04b", "05b", "06b", "07b"]));
            t.hands.insert("p1".into(), ids(&["11c"]));
            t.floor = ids(&["03c"]);
            t.pile = ids(&["03b", "12c"]);
        })
    }

    #[test]
    fn test_threshold_forces_decision_and_stop_wins() {
        let state = near_threshold();
        let drawn = play(&state, act("p1", DRAW_FROM_PILE, json!({})));
        let captured = &table(&drawn.next_state).captured[&PlayerId::new("p1")];
        // Seven ribbons (3) + red set (3) + grass set (3).
        assert_eq!(score(captured), 9);
        assert_eq!(drawn.next_state.phase, "score_decision");
        assert_eq!(drawn.next_state.current_player_id, PlayerId::new("p1"));

        let stopped = play(&drawn.next_state, act("p1", DECLARE_STOP, json!({})));
        assert_eq!(stopped.next_state.status, MatchStatus::Finished);
        assert_eq!(stopped.next_state.winner_ids, vec![PlayerId::new("p1")]);
    }

    #[test]
    fn test_go_passes_turn_and_raises_bar() {
        let drawn = play(&near_threshold(), act("p1", DRAW_FROM_PILE, json!({}))).next_state;
        let went = play(&drawn, act("p1", DECLARE_GO, json!({})));
        let after = table(&went.next_state);

        assert_eq!(after.gos[&PlayerId::new("p1")], 1);
        assert_eq!(after.go_scores[&PlayerId::new("p1")], 9);
        assert_eq!(went.next_state.current_player_id, PlayerId::new("p2"));
        assert_eq!(went.next_state.status, MatchStatus::Active);
    }

    #[test]
    fn test_exhausted_hands_are_nagari() {
        let state = with_table(&start(&["p1", "p2"]), DRAW, |t| {
            for hand in t.hands.values_mut() {
                hand.clear();
            }
            t.captured = BTreeMap::new();
            t.floor = ids(&["05c"]);
            t.pile = ids(&["06c"]);
        });
        let drawn = play(&state, act("p1", DRAW_FROM_PILE, json!({})));

        assert_eq!(drawn.next_state.status, MatchStatus::Finished);
        assert!(drawn.next_state.winner_ids.is_empty());
        assert!(drawn.events.iter().any(|e| e == "finish:nagari"));
    }

    #[test]
    fn test_resign_three_player() {
        let state = with_table(&start(&["p1", "p2", "p3"]), PLAY, |t| {
            t.captured.insert("p2".into(), ids(&["01a", "03a", "08a"]));
        });
        let resigned = play(&state, act("p3", RESIGN, json!({})));

        assert_eq!(resigned.next_state.winner_ids, vec![PlayerId::new("p2")]);
    }
}
