//! Gomoku, freestyle rules on a 15×15 board.
//!
//! Black (first seat) and White alternate placing stones. Five or more in
//! an unbroken line wins, overlines included. A full board without a line
//! is a draw. Either player may resign at any time, and a draw offered by
//! the player to move ends the game if the opponent accepts.
//!
//! The board is stored as one string per row (`.`, `B`, `W`) so payloads
//! stay small and readable in fixtures:
//!
//! ```text
//! { "rows": ["...............", ...], "nextColor": "B", "lastMove": {"x":7,"y":7} }
//! ```

use serde::{Deserialize, Serialize};

use crate::core::{GameAction, GameId, GameState, MatchOptions, PlayerId, Seats};
use crate::rules::guards::{self, reject};
use crate::rules::{Finish, ReasonCode, Reduction, Rejection, RuleEngine, RuleFault, Setup, SetupError, Validation};

pub const PLACE_STONE: &str = "PLACE_STONE";
pub const RESIGN: &str = "RESIGN";
pub const REQUEST_DRAW: &str = "REQUEST_DRAW";
pub const RESPOND_DRAW: &str = "RESPOND_DRAW";

pub const OUT_OF_BOUNDS: ReasonCode = ReasonCode::new("OUT_OF_BOUNDS");
pub const CELL_OCCUPIED: ReasonCode = ReasonCode::new("CELL_OCCUPIED");
pub const COLOR_MISMATCH: ReasonCode = ReasonCode::new("COLOR_MISMATCH");
pub const NO_DRAW_OFFER: ReasonCode = ReasonCode::new("NO_DRAW_OFFER");
pub const DRAW_ALREADY_OFFERED: ReasonCode = ReasonCode::new("DRAW_ALREADY_OFFERED");

const PHASE: &str = "placing";
const LINE: usize = 5;
const DIRECTIONS: [(i64, i64); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stone {
    #[serde(rename = "B")]
    Black,
    #[serde(rename = "W")]
    White,
}

impl Stone {
    fn flip(self) -> Self {
        match self {
            Stone::Black => Stone::White,
            Stone::White => Stone::Black,
        }
    }

    fn seat(self) -> usize {
        match self {
            Stone::Black => 0,
            Stone::White => 1,
        }
    }

    fn glyph(self) -> char {
        match self {
            Stone::Black => 'B',
            Stone::White => 'W',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

/// Stored shape of the board.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoardDoc {
    rows: Vec<String>,
    next_color: Stone,
    #[serde(default)]
    last_move: Option<Point>,
    #[serde(default)]
    draw_offer: Option<PlayerId>,
    #[serde(default)]
    resigned: Option<PlayerId>,
    #[serde(default)]
    draw_agreed: bool,
}

/// Decoded board.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BoardDoc", into = "BoardDoc")]
pub struct Board {
    size: usize,
    cells: Vec<Option<Stone>>,
    pub next_color: Stone,
    pub last_move: Option<Point>,
    pub draw_offer: Option<PlayerId>,
    pub resigned: Option<PlayerId>,
    pub draw_agreed: bool,
}

impl TryFrom<BoardDoc> for Board {
    type Error = String;

    fn try_from(doc: BoardDoc) -> Result<Self, Self::Error> {
        let size = doc.rows.len();
        if size < LINE {
            return Err(format!("board must be at least {0}x{0}", LINE));
        }
        let mut cells = Vec::with_capacity(size * size);
        for (y, row) in doc.rows.iter().enumerate() {
            if row.chars().count() != size {
                return Err(format!("row {} is not {} cells wide", y, size));
            }
            for c in row.chars() {
                cells.push(match c {
                    '.' => None,
                    'B' => Some(Stone::Black),
                    'W' => Some(Stone::White),
                    other => return Err(format!("unknown cell {:?} in row {}", other, y)),
                });
            }
        }
        Ok(Self {
            size,
            cells,
            next_color: doc.next_color,
            last_move: doc.last_move,
            draw_offer: doc.draw_offer,
            resigned: doc.resigned,
            draw_agreed: doc.draw_agreed,
        })
    }
}

impl From<Board> for BoardDoc {
    fn from(board: Board) -> Self {
        let rows = board
            .cells
            .chunks(board.size)
            .map(|row| row.iter().map(|c| c.map_or('.', Stone::glyph)).collect())
            .collect();
        Self {
            rows,
            next_color: board.next_color,
            last_move: board.last_move,
            draw_offer: board.draw_offer,
            resigned: board.resigned,
            draw_agreed: board.draw_agreed,
        }
    }
}

impl Board {
    /// An empty board with Black to move.
    pub fn empty(size: usize) -> Self {
        Self {
            size,
            cells: vec![None; size * size],
            next_color: Stone::Black,
            last_move: None,
            draw_offer: None,
            resigned: None,
            draw_agreed: false,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn at(&self, x: usize, y: usize) -> Option<Stone> {
        self.cells.get(y * self.size + x).copied().flatten()
    }

    fn set(&mut self, x: usize, y: usize, stone: Stone) {
        let size = self.size;
        if let Some(cell) = self.cells.get_mut(y * size + x) {
            *cell = Some(stone);
        }
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    pub fn stones(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Longest line of `stone` through `(x, y)` along any direction.
    pub fn line_through(&self, x: usize, y: usize, stone: Stone) -> usize {
        DIRECTIONS
            .iter()
            .map(|&(dx, dy)| 1 + self.run(x, y, dx, dy, stone) + self.run(x, y, -dx, -dy, stone))
            .max()
            .unwrap_or(1)
    }

    fn run(&self, x: usize, y: usize, dx: i64, dy: i64, stone: Stone) -> usize {
        let size = self.size as i64;
        let (mut cx, mut cy) = (x as i64 + dx, y as i64 + dy);
        let mut count = 0;
        while (0..size).contains(&cx) && (0..size).contains(&cy) && self.at(cx as usize, cy as usize) == Some(stone) {
            count += 1;
            cx += dx;
            cy += dy;
        }
        count
    }
}

#[derive(Debug, Deserialize)]
struct PlaceArgs {
    x: i64,
    y: i64,
    #[serde(default)]
    color: Option<Stone>,
}

#[derive(Debug, Deserialize)]
struct RespondArgs {
    accept: bool,
}

/// Gomoku rule engine.
#[derive(Clone, Debug)]
pub struct Gomoku {
    size: usize,
}

impl Default for Gomoku {
    fn default() -> Self {
        Self { size: 15 }
    }
}

impl Gomoku {
    /// Engine for a square board of `size`.
    pub fn with_size(size: usize) -> Self {
        assert!(size >= LINE, "Board must fit a five-stone line");
        Self { size }
    }

    fn check(&self, state: &GameState, action: &GameAction) -> Result<(), Rejection> {
        guards::ensure_admissible(self, state, action)?;
        let board: Board = guards::board(state)?;

        match action.action_type.as_str() {
            PLACE_STONE => {
                if state.phase != PHASE {
                    return reject(ReasonCode::STAGE_VIOLATION, format!("cannot place during {}", state.phase));
                }
                let args: PlaceArgs = guards::args(action)?;
                let point = in_bounds(&board, args.x, args.y)
                    .ok_or_else(|| Rejection::new(OUT_OF_BOUNDS, format!("({}, {}) is off the board", args.x, args.y)))?;
                if board.at(point.x, point.y).is_some() {
                    return reject(CELL_OCCUPIED, format!("({}, {}) is taken", point.x, point.y));
                }
                if let Some(color) = args.color.filter(|&c| c != board.next_color) {
                    return reject(COLOR_MISMATCH, format!("{:?} to move, not {:?}", board.next_color, color));
                }
                Ok(())
            }
            RESIGN => Ok(()),
            REQUEST_DRAW => {
                if board.draw_offer.is_some() {
                    return reject(DRAW_ALREADY_OFFERED, "a draw offer is already pending");
                }
                Ok(())
            }
            RESPOND_DRAW => {
                let _: RespondArgs = guards::args(action)?;
                match &board.draw_offer {
                    Some(offerer) if offerer != &action.actor_id => Ok(()),
                    _ => reject(NO_DRAW_OFFER, "no draw offer from your opponent"),
                }
            }
            other => reject(ReasonCode::UNKNOWN_ACTION, format!("gomoku has no {} action", other)),
        }
    }
}

fn in_bounds(board: &Board, x: i64, y: i64) -> Option<Point> {
    let size = board.size() as i64;
    ((0..size).contains(&x) && (0..size).contains(&y)).then(|| Point {
        x: x as usize,
        y: y as usize,
    })
}

impl RuleEngine for Gomoku {
    fn game_id(&self) -> GameId {
        GameId::Gomoku
    }

    fn setup(&self, players: &Seats, options: &MatchOptions) -> Result<Setup, SetupError> {
        if players.len() != 2 {
            return Err(SetupError::PlayerCount {
                game: GameId::Gomoku,
                count: players.len(),
            });
        }
        match options.variant.as_deref() {
            None | Some("freestyle") => {}
            Some(other) => {
                return Err(SetupError::UnknownVariant {
                    game: GameId::Gomoku,
                    variant: other.to_string(),
                })
            }
        }
        let payload = guards::store_board(GameId::Gomoku, &Board::empty(self.size)).map_err(|e| SetupError::Encode {
            game: GameId::Gomoku,
            reason: e.to_string(),
        })?;
        Ok(Setup {
            phase: PHASE.to_string(),
            payload,
            first_seat: 0,
        })
    }

    fn validate(&self, state: &GameState, action: &GameAction) -> Validation {
        self.check(state, action).into()
    }

    fn reduce(&self, state: &GameState, action: &GameAction) -> Result<Reduction, RuleFault> {
        let mut board: Board = guards::load_board(GameId::Gomoku, state)?;
        let mut next = state.successor();
        let mut events = Vec::new();

        match action.action_type.as_str() {
            PLACE_STONE => {
                let args: PlaceArgs = guards::reduce_args(action)?;
                let point = in_bounds(&board, args.x, args.y).ok_or_else(|| {
                    RuleFault::from_rejection(action, Rejection::new(OUT_OF_BOUNDS, "off the board"))
                })?;
                board.set(point.x, point.y, board.next_color);
                board.last_move = Some(point);
                board.next_color = board.next_color.flip();
                board.draw_offer = None;
                next.pass_turn();
                events.push("stone_placed");
            }
            RESIGN => {
                board.resigned = Some(action.actor_id.clone());
                events.push("resigned");
            }
            REQUEST_DRAW => {
                board.draw_offer = Some(action.actor_id.clone());
                events.push("draw_offered");
            }
            RESPOND_DRAW => {
                let args: RespondArgs = guards::reduce_args(action)?;
                board.draw_offer = None;
                if args.accept {
                    board.draw_agreed = true;
                    events.push("draw_agreed");
                } else {
                    events.push("draw_declined");
                }
            }
            other => {
                return Err(RuleFault::UnsupportedAction {
                    game: GameId::Gomoku,
                    action_type: other.to_string(),
                })
            }
        }

        next.payload = guards::store_board(GameId::Gomoku, &board)?;
        let mut reduction = Reduction::new(next);
        for event in events {
            reduction.emit(event);
        }
        Ok(reduction)
    }

    fn evaluate_win(&self, state: &GameState) -> Result<Option<Finish>, RuleFault> {
        let board: Board = guards::load_board(GameId::Gomoku, state)?;

        if let Some(resigned) = &board.resigned {
            let winners: Vec<_> = state.players.others(resigned).cloned().collect();
            return Ok(Some(Finish::new(crate::rules::GameResult::from_leaders(winners), "resign")));
        }
        if board.draw_agreed {
            return Ok(Some(Finish::draw("draw_agreed")));
        }
        if let Some(Point { x, y }) = board.last_move {
            if let Some(stone) = board.at(x, y) {
                if board.line_through(x, y, stone) >= LINE {
                    let winner = state.players.id_at(stone.seat()).cloned().ok_or_else(|| RuleFault::CorruptPayload {
                        game: GameId::Gomoku,
                        reason: format!("no seat for {:?}", stone),
                    })?;
                    return Ok(Some(Finish::winner(winner, "five_in_row")));
                }
            }
        }
        if board.is_full() {
            return Ok(Some(Finish::draw("board_full")));
        }
        Ok(None)
    }

    fn is_turn_exempt(&self, action_type: &str) -> bool {
        matches!(action_type, RESIGN | RESPOND_DRAW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MatchStatus;
    use crate::pipeline::{apply, Applied};
    use serde_json::json;

    fn start() -> GameState {
        let seats = Seats::from_ids(["p1", "p2"]);
        let setup = Gomoku::default().setup(&seats, &MatchOptions::default()).unwrap();
        GameState::new(GameId::Gomoku, "g1", seats)
            .with_phase(setup.phase)
            .with_payload(setup.payload)
            .with_status(MatchStatus::Active)
    }

    fn place(actor: &str, x: i64, y: i64) -> GameAction {
        GameAction::new(GameId::Gomoku, "g1", actor, PLACE_STONE, 1).with_payload(json!({"x": x, "y": y}))
    }

    fn play(state: &GameState, action: GameAction) -> GameState {
        match apply(&Gomoku::default(), state, &action).unwrap() {
            Applied::Accepted(t) => t.next_state,
            Applied::Rejected(errors) => panic!("rejected: {:?}", errors),
        }
    }

    fn code(state: &GameState, action: GameAction) -> ReasonCode {
        Gomoku::default().validate(state, &action).errors()[0].code
    }

    /// Black on row 7 columns 3..=6, White on row 8; Black to move.
    fn four_in_row() -> GameState {
        let mut state = start();
        for x in 3..=6 {
            state = play(&state, place("p1", x, 7));
            state = play(&state, place("p2", x, 8));
        }
        state
    }

    #[test]
    fn test_setup_is_empty_board() {
        let board: Board = start().payload.decode().unwrap();

        assert_eq!(board.size(), 15);
        assert_eq!(board.stones(), 0);
        assert_eq!(board.next_color, Stone::Black);
    }

    #[test]
    fn test_board_payload_shape() {
        let state = play(&start(), place("p1", 7, 7));
        let rows = state.payload.get("rows").unwrap().as_array().unwrap();

        assert_eq!(rows[7], json!(".......B......."));
        assert_eq!(state.payload.get("nextColor"), Some(&json!("W")));
        assert_eq!(state.current_player_id, PlayerId::new("p2"));
    }

    #[test]
    fn test_placement_errors() {
        let state = play(&start(), place("p1", 7, 7));

        assert_eq!(code(&state, place("p2", 7, 7)), CELL_OCCUPIED);
        assert_eq!(code(&state, place("p2", 15, 0)), OUT_OF_BOUNDS);
        assert_eq!(code(&state, place("p2", -1, 3)), OUT_OF_BOUNDS);
        assert_eq!(code(&state, place("p1", 1, 1)), ReasonCode::NOT_PLAYER_TURN);
        assert_eq!(
            code(&state, place("p2", 1, 1).with_payload(json!({"x": 1, "y": 1, "color": "B"}))),
            COLOR_MISMATCH
        );
        assert_eq!(
            code(&state, place("p2", 0, 0).with_payload(json!({"x": "a"}))),
            ReasonCode::INVALID_PAYLOAD
        );
    }

    #[test]
    fn test_five_in_row_wins() {
        let state = four_in_row();
        let applied = apply(&Gomoku::default(), &state, &place("p1", 7, 7)).unwrap();
        let transition = applied.transition().unwrap();

        assert_eq!(transition.next_state.status, MatchStatus::Finished);
        assert_eq!(transition.next_state.winner_ids, vec![PlayerId::new("p1")]);
        assert!(transition.events.iter().any(|e| e == "finish:five_in_row"));
    }

    #[test]
    fn test_gap_does_not_win() {
        let state = four_in_row();
        let next = play(&state, place("p1", 8, 7));

        assert_eq!(next.status, MatchStatus::Active);
        assert!(next.winner_ids.is_empty());
    }

    #[test]
    fn test_diagonal_line() {
        let mut board = Board::empty(15);
        for i in 0..5 {
            board.set(2 + i, 10 - i, Stone::White);
        }

        assert_eq!(board.line_through(4, 8, Stone::White), 5);
        assert_eq!(board.line_through(4, 8, Stone::Black), 1);
    }

    #[test]
    fn test_resign_is_turn_exempt() {
        let state = start();
        let resign = GameAction::new(GameId::Gomoku, "g1", "p2", RESIGN, 1);

        let transition = apply(&Gomoku::default(), &state, &resign).unwrap();
        let next = &transition.transition().unwrap().next_state;
        assert_eq!(next.status, MatchStatus::Finished);
        assert_eq!(next.winner_ids, vec![PlayerId::new("p1")]);
    }

    #[test]
    fn test_draw_offer_flow() {
        let state = start();
        let offer = GameAction::new(GameId::Gomoku, "g1", "p1", REQUEST_DRAW, 1);
        let offered = play(&state, offer.clone());

        assert_eq!(code(&offered, offer), DRAW_ALREADY_OFFERED);
        let own = GameAction::new(GameId::Gomoku, "g1", "p1", RESPOND_DRAW, 2).with_payload(json!({"accept": true}));
        assert_eq!(code(&offered, own), NO_DRAW_OFFER);

        let accept = GameAction::new(GameId::Gomoku, "g1", "p2", RESPOND_DRAW, 2).with_payload(json!({"accept": true}));
        let done = play(&offered, accept);
        assert_eq!(done.status, MatchStatus::Finished);
        assert!(done.winner_ids.is_empty());
    }

    #[test]
    fn test_declined_draw_continues() {
        let offered = play(&start(), GameAction::new(GameId::Gomoku, "g1", "p1", REQUEST_DRAW, 1));
        let decline =
            GameAction::new(GameId::Gomoku, "g1", "p2", RESPOND_DRAW, 2).with_payload(json!({"accept": false}));
        let next = play(&offered, decline);

        assert_eq!(next.status, MatchStatus::Active);
        assert_eq!(next.current_player_id, PlayerId::new("p1"));
        assert_eq!(next.payload.get("drawOffer"), Some(&json!(null)));
    }

    #[test]
    fn test_full_board_is_draw() {
        let mut state = start();
        // Pattern with no five-line anywhere except one empty corner.
        let rows: Vec<String> = (0..15)
            .map(|y| {
                (0..15)
                    .map(|x| if ((x / 2) + y) % 2 == 0 { 'B' } else { 'W' })
                    .collect::<String>()
            })
            .collect();
        let mut rows = rows;
        rows[14].replace_range(14..15, ".");
        state.payload.insert("rows", json!(rows));
        let board: Board = state.payload.decode().unwrap();
        assert_eq!(board.stones(), 224);

        let mover = if board.next_color == Stone::Black { "p1" } else { "p2" };
        let next = play(&state, place(mover, 14, 14));
        assert_eq!(next.status, MatchStatus::Finished);
        assert!(next.winner_ids.is_empty());
    }

    #[test]
    fn test_corrupt_board_is_invalid_state() {
        let mut state = start();
        state.payload.insert("rows", json!(["BW"]));

        assert_eq!(code(&state, place("p1", 0, 0)), ReasonCode::INVALID_STATE);
    }
}
