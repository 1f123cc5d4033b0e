//! Azul for 2-4 players.
//!
//! A round runs through three stages kept in the payload:
//!
//! - `draft`: the current player takes every tile of one color from a
//!   factory or the center. The first center taker also takes the
//!   first-player marker.
//! - `wall_tiling`: once no tiles remain, every seat applies its own tiling
//!   in any order (turn-exempt). Full pattern lines move to the wall and
//!   floor penalties are charged, clamped at zero.
//! - `round_end`: `END_ROUND` either refills the factories or, when some
//!   wall row is complete, applies the end-game bonuses.
//!
//! Pattern lines are addressed 0-4 (line `n` holds `n + 1` tiles); omitting
//! `targetLine` drops the tiles straight onto the floor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{GameAction, GameId, GameRng, GameState, MatchOptions, PlayerId, Seats};
use crate::rules::guards::{self, reject};
use crate::rules::{
    Finish, GameResult, ReasonCode, Reduction, Rejection, RuleEngine, RuleFault, Setup, SetupError, Validation,
};

pub const TAKE_FROM_FACTORY: &str = "TAKE_FROM_FACTORY";
pub const TAKE_FROM_CENTER: &str = "TAKE_FROM_CENTER";
pub const APPLY_WALL_TILING: &str = "APPLY_WALL_TILING";
pub const END_ROUND: &str = "END_ROUND";
pub const RESIGN: &str = "RESIGN";

pub const INVALID_FACTORY_INDEX: ReasonCode = ReasonCode::new("INVALID_FACTORY_INDEX");
pub const COLOR_NOT_IN_SOURCE: ReasonCode = ReasonCode::new("COLOR_NOT_IN_SOURCE");
pub const PATTERN_LINE_COLOR_CONFLICT: ReasonCode = ReasonCode::new("PATTERN_LINE_COLOR_CONFLICT");
pub const PATTERN_LINE_FULL: ReasonCode = ReasonCode::new("PATTERN_LINE_FULL");
pub const WALL_ROW_COLOR_EXISTS: ReasonCode = ReasonCode::new("WALL_ROW_COLOR_EXISTS");
pub const WALL_TILING_PENDING: ReasonCode = ReasonCode::new("WALL_TILING_PENDING");
pub const ALREADY_TILED: ReasonCode = ReasonCode::new("ALREADY_TILED");

const MAIN_TURN: &str = "main_turn";

pub const WALL_SIZE: usize = 5;
const FACTORY_CAPACITY: usize = 4;
const TILES_PER_COLOR: usize = 20;
const FLOOR_PENALTY: [u32; 7] = [1, 1, 2, 2, 2, 3, 3];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Blue,
    Yellow,
    Red,
    Black,
    White,
}

impl Color {
    pub const ALL: [Color; WALL_SIZE] = [Color::Blue, Color::Yellow, Color::Red, Color::Black, Color::White];

    /// Wall column of this color in `row`.
    ///
    /// Each row is the first row shifted right by the row index.
    pub fn column(self, row: usize) -> usize {
        (self as usize + row) % WALL_SIZE
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternLine {
    pub color: Option<Color>,
    pub count: usize,
}

/// One player's board.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mat {
    pub score: u32,
    pub lines: [PatternLine; WALL_SIZE],
    pub wall: [[bool; WALL_SIZE]; WALL_SIZE],
    #[serde(default)]
    pub floor: Vec<Color>,
    #[serde(default)]
    pub first_marker: bool,
}

impl Mat {
    fn has_on_wall(&self, row: usize, color: Color) -> bool {
        self.wall[row][color.column(row)]
    }

    fn floor_slots(&self) -> usize {
        self.floor.len() + usize::from(self.first_marker)
    }

    pub fn completed_rows(&self) -> usize {
        self.wall.iter().filter(|row| row.iter().all(|&t| t)).count()
    }

    /// Place `count` tiles of `color`; returns the overflow that drops to
    /// the floor.
    fn place(&mut self, target: Option<usize>, color: Color, count: usize) -> usize {
        let Some(row) = target else { return count };
        let line = &mut self.lines[row];
        let room = (row + 1).saturating_sub(line.count);
        let placed = room.min(count);
        line.color = Some(color);
        line.count += placed;
        count - placed
    }
}

/// Points for a tile just placed at `row`/`col`.
pub fn placement_points(wall: &[[bool; WALL_SIZE]; WALL_SIZE], row: usize, col: usize) -> u32 {
    let run = |cells: &mut dyn Iterator<Item = bool>| cells.take_while(|&t| t).count() as u32;
    let horizontal = 1
        + run(&mut (0..col).rev().map(|c| wall[row][c]))
        + run(&mut (col + 1..WALL_SIZE).map(|c| wall[row][c]));
    let vertical = 1
        + run(&mut (0..row).rev().map(|r| wall[r][col]))
        + run(&mut (row + 1..WALL_SIZE).map(|r| wall[r][col]));
    match (horizontal, vertical) {
        (1, 1) => 1,
        (h, 1) => h,
        (1, v) => v,
        (h, v) => h + v,
    }
}

/// End-game bonuses: 2 per row, 7 per column, 10 per complete color.
pub fn end_bonus(wall: &[[bool; WALL_SIZE]; WALL_SIZE]) -> u32 {
    let rows = wall.iter().filter(|row| row.iter().all(|&t| t)).count() as u32;
    let columns = (0..WALL_SIZE).filter(|&c| wall.iter().all(|row| row[c])).count() as u32;
    let colors = Color::ALL
        .iter()
        .filter(|color| (0..WALL_SIZE).all(|r| wall[r][color.column(r)]))
        .count() as u32;
    2 * rows + 7 * columns + 10 * colors
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Draft,
    WallTiling,
    RoundEnd,
}

/// Azul payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub seed: u64,
    pub round: u32,
    /// Draw order, front first.
    pub bag: Vec<Color>,
    /// Box lid: discarded tiles waiting to refill the bag.
    #[serde(default)]
    pub lid: Vec<Color>,
    pub factories: Vec<Vec<Color>>,
    #[serde(default)]
    pub center: Vec<Color>,
    #[serde(default)]
    pub marker_in_center: bool,
    pub mats: BTreeMap<PlayerId, Mat>,
    pub turn_stage: TurnStage,
    /// Seats done with this round's wall tiling.
    #[serde(default)]
    pub tiled: Vec<PlayerId>,
    #[serde(default)]
    pub next_starter: Option<PlayerId>,
    #[serde(default)]
    pub game_over: bool,
    #[serde(default)]
    pub resigned: Option<PlayerId>,
}

impl Board {
    fn mat(&mut self, player: &PlayerId) -> &mut Mat {
        self.mats.entry(player.clone()).or_default()
    }

    fn drained(&self) -> bool {
        self.center.is_empty() && self.factories.iter().all(Vec::is_empty)
    }

    /// Fill every factory from the bag, topping the bag up from the lid.
    fn refill(&mut self, version: u64) {
        for f in 0..self.factories.len() {
            let mut tiles = Vec::with_capacity(FACTORY_CAPACITY);
            while tiles.len() < FACTORY_CAPACITY {
                if self.bag.is_empty() {
                    if self.lid.is_empty() {
                        break;
                    }
                    self.bag = std::mem::take(&mut self.lid);
                    GameRng::for_step(self.seed, version, "lid").shuffle(&mut self.bag);
                }
                tiles.push(self.bag.remove(0));
            }
            self.factories[f] = tiles;
        }
    }

    /// Drop tiles onto a floor; beyond seven slots they go to the lid.
    fn to_floor(&mut self, player: &PlayerId, color: Color, count: usize) {
        for _ in 0..count {
            let mat = self.mat(player);
            if mat.floor_slots() < FLOOR_PENALTY.len() {
                mat.floor.push(color);
            } else {
                self.lid.push(color);
            }
        }
    }

    fn tile_wall(&mut self, player: &PlayerId) -> u32 {
        let mut gained = 0;
        let mut discarded = Vec::new();
        let mat = self.mat(player);
        for row in 0..WALL_SIZE {
            let line = &mut mat.lines[row];
            let Some(color) = line.color.filter(|_| line.count == row + 1) else { continue };
            *line = PatternLine::default();
            let col = color.column(row);
            mat.wall[row][col] = true;
            gained += placement_points(&mat.wall, row, col);
            discarded.extend(std::iter::repeat(color).take(row));
        }

        let penalty: u32 = FLOOR_PENALTY.iter().take(mat.floor_slots()).sum();
        mat.score = (mat.score + gained).saturating_sub(penalty);
        discarded.append(&mut mat.floor);
        mat.first_marker = false;
        self.lid.extend(discarded);
        gained
    }
}

/// Best score, then most completed rows; full ties share.
fn standings<'a>(board: &Board, players: impl Iterator<Item = &'a PlayerId>) -> Vec<PlayerId> {
    let ranked: Vec<(&PlayerId, u32, usize)> = players
        .map(|p| {
            let mat = board.mats.get(p);
            (
                p,
                mat.map_or(0, |m| m.score),
                mat.map_or(0, Mat::completed_rows),
            )
        })
        .collect();
    let best = ranked.iter().map(|&(_, s, r)| (s, r)).max().unwrap_or((0, 0));
    ranked
        .into_iter()
        .filter(|&(_, s, r)| (s, r) == best)
        .map(|(p, _, _)| p.clone())
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftArgs {
    #[serde(default)]
    factory_index: Option<usize>,
    color: Color,
    #[serde(default)]
    target_line: Option<usize>,
}

enum Turn {
    Stay,
    Pass,
    To(PlayerId),
}

struct Resolved {
    board: Board,
    turn: Turn,
    events: Vec<&'static str>,
}

/// Azul rule engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct Azul;

impl Azul {
    fn resolve(&self, state: &GameState, action: &GameAction) -> Result<Resolved, Rejection> {
        let mut board: Board = guards::board(state)?;
        let actor = &action.actor_id;
        let stage_violation = |stage: TurnStage| {
            reject(
                ReasonCode::STAGE_VIOLATION,
                format!("{} is not allowed during {:?}", action.action_type, stage),
            )
        };

        match action.action_type.as_str() {
            RESIGN => {
                board.resigned = Some(actor.clone());
                Ok(Resolved {
                    board,
                    turn: Turn::Stay,
                    events: vec!["resigned"],
                })
            }
            TAKE_FROM_FACTORY | TAKE_FROM_CENTER => {
                if board.turn_stage != TurnStage::Draft {
                    return stage_violation(board.turn_stage);
                }
                let args: DraftArgs = guards::args(action)?;
                let from_center = action.is(TAKE_FROM_CENTER);

                let source = if from_center {
                    board.center.clone()
                } else {
                    let index = args
                        .factory_index
                        .ok_or_else(|| Rejection::new(ReasonCode::INVALID_PAYLOAD, "factoryIndex is required"))?;
                    board.factories.get(index).cloned().ok_or_else(|| {
                        Rejection::new(INVALID_FACTORY_INDEX, format!("no factory {}", index)).on_field("factoryIndex")
                    })?
                };
                let taken = source.iter().filter(|&&c| c == args.color).count();
                if taken == 0 {
                    return reject(COLOR_NOT_IN_SOURCE, format!("no {:?} tiles there", args.color));
                }

                if let Some(row) = args.target_line {
                    let mat = board.mats.get(actor).cloned().unwrap_or_default();
                    let line = mat.lines.get(row).ok_or_else(|| {
                        Rejection::new(ReasonCode::INVALID_PAYLOAD, format!("no pattern line {}", row))
                            .on_field("targetLine")
                    })?;
                    if line.color.is_some_and(|c| c != args.color) {
                        return reject(PATTERN_LINE_COLOR_CONFLICT, format!("line {} holds another color", row));
                    }
                    if line.count > row {
                        return reject(PATTERN_LINE_FULL, format!("line {} is full", row));
                    }
                    if mat.has_on_wall(row, args.color) {
                        return reject(WALL_ROW_COLOR_EXISTS, format!("wall row {} already has {:?}", row, args.color));
                    }
                }

                let rest: Vec<Color> = source.into_iter().filter(|&c| c != args.color).collect();
                let mut events = vec!["tiles_taken"];
                if from_center {
                    board.center = rest;
                    if board.marker_in_center {
                        board.marker_in_center = false;
                        board.mat(actor).first_marker = true;
                        board.next_starter = Some(actor.clone());
                        events.push("first_player_marker");
                    }
                } else if let Some(index) = args.factory_index {
                    board.factories[index].clear();
                    board.center.extend(rest);
                }

                let overflow = board.mat(actor).place(args.target_line, args.color, taken);
                board.to_floor(actor, args.color, overflow);

                if board.drained() {
                    board.turn_stage = TurnStage::WallTiling;
                    events.push("wall_tiling");
                    return Ok(Resolved {
                        board,
                        turn: Turn::Stay,
                        events,
                    });
                }
                Ok(Resolved {
                    board,
                    turn: Turn::Pass,
                    events,
                })
            }
            APPLY_WALL_TILING => {
                if board.turn_stage != TurnStage::WallTiling {
                    return stage_violation(board.turn_stage);
                }
                if board.tiled.contains(actor) {
                    return reject(ALREADY_TILED, "wall tiling already applied this round");
                }
                board.tile_wall(actor);
                board.tiled.push(actor.clone());
                let mut events = vec!["wall_tiled"];
                if state.players.ids().all(|p| board.tiled.contains(p)) {
                    board.turn_stage = TurnStage::RoundEnd;
                    events.push("round_end");
                }
                Ok(Resolved {
                    board,
                    turn: Turn::Stay,
                    events,
                })
            }
            END_ROUND => {
                match board.turn_stage {
                    TurnStage::RoundEnd => {}
                    TurnStage::WallTiling => {
                        let pending: Vec<&str> = state
                            .players
                            .ids()
                            .filter(|p| !board.tiled.contains(p))
                            .map(PlayerId::as_str)
                            .collect();
                        return reject(WALL_TILING_PENDING, format!("waiting on {}", pending.join(", ")));
                    }
                    stage => return stage_violation(stage),
                }

                if board.mats.values().any(|m| m.completed_rows() > 0) {
                    for mat in board.mats.values_mut() {
                        mat.score += end_bonus(&mat.wall);
                    }
                    board.game_over = true;
                    return Ok(Resolved {
                        board,
                        turn: Turn::Stay,
                        events: vec!["final_scoring"],
                    });
                }

                board.refill(state.version);
                board.marker_in_center = true;
                board.tiled.clear();
                board.round += 1;
                board.turn_stage = TurnStage::Draft;
                let turn = match board.next_starter.take() {
                    Some(starter) => Turn::To(starter),
                    None => Turn::Stay,
                };
                Ok(Resolved {
                    board,
                    turn,
                    events: vec!["round_started"],
                })
            }
            other => reject(ReasonCode::UNKNOWN_ACTION, format!("azul has no {} action", other)),
        }
    }
}

impl RuleEngine for Azul {
    fn game_id(&self) -> GameId {
        GameId::Azul
    }

    fn setup(&self, players: &Seats, options: &MatchOptions) -> Result<Setup, SetupError> {
        if !(2..=4).contains(&players.len()) {
            return Err(SetupError::PlayerCount {
                game: GameId::Azul,
                count: players.len(),
            });
        }
        if let Some(variant) = options.variant.as_deref().filter(|v| *v != "base") {
            return Err(SetupError::UnknownVariant {
                game: GameId::Azul,
                variant: variant.to_string(),
            });
        }

        let mut bag: Vec<Color> = Color::ALL
            .iter()
            .flat_map(|&c| std::iter::repeat(c).take(TILES_PER_COLOR))
            .collect();
        GameRng::for_step(options.seed, 0, "bag").shuffle(&mut bag);

        let mut board = Board {
            seed: options.seed,
            round: 1,
            bag,
            lid: Vec::new(),
            factories: vec![Vec::new(); 2 * players.len() + 1],
            center: Vec::new(),
            marker_in_center: true,
            mats: players.ids().map(|p| (p.clone(), Mat::default())).collect(),
            turn_stage: TurnStage::Draft,
            tiled: Vec::new(),
            next_starter: None,
            game_over: false,
            resigned: None,
        };
        board.refill(0);

        let payload = guards::store_board(GameId::Azul, &board).map_err(|e| SetupError::Encode {
            game: GameId::Azul,
            reason: e.to_string(),
        })?;
        Ok(Setup {
            phase: MAIN_TURN.to_string(),
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
        next.payload = guards::store_board(GameId::Azul, &resolved.board)?;
        match resolved.turn {
            Turn::Stay => {}
            Turn::Pass => next.pass_turn(),
            Turn::To(player) => next.pass_turn_to(player),
        }
        let mut reduction = Reduction::new(next);
        for event in resolved.events {
            reduction.emit(event);
        }
        Ok(reduction)
    }

    fn evaluate_win(&self, state: &GameState) -> Result<Option<Finish>, RuleFault> {
        let board: Board = guards::load_board(GameId::Azul, state)?;
        if let Some(resigned) = &board.resigned {
            let winners = standings(&board, state.players.others(resigned));
            return Ok(Some(Finish::new(GameResult::from_leaders(winners), "resign")));
        }
        if board.game_over {
            let winners = standings(&board, state.players.ids());
            return Ok(Some(Finish::new(GameResult::from_leaders(winners), "wall_row_completed")));
        }
        Ok(None)
    }

    fn is_turn_exempt(&self, action_type: &str) -> bool {
        matches!(action_type, APPLY_WALL_TILING | END_ROUND | RESIGN)
    }
}
