//! Catan base game for 3-4 players.
//!
//! The island is the standard 19-hex layout. Intersections, edges and hexes
//! are addressed as `i-{n}`, `e-{a}-{b}` (intersection indices, `a < b`) and
//! `h-{n}`. Longest road, harbors and progress cards are not modelled; the
//! development deck holds knights and victory points only.
//!
//! Turn structure:
//!
//! ```text
//! setup:     settlement -> road, snake order (1..n, n..1)
//! main_turn: roll ──(7)──> robber ──> build ──END_TURN──> next roll
//!              └────────────────────────┘
//! ```
//!
//! A knight may be played before or after the roll and detours through the
//! robber stage.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::core::{GameAction, GameId, GameRng, GameState, MatchOptions, PlayerId, Seats};
use crate::rules::guards::{self, reject};
use crate::rules::{
    Finish, GameResult, ReasonCode, Reduction, Rejection, RuleEngine, RuleFault, Setup, SetupError, Validation,
};

pub const PLACE_SETUP_SETTLEMENT: &str = "PLACE_SETUP_SETTLEMENT";
pub const PLACE_SETUP_ROAD: &str = "PLACE_SETUP_ROAD";
pub const ROLL_DICE: &str = "ROLL_DICE";
pub const MOVE_ROBBER: &str = "MOVE_ROBBER";
pub const BUILD_ROAD: &str = "BUILD_ROAD";
pub const BUILD_SETTLEMENT: &str = "BUILD_SETTLEMENT";
pub const UPGRADE_TO_CITY: &str = "UPGRADE_TO_CITY";
pub const BUY_DEVELOPMENT_CARD: &str = "BUY_DEVELOPMENT_CARD";
pub const PLAY_DEVELOPMENT_CARD: &str = "PLAY_DEVELOPMENT_CARD";
pub const TRADE_WITH_BANK: &str = "TRADE_WITH_BANK";
pub const END_TURN: &str = "END_TURN";
pub const RESIGN: &str = "RESIGN";

pub const ROAD_NOT_CONNECTED: ReasonCode = ReasonCode::new("ROAD_NOT_CONNECTED");
pub const SETTLEMENT_DISTANCE_RULE: ReasonCode = ReasonCode::new("SETTLEMENT_DISTANCE_RULE");
pub const NOT_OWNER: ReasonCode = ReasonCode::new("NOT_OWNER");
pub const ALREADY_ROLLED: ReasonCode = ReasonCode::new("ALREADY_ROLLED");
pub const ROLL_REQUIRED: ReasonCode = ReasonCode::new("ROLL_REQUIRED");
pub const DEV_CARD_COOLDOWN: ReasonCode = ReasonCode::new("DEV_CARD_COOLDOWN");
pub const DEV_DECK_EMPTY: ReasonCode = ReasonCode::new("DEV_DECK_EMPTY");
pub const INVALID_TRADE_RATIO: ReasonCode = ReasonCode::new("INVALID_TRADE_RATIO");
pub const ROBBER_SAME_HEX: ReasonCode = ReasonCode::new("ROBBER_SAME_HEX");
pub const INSUFFICIENT_RESOURCES: ReasonCode = ReasonCode::new("INSUFFICIENT_RESOURCES");
pub const UNKNOWN_LOCATION: ReasonCode = ReasonCode::new("UNKNOWN_LOCATION");
pub const LOCATION_OCCUPIED: ReasonCode = ReasonCode::new("LOCATION_OCCUPIED");
pub const PIECE_LIMIT_REACHED: ReasonCode = ReasonCode::new("PIECE_LIMIT_REACHED");
pub const ALREADY_CITY: ReasonCode = ReasonCode::new("ALREADY_CITY");
pub const DEV_CARD_NOT_OWNED: ReasonCode = ReasonCode::new("DEV_CARD_NOT_OWNED");
pub const DEV_CARD_ALREADY_PLAYED: ReasonCode = ReasonCode::new("DEV_CARD_ALREADY_PLAYED");
pub const INVALID_VICTIM: ReasonCode = ReasonCode::new("INVALID_VICTIM");
pub const BANK_SHORTAGE: ReasonCode = ReasonCode::new("BANK_SHORTAGE");

const SETUP: &str = "setup";
const MAIN_TURN: &str = "main_turn";

const WINNING_POINTS: u32 = 10;
const BANK_SUPPLY: u32 = 19;
const MAX_ROADS: usize = 15;
const MAX_SETTLEMENTS: usize = 5;
const MAX_CITIES: usize = 4;
const ARMY_MINIMUM: u32 = 3;
const NUMBER_TOKENS: [u8; 18] = [2, 3, 3, 4, 4, 5, 5, 6, 6, 8, 8, 9, 9, 10, 10, 11, 11, 12];

// -- Island topology --

pub type Axial = (i8, i8);

const DIRECTIONS: [Axial; 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];

/// Adjacency tables for the 19-hex island.
///
/// A corner is identified by the three (possibly off-island) hexes that
/// meet there, which makes shared corners collapse to one intersection.
#[derive(Debug)]
pub struct Topology {
    pub hexes: Vec<Axial>,
    /// Corners of each hex, walking the directions in order.
    pub hex_corners: Vec<[usize; 6]>,
    pub corner_hexes: Vec<Vec<usize>>,
    /// Edges as `(a, b)` with `a < b`.
    pub edges: Vec<(usize, usize)>,
    pub corner_edges: Vec<Vec<usize>>,
}

impl Topology {
    fn build() -> Self {
        let hexes: Vec<Axial> = (-2..=2i8)
            .flat_map(|r| (-2..=2i8).map(move |q| (q, r)))
            .filter(|&(q, r)| (q + r).abs() <= 2)
            .collect();

        let mut keys: Vec<[Axial; 3]> = Vec::new();
        let mut hex_corners = Vec::with_capacity(hexes.len());
        for &(q, r) in &hexes {
            let mut corners = [0; 6];
            for (i, corner) in corners.iter_mut().enumerate() {
                let (a, b) = (DIRECTIONS[i], DIRECTIONS[(i + 1) % 6]);
                let mut key = [(q, r), (q + a.0, r + a.1), (q + b.0, r + b.1)];
                key.sort_unstable();
                *corner = match keys.iter().position(|k| *k == key) {
                    Some(existing) => existing,
                    None => {
                        keys.push(key);
                        keys.len() - 1
                    }
                };
            }
            hex_corners.push(corners);
        }

        let mut corner_hexes = vec![Vec::new(); keys.len()];
        let mut edges = Vec::new();
        for (hex, corners) in hex_corners.iter().enumerate() {
            for i in 0..6 {
                corner_hexes[corners[i]].push(hex);
                let (a, b) = (corners[i], corners[(i + 1) % 6]);
                let edge = (a.min(b), a.max(b));
                if !edges.contains(&edge) {
                    edges.push(edge);
                }
            }
        }

        let mut corner_edges = vec![Vec::new(); keys.len()];
        for (e, &(a, b)) in edges.iter().enumerate() {
            corner_edges[a].push(e);
            corner_edges[b].push(e);
        }

        Self {
            hexes,
            hex_corners,
            corner_hexes,
            edges,
            corner_edges,
        }
    }

    pub fn corner_count(&self) -> usize {
        self.corner_hexes.len()
    }

    /// Intersections one edge away.
    pub fn neighbors(&self, corner: usize) -> impl Iterator<Item = usize> + '_ {
        self.corner_edges[corner].iter().map(move |&e| {
            let (a, b) = self.edges[e];
            if a == corner {
                b
            } else {
                a
            }
        })
    }

    fn edge_index(&self, a: usize, b: usize) -> Option<usize> {
        self.edges.iter().position(|&edge| edge == (a.min(b), a.max(b)))
    }
}

/// The shared island layout.
pub fn topology() -> &'static Topology {
    static TOPOLOGY: OnceLock<Topology> = OnceLock::new();
    TOPOLOGY.get_or_init(Topology::build)
}

pub fn intersection_id(corner: usize) -> String {
    format!("i-{}", corner)
}

pub fn edge_id(edge: usize) -> String {
    let (a, b) = topology().edges[edge];
    format!("e-{}-{}", a, b)
}

pub fn hex_id(hex: usize) -> String {
    format!("h-{}", hex)
}

fn unknown(what: &str, id: &str) -> Rejection {
    Rejection::new(UNKNOWN_LOCATION, format!("no {} {}", what, id))
}

fn parse_corner(id: &str) -> Result<usize, Rejection> {
    id.strip_prefix("i-")
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|&n| n < topology().corner_count())
        .ok_or_else(|| unknown("intersection", id))
}

fn parse_edge(id: &str) -> Result<usize, Rejection> {
    id.strip_prefix("e-")
        .and_then(|rest| rest.split_once('-'))
        .and_then(|(a, b)| Some((a.parse::<usize>().ok()?, b.parse::<usize>().ok()?)))
        .and_then(|(a, b)| topology().edge_index(a, b))
        .ok_or_else(|| unknown("edge", id))
}

fn parse_hex(id: &str) -> Result<usize, Rejection> {
    id.strip_prefix("h-")
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|&n| n < topology().hexes.len())
        .ok_or_else(|| unknown("hex", id))
}

// -- Resources --

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Brick,
    Lumber,
    Wool,
    Grain,
    Ore,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Brick,
        Resource::Lumber,
        Resource::Wool,
        Resource::Grain,
        Resource::Ore,
    ];
}

/// Resource counts. Zero entries are dropped so equal piles compare equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources(BTreeMap<Resource, u32>);

impl Resources {
    pub fn of(pairs: &[(Resource, u32)]) -> Self {
        let mut pile = Self::default();
        for &(resource, count) in pairs {
            pile.add(resource, count);
        }
        pile
    }

    pub fn get(&self, resource: Resource) -> u32 {
        self.0.get(&resource).copied().unwrap_or(0)
    }

    pub fn add(&mut self, resource: Resource, count: u32) {
        if count > 0 {
            *self.0.entry(resource).or_insert(0) += count;
        }
    }

    /// Remove up to `count`; returns how many were removed.
    pub fn remove(&mut self, resource: Resource, count: u32) -> u32 {
        let held = self.get(resource);
        let taken = held.min(count);
        if held == taken {
            self.0.remove(&resource);
        } else {
            self.0.insert(resource, held - taken);
        }
        taken
    }

    pub fn covers(&self, other: &Resources) -> bool {
        other.iter().all(|(resource, count)| self.get(resource) >= count)
    }

    pub fn add_all(&mut self, other: &Resources) {
        for (resource, count) in other.iter() {
            self.add(resource, count);
        }
    }

    pub fn remove_all(&mut self, other: &Resources) {
        for (resource, count) in other.iter() {
            self.remove(resource, count);
        }
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Resource, u32)> + '_ {
        self.0.iter().map(|(&r, &c)| (r, c))
    }
}

fn road_cost() -> Resources {
    Resources::of(&[(Resource::Brick, 1), (Resource::Lumber, 1)])
}

fn settlement_cost() -> Resources {
    Resources::of(&[
        (Resource::Brick, 1),
        (Resource::Lumber, 1),
        (Resource::Wool, 1),
        (Resource::Grain, 1),
    ])
}

fn city_cost() -> Resources {
    Resources::of(&[(Resource::Grain, 2), (Resource::Ore, 3)])
}

fn development_cost() -> Resources {
    Resources::of(&[(Resource::Wool, 1), (Resource::Grain, 1), (Resource::Ore, 1)])
}

// -- Board --

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DevCard {
    Knight,
    VictoryPoint,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    SetupSettlement,
    SetupRoad,
    Roll,
    Robber,
    Build,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    /// `None` is the desert.
    pub resource: Option<Resource>,
    pub number: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub owner: PlayerId,
    #[serde(default)]
    pub city: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holdings {
    #[serde(default)]
    pub resources: Resources,
    /// Playable development cards.
    #[serde(default)]
    pub dev_cards: Vec<DevCard>,
    /// Bought this turn; playable from the next turn.
    #[serde(default)]
    pub fresh_dev_cards: Vec<DevCard>,
    #[serde(default)]
    pub knights_played: u32,
}

/// Catan payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    /// Match seed; dice and robbery draw from it.
    pub seed: u64,
    pub tiles: Vec<Tile>,
    pub robber: usize,
    /// Keyed by intersection id.
    #[serde(default)]
    pub buildings: BTreeMap<String, Building>,
    /// Keyed by edge id.
    #[serde(default)]
    pub roads: BTreeMap<String, PlayerId>,
    pub hands: BTreeMap<PlayerId, Holdings>,
    pub bank: Resources,
    pub dev_deck: Vec<DevCard>,
    pub turn_stage: TurnStage,
    /// Placements made so far during setup.
    #[serde(default)]
    pub setup_step: usize,
    /// Settlement the next setup road must touch.
    #[serde(default)]
    pub setup_anchor: Option<usize>,
    #[serde(default)]
    pub rolled: bool,
    #[serde(default)]
    pub last_roll: Option<u8>,
    #[serde(default)]
    pub dev_played: bool,
    #[serde(default)]
    pub largest_army: Option<PlayerId>,
    #[serde(default)]
    pub resigned: Option<PlayerId>,
}

impl Board {
    fn building(&self, corner: usize) -> Option<&Building> {
        self.buildings.get(&intersection_id(corner))
    }

    fn road(&self, edge: usize) -> Option<&PlayerId> {
        self.roads.get(&edge_id(edge))
    }

    fn holdings(&mut self, player: &PlayerId) -> &mut Holdings {
        self.hands.entry(player.clone()).or_default()
    }

    fn pieces(&self, player: &PlayerId, city: bool) -> usize {
        self.buildings
            .values()
            .filter(|b| &b.owner == player && b.city == city)
            .count()
    }

    /// Public and hidden points.
    pub fn victory_points(&self, player: &PlayerId) -> u32 {
        let buildings: u32 = self
            .buildings
            .values()
            .filter(|b| &b.owner == player)
            .map(|b| if b.city { 2 } else { 1 })
            .sum();
        let cards = self.hands.get(player).map_or(0, |h| {
            h.dev_cards
                .iter()
                .chain(&h.fresh_dev_cards)
                .filter(|c| **c == DevCard::VictoryPoint)
                .count() as u32
        });
        let army = if self.largest_army.as_ref() == Some(player) { 2 } else { 0 };
        buildings + cards + army
    }

    fn ensure_distance(&self, corner: usize) -> Result<(), Rejection> {
        if self.building(corner).is_some() {
            return reject(LOCATION_OCCUPIED, format!("{} is built on", intersection_id(corner)));
        }
        if topology().neighbors(corner).any(|n| self.building(n).is_some()) {
            return reject(
                SETTLEMENT_DISTANCE_RULE,
                format!("{} is next to another building", intersection_id(corner)),
            );
        }
        Ok(())
    }

    /// A road on `edge` would touch the player's network.
    fn road_connects(&self, player: &PlayerId, edge: usize) -> bool {
        let topo = topology();
        let (a, b) = topo.edges[edge];
        [a, b].into_iter().any(|corner| match self.building(corner) {
            Some(b) => &b.owner == player,
            None => topo.corner_edges[corner]
                .iter()
                .any(|&e| e != edge && self.road(e) == Some(player)),
        })
    }

    fn pay(&mut self, player: &PlayerId, cost: &Resources) -> Result<(), Rejection> {
        let hand = self.holdings(player);
        if !hand.resources.covers(cost) {
            return reject(INSUFFICIENT_RESOURCES, "not enough resources");
        }
        hand.resources.remove_all(cost);
        self.bank.add_all(cost);
        Ok(())
    }

    /// Hand out production for `roll`.
    ///
    /// When the bank cannot cover a resource for everyone owed it, nobody
    /// receives that resource unless only one player is owed it, who then
    /// takes what is left.
    pub fn produce(&mut self, roll: u8) {
        let topo = topology();
        let mut owed: BTreeMap<Resource, BTreeMap<PlayerId, u32>> = BTreeMap::new();
        for (hex, tile) in self.tiles.iter().enumerate() {
            let Some(resource) = tile.resource else { continue };
            if tile.number != Some(roll) || hex == self.robber {
                continue;
            }
            let Some(corners) = topo.hex_corners.get(hex) else { continue };
            for &corner in corners {
                if let Some(building) = self.building(corner) {
                    let amount = if building.city { 2 } else { 1 };
                    *owed.entry(resource).or_default().entry(building.owner.clone()).or_insert(0) += amount;
                }
            }
        }

        for (resource, claims) in owed {
            let total: u32 = claims.values().sum();
            if total > self.bank.get(resource) && claims.len() > 1 {
                continue;
            }
            for (player, amount) in claims {
                let paid = self.bank.remove(resource, amount);
                self.holdings(&player).resources.add(resource, paid);
            }
        }
    }

    fn require_build(&self) -> Result<(), Rejection> {
        match self.turn_stage {
            TurnStage::Build => Ok(()),
            TurnStage::Roll => reject(ROLL_REQUIRED, "roll the dice first"),
            stage => reject(ReasonCode::STAGE_VIOLATION, format!("not allowed during {:?}", stage)),
        }
    }
}

// -- Action arguments --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntersectionArgs {
    intersection_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EdgeArgs {
    edge_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RobberArgs {
    target_hex_id: String,
    #[serde(default)]
    victim_id: Option<PlayerId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DevCardArgs {
    card_type: DevCard,
}

#[derive(Debug, Deserialize)]
struct TradeArgs {
    give: Resources,
    receive: Resources,
}

enum Turn {
    Stay,
    Pass,
    To(PlayerId),
}

struct Resolved {
    board: Board,
    phase: &'static str,
    turn: Turn,
    events: Vec<&'static str>,
}

impl Resolved {
    fn stay(board: Board, phase: &'static str, event: &'static str) -> Self {
        Self {
            board,
            phase,
            turn: Turn::Stay,
            events: vec![event],
        }
    }
}

/// Catan rule engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct Catan;

impl Catan {
    fn resolve(&self, state: &GameState, action: &GameAction) -> Result<Resolved, Rejection> {
        let mut board = island_board(state)?;
        let actor = &action.actor_id;
        let in_setup = state.phase == SETUP;
        let stage = board.turn_stage;
        let stage_violation = || {
            reject(
                ReasonCode::STAGE_VIOLATION,
                format!("{} is not allowed during {:?}", action.action_type, stage),
            )
        };

        match action.action_type.as_str() {
            RESIGN => {
                board.resigned = Some(actor.clone());
                let phase = if in_setup { SETUP } else { MAIN_TURN };
                Ok(Resolved::stay(board, phase, "resigned"))
            }
            PLACE_SETUP_SETTLEMENT => {
                if !in_setup || board.turn_stage != TurnStage::SetupSettlement {
                    return stage_violation();
                }
                let args: IntersectionArgs = guards::args(action)?;
                let corner = parse_corner(&args.intersection_id)?;
                board.ensure_distance(corner)?;
                board.buildings.insert(
                    intersection_id(corner),
                    Building {
                        owner: actor.clone(),
                        city: false,
                    },
                );
                // The second round's settlement collects its surroundings.
                if board.setup_step >= state.player_count() {
                    for &hex in &topology().corner_hexes[corner] {
                        if let Some(resource) = board.tiles.get(hex).and_then(|t| t.resource) {
                            let paid = board.bank.remove(resource, 1);
                            board.holdings(actor).resources.add(resource, paid);
                        }
                    }
                }
                board.setup_anchor = Some(corner);
                board.turn_stage = TurnStage::SetupRoad;
                Ok(Resolved::stay(board, SETUP, "settlement_built"))
            }
            PLACE_SETUP_ROAD => {
                if !in_setup || board.turn_stage != TurnStage::SetupRoad {
                    return stage_violation();
                }
                let args: EdgeArgs = guards::args(action)?;
                let edge = parse_edge(&args.edge_id)?;
                if board.road(edge).is_some() {
                    return reject(LOCATION_OCCUPIED, format!("{} already has a road", args.edge_id));
                }
                let (a, b) = topology().edges[edge];
                if !matches!(board.setup_anchor, Some(anchor) if anchor == a || anchor == b) {
                    return reject(ROAD_NOT_CONNECTED, "setup road must touch the new settlement");
                }
                board.roads.insert(edge_id(edge), actor.clone());
                board.setup_anchor = None;
                board.setup_step += 1;

                let seats = state.player_count();
                if board.setup_step == 2 * seats {
                    board.turn_stage = TurnStage::Roll;
                    let first = state.players.id_at(0).cloned().unwrap_or_else(|| actor.clone());
                    return Ok(Resolved {
                        board,
                        phase: MAIN_TURN,
                        turn: Turn::To(first),
                        events: vec!["road_built", "setup_complete"],
                    });
                }
                let step = board.setup_step;
                let seat = if step < seats { step } else { 2 * seats - 1 - step };
                let next = state.players.id_at(seat).cloned().unwrap_or_else(|| actor.clone());
                board.turn_stage = TurnStage::SetupSettlement;
                Ok(Resolved {
                    board,
                    phase: SETUP,
                    turn: Turn::To(next),
                    events: vec!["road_built"],
                })
            }
            _ if in_setup => stage_violation(),
            ROLL_DICE => {
                match board.turn_stage {
                    TurnStage::Roll => {}
                    TurnStage::Build => return reject(ALREADY_ROLLED, "dice already rolled this turn"),
                    _ => return stage_violation(),
                }
                let mut rng = GameRng::for_step(board.seed, state.version, "dice");
                let roll = rng.roll(6) + rng.roll(6);
                board.last_roll = Some(roll);
                board.rolled = true;
                if roll == 7 {
                    board.turn_stage = TurnStage::Robber;
                    return Ok(Resolved::stay(board, MAIN_TURN, "robber_activated"));
                }
                board.produce(roll);
                board.turn_stage = TurnStage::Build;
                Ok(Resolved::stay(board, MAIN_TURN, "dice_rolled"))
            }
            MOVE_ROBBER => {
                if board.turn_stage != TurnStage::Robber {
                    return stage_violation();
                }
                let args: RobberArgs = guards::args(action)?;
                let hex = parse_hex(&args.target_hex_id)?;
                if hex == board.robber {
                    return reject(ROBBER_SAME_HEX, "the robber must move to another hex");
                }
                board.robber = hex;
                if let Some(victim) = &args.victim_id {
                    let exposed = topology().hex_corners[hex]
                        .iter()
                        .any(|&c| board.building(c).is_some_and(|b| &b.owner == victim));
                    if victim == actor || !exposed {
                        return Err(Rejection::new(INVALID_VICTIM, format!("cannot rob {} here", victim)).on_field("victimId"));
                    }
                    let loot: Vec<Resource> = board
                        .hands
                        .get(victim)
                        .map(|h| {
                            h.resources
                                .iter()
                                .flat_map(|(r, n)| std::iter::repeat(r).take(n as usize))
                                .collect()
                        })
                        .unwrap_or_default();
                    if !loot.is_empty() {
                        let pick = GameRng::for_step(board.seed, state.version, "robber").gen_range_usize(0..loot.len());
                        board.holdings(victim).resources.remove(loot[pick], 1);
                        board.holdings(actor).resources.add(loot[pick], 1);
                    }
                }
                board.turn_stage = if board.rolled { TurnStage::Build } else { TurnStage::Roll };
                Ok(Resolved::stay(board, MAIN_TURN, "robber_moved"))
            }
            PLAY_DEVELOPMENT_CARD => {
                if !matches!(board.turn_stage, TurnStage::Roll | TurnStage::Build) {
                    return stage_violation();
                }
                let args: DevCardArgs = guards::args(action)?;
                if args.card_type != DevCard::Knight {
                    return Err(
                        Rejection::new(ReasonCode::INVALID_PAYLOAD, "victory point cards are never played").on_field("cardType"),
                    );
                }
                if board.dev_played {
                    return reject(DEV_CARD_ALREADY_PLAYED, "one development card per turn");
                }
                let hand = board.holdings(actor);
                let Some(slot) = hand.dev_cards.iter().position(|c| *c == DevCard::Knight) else {
                    return if hand.fresh_dev_cards.contains(&DevCard::Knight) {
                        reject(DEV_CARD_COOLDOWN, "a card bought this turn cannot be played yet")
                    } else {
                        reject(DEV_CARD_NOT_OWNED, "no knight to play")
                    };
                };
                hand.dev_cards.remove(slot);
                hand.knights_played += 1;
                let knights = hand.knights_played;

                let holder = board
                    .largest_army
                    .as_ref()
                    .and_then(|p| board.hands.get(p))
                    .map_or(0, |h| h.knights_played);
                if knights >= ARMY_MINIMUM && board.largest_army.as_ref() != Some(actor) && knights > holder {
                    board.largest_army = Some(actor.clone());
                }
                board.dev_played = true;
                board.turn_stage = TurnStage::Robber;
                Ok(Resolved::stay(board, MAIN_TURN, "knight_played"))
            }
            BUILD_ROAD => {
                board.require_build()?;
                let args: EdgeArgs = guards::args(action)?;
                let edge = parse_edge(&args.edge_id)?;
                if board.road(edge).is_some() {
                    return reject(LOCATION_OCCUPIED, format!("{} already has a road", args.edge_id));
                }
                if board.roads.values().filter(|p| *p == actor).count() >= MAX_ROADS {
                    return reject(PIECE_LIMIT_REACHED, "no roads left");
                }
                if !board.road_connects(actor, edge) {
                    return reject(ROAD_NOT_CONNECTED, format!("{} does not touch your network", args.edge_id));
                }
                board.pay(actor, &road_cost())?;
                board.roads.insert(edge_id(edge), actor.clone());
                Ok(Resolved::stay(board, MAIN_TURN, "road_built"))
            }
            BUILD_SETTLEMENT => {
                board.require_build()?;
                let args: IntersectionArgs = guards::args(action)?;
                let corner = parse_corner(&args.intersection_id)?;
                board.ensure_distance(corner)?;
                if board.pieces(actor, false) >= MAX_SETTLEMENTS {
                    return reject(PIECE_LIMIT_REACHED, "no settlements left");
                }
                let connected = topology().corner_edges[corner]
                    .iter()
                    .any(|&e| board.road(e) == Some(actor));
                if !connected {
                    return reject(ROAD_NOT_CONNECTED, "settlements need an adjacent road");
                }
                board.pay(actor, &settlement_cost())?;
                board.buildings.insert(
                    intersection_id(corner),
                    Building {
                        owner: actor.clone(),
                        city: false,
                    },
                );
                Ok(Resolved::stay(board, MAIN_TURN, "settlement_built"))
            }
            UPGRADE_TO_CITY => {
                board.require_build()?;
                let args: IntersectionArgs = guards::args(action)?;
                let corner = parse_corner(&args.intersection_id)?;
                match board.building(corner) {
                    Some(b) if &b.owner != actor => {
                        return reject(NOT_OWNER, format!("{} belongs to {}", args.intersection_id, b.owner))
                    }
                    Some(b) if b.city => return reject(ALREADY_CITY, format!("{} is already a city", args.intersection_id)),
                    Some(_) => {}
                    None => return reject(NOT_OWNER, format!("you have no settlement on {}", args.intersection_id)),
                }
                if board.pieces(actor, true) >= MAX_CITIES {
                    return reject(PIECE_LIMIT_REACHED, "no cities left");
                }
                board.pay(actor, &city_cost())?;
                if let Some(building) = board.buildings.get_mut(&intersection_id(corner)) {
                    building.city = true;
                }
                Ok(Resolved::stay(board, MAIN_TURN, "city_built"))
            }
            BUY_DEVELOPMENT_CARD => {
                board.require_build()?;
                if board.dev_deck.is_empty() {
                    return reject(DEV_DECK_EMPTY, "the development deck is empty");
                }
                board.pay(actor, &development_cost())?;
                let card = board.dev_deck.remove(0);
                board.holdings(actor).fresh_dev_cards.push(card);
                Ok(Resolved::stay(board, MAIN_TURN, "development_card_bought"))
            }
            TRADE_WITH_BANK => {
                board.require_build()?;
                let args: TradeArgs = guards::args(action)?;
                let (give, receive) = match (single(&args.give), single(&args.receive)) {
                    (Some(give), Some(receive)) => (give, receive),
                    _ => return reject(INVALID_TRADE_RATIO, "trade one resource kind for another"),
                };
                if give.0 == receive.0 || receive.1 == 0 || give.1 != 4 * receive.1 {
                    return reject(INVALID_TRADE_RATIO, "the bank trades 4:1");
                }
                if board.bank.get(receive.0) < receive.1 {
                    return reject(BANK_SHORTAGE, format!("the bank is out of {:?}", receive.0));
                }
                board.pay(actor, &args.give)?;
                board.bank.remove(receive.0, receive.1);
                board.holdings(actor).resources.add(receive.0, receive.1);
                Ok(Resolved::stay(board, MAIN_TURN, "bank_trade"))
            }
            END_TURN => {
                board.require_build()?;
                let hand = board.holdings(actor);
                let fresh = std::mem::take(&mut hand.fresh_dev_cards);
                hand.dev_cards.extend(fresh);
                board.rolled = false;
                board.dev_played = false;
                board.turn_stage = TurnStage::Roll;
                Ok(Resolved {
                    board,
                    phase: MAIN_TURN,
                    turn: Turn::Pass,
                    events: vec!["turn_ended"],
                })
            }
            other => reject(ReasonCode::UNKNOWN_ACTION, format!("catan has no {} action", other)),
        }
    }
}

/// Decode the board, refusing one that does not fit the island.
fn island_board(state: &GameState) -> Result<Board, Rejection> {
    let board: Board = guards::board(state)?;
    let hexes = topology().hexes.len();
    if board.tiles.len() != hexes || board.robber >= hexes {
        return reject(
            ReasonCode::INVALID_STATE,
            format!(
                "board has {} tiles with the robber on {}; the island has {} hexes",
                board.tiles.len(),
                board.robber,
                hexes
            ),
        );
    }
    Ok(board)
}

/// The only non-empty entry of a pile.
fn single(pile: &Resources) -> Option<(Resource, u32)> {
    let mut entries = pile.iter();
    let first = entries.next()?;
    entries.next().is_none().then_some(first)
}

fn deal_island(seed: u64) -> (Vec<Tile>, usize) {
    let mut terrain: Vec<Option<Resource>> = [
        (Resource::Lumber, 4),
        (Resource::Wool, 4),
        (Resource::Grain, 4),
        (Resource::Brick, 3),
        (Resource::Ore, 3),
    ]
    .into_iter()
    .flat_map(|(r, n)| std::iter::repeat(Some(r)).take(n))
    .chain(std::iter::once(None))
    .collect();
    GameRng::for_step(seed, 0, "terrain").shuffle(&mut terrain);

    let mut numbers = NUMBER_TOKENS.to_vec();
    GameRng::for_step(seed, 0, "numbers").shuffle(&mut numbers);
    let mut numbers = numbers.into_iter();

    let tiles: Vec<Tile> = terrain
        .into_iter()
        .map(|resource| Tile {
            resource,
            number: resource.and_then(|_| numbers.next()),
        })
        .collect();
    let desert = tiles.iter().position(|t| t.resource.is_none()).unwrap_or(0);
    (tiles, desert)
}

impl RuleEngine for Catan {
    fn game_id(&self) -> GameId {
        GameId::Catan
    }

    fn setup(&self, players: &Seats, options: &MatchOptions) -> Result<Setup, SetupError> {
        if !(3..=4).contains(&players.len()) {
            return Err(SetupError::PlayerCount {
                game: GameId::Catan,
                count: players.len(),
            });
        }
        if let Some(variant) = options.variant.as_deref().filter(|v| *v != "base") {
            return Err(SetupError::UnknownVariant {
                game: GameId::Catan,
                variant: variant.to_string(),
            });
        }

        let (tiles, robber) = deal_island(options.seed);
        let mut dev_deck: Vec<DevCard> = std::iter::repeat(DevCard::Knight)
            .take(14)
            .chain(std::iter::repeat(DevCard::VictoryPoint).take(5))
            .collect();
        GameRng::for_step(options.seed, 0, "development").shuffle(&mut dev_deck);

        let mut bank = Resources::default();
        for resource in Resource::ALL {
            bank.add(resource, BANK_SUPPLY);
        }

        let board = Board {
            seed: options.seed,
            tiles,
            robber,
            buildings: BTreeMap::new(),
            roads: BTreeMap::new(),
            hands: players.ids().map(|p| (p.clone(), Holdings::default())).collect(),
            bank,
            dev_deck,
            turn_stage: TurnStage::SetupSettlement,
            setup_step: 0,
            setup_anchor: None,
            rolled: false,
            last_roll: None,
            dev_played: false,
            largest_army: None,
            resigned: None,
        };
        let payload = guards::store_board(GameId::Catan, &board).map_err(|e| SetupError::Encode {
            game: GameId::Catan,
            reason: e.to_string(),
        })?;
        Ok(Setup {
            phase: SETUP.to_string(),
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
        next.payload = guards::store_board(GameId::Catan, &resolved.board)?;
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
        let board: Board = guards::load_board(GameId::Catan, state)?;
        if let Some(resigned) = &board.resigned {
            let others: Vec<&PlayerId> = state.players.others(resigned).collect();
            let best = others.iter().map(|p| board.victory_points(p)).max().unwrap_or(0);
            let winners = others
                .into_iter()
                .filter(|p| board.victory_points(p) == best)
                .cloned()
                .collect();
            return Ok(Some(Finish::new(GameResult::from_leaders(winners), "resign")));
        }
        let current = &state.current_player_id;
        if board.victory_points(current) >= WINNING_POINTS {
            return Ok(Some(Finish::winner(current.clone(), "victory_points")));
        }
        Ok(None)
    }

    fn is_turn_exempt(&self, action_type: &str) -> bool {
        action_type == RESIGN
    }
}
