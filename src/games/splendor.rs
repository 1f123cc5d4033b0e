//! Splendor, base game for 2-4 players.
//!
//! A turn is one of: take gems, reserve a card, or buy a card. Ending a
//! turn above 10 tokens moves the player into `return_tokens` until they
//! give the excess back. Buying a card may attract one noble. Reaching 15
//! prestige triggers the last round; the game ends when that round
//! completes. Highest prestige wins, then fewest purchased cards, then the
//! win is shared.
//!
//! Card data is a compact catalogue addressed by id (`t{tier}-c{n}`) rather
//! than the printed deck, so payloads only carry ids.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{GameAction, GameId, GameRng, GameState, MatchOptions, PlayerId, Seats};
use crate::rules::guards::{self, reject};
use crate::rules::{
    Finish, GameResult, ReasonCode, Reduction, Rejection, RuleEngine, RuleFault, Setup, SetupError, Validation,
};

pub const TAKE_TOKENS_DIFFERENT: &str = "TAKE_TOKENS_DIFFERENT";
pub const TAKE_TOKENS_SAME: &str = "TAKE_TOKENS_SAME";
pub const RESERVE_VISIBLE_CARD: &str = "RESERVE_VISIBLE_CARD";
pub const RESERVE_TOP_DECK_CARD: &str = "RESERVE_TOP_DECK_CARD";
pub const PURCHASE_VISIBLE_CARD: &str = "PURCHASE_VISIBLE_CARD";
pub const PURCHASE_RESERVED_CARD: &str = "PURCHASE_RESERVED_CARD";
pub const RETURN_TOKENS_AFTER_OVERFLOW: &str = "RETURN_TOKENS_AFTER_OVERFLOW";
pub const RESIGN: &str = "RESIGN";

pub const COLORS_NOT_DISTINCT: ReasonCode = ReasonCode::new("COLORS_NOT_DISTINCT");
pub const INVALID_COLOR: ReasonCode = ReasonCode::new("INVALID_COLOR");
pub const TOKEN_UNAVAILABLE: ReasonCode = ReasonCode::new("TOKEN_UNAVAILABLE");
pub const TOKEN_POOL_TOO_LOW: ReasonCode = ReasonCode::new("TOKEN_POOL_TOO_LOW");
pub const RESERVE_LIMIT_REACHED: ReasonCode = ReasonCode::new("RESERVE_LIMIT_REACHED");
pub const CARD_NOT_FOUND: ReasonCode = ReasonCode::new("CARD_NOT_FOUND");
pub const DECK_EMPTY: ReasonCode = ReasonCode::new("DECK_EMPTY");
pub const INSUFFICIENT_PAYMENT: ReasonCode = ReasonCode::new("INSUFFICIENT_PAYMENT");
pub const INVALID_PAYMENT: ReasonCode = ReasonCode::new("INVALID_PAYMENT");
pub const RESERVED_CARD_NOT_OWNED: ReasonCode = ReasonCode::new("RESERVED_CARD_NOT_OWNED");
pub const NOT_IN_OVERFLOW: ReasonCode = ReasonCode::new("NOT_IN_OVERFLOW");
pub const INVALID_RETURN: ReasonCode = ReasonCode::new("INVALID_RETURN");

const MAIN_TURN: &str = "main_turn";
const RETURN_TOKENS: &str = "return_tokens";

const TOKEN_LIMIT: u32 = 10;
const SAME_COLOR_MINIMUM: u32 = 4;
const RESERVE_LIMIT: usize = 3;
const MARKET_WIDTH: usize = 4;
const WINNING_PRESTIGE: u32 = 15;
const NOBLE_PRESTIGE: u32 = 3;
const GOLD_SUPPLY: u32 = 5;

/// Gem and gold token colors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Token {
    Diamond,
    Sapphire,
    Emerald,
    Ruby,
    Onyx,
    Gold,
}

impl Token {
    /// The five gem colors (everything but gold).
    pub const GEMS: [Token; 5] = [Token::Diamond, Token::Sapphire, Token::Emerald, Token::Ruby, Token::Onyx];

    fn parse(name: &str) -> Option<Self> {
        match name {
            "diamond" => Some(Token::Diamond),
            "sapphire" => Some(Token::Sapphire),
            "emerald" => Some(Token::Emerald),
            "ruby" => Some(Token::Ruby),
            "onyx" => Some(Token::Onyx),
            "gold" => Some(Token::Gold),
            _ => None,
        }
    }

    fn gem(index: usize) -> Self {
        Self::GEMS[index % Self::GEMS.len()]
    }
}

/// Token counts by color.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tokens(BTreeMap<Token, u32>);

impl Tokens {
    pub fn of(pairs: &[(Token, u32)]) -> Self {
        let mut tokens = Self::default();
        for &(token, n) in pairs {
            tokens.add(token, n);
        }
        tokens
    }

    pub fn get(&self, token: Token) -> u32 {
        self.0.get(&token).copied().unwrap_or(0)
    }

    pub fn add(&mut self, token: Token, n: u32) {
        *self.0.entry(token).or_insert(0) += n;
    }

    fn remove(&mut self, token: Token, n: u32) {
        let entry = self.0.entry(token).or_insert(0);
        *entry = entry.saturating_sub(n);
    }

    fn add_all(&mut self, other: &Tokens) {
        for (&token, &n) in other.iter() {
            self.add(token, n);
        }
    }

    fn remove_all(&mut self, other: &Tokens) {
        for (&token, &n) in other.iter() {
            self.remove(token, n);
        }
    }

    /// Whether every count in `other` is covered.
    fn covers(&self, other: &Tokens) -> bool {
        other.iter().all(|(&token, &n)| self.get(token) >= n)
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Token, &u32)> {
        self.0.iter()
    }
}

/// A development card.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Card {
    pub id: String,
    pub tier: u8,
    pub bonus: Token,
    pub points: u32,
    pub cost: Tokens,
}

/// Cost patterns as `([own, next, +2, +3, +4], points)`, rotated per bonus color.
const TIER1: [([u32; 5], u32); 8] = [
    ([0, 1, 1, 1, 1], 0),
    ([0, 1, 2, 1, 1], 0),
    ([0, 2, 2, 0, 1], 0),
    ([1, 0, 0, 3, 1], 0),
    ([0, 0, 2, 0, 2], 0),
    ([0, 0, 0, 2, 1], 0),
    ([0, 3, 0, 0, 0], 0),
    ([0, 0, 0, 0, 4], 1),
];
const TIER2: [([u32; 5], u32); 6] = [
    ([0, 3, 2, 2, 0], 1),
    ([2, 3, 0, 3, 0], 1),
    ([0, 1, 4, 2, 0], 2),
    ([0, 5, 0, 0, 0], 2),
    ([0, 0, 5, 3, 0], 2),
    ([6, 0, 0, 0, 0], 3),
];
const TIER3: [([u32; 5], u32); 4] = [
    ([0, 3, 3, 5, 3], 3),
    ([0, 7, 0, 0, 0], 4),
    ([3, 6, 3, 0, 0], 4),
    ([3, 7, 0, 0, 0], 5),
];

fn patterns(tier: u8) -> &'static [([u32; 5], u32)] {
    match tier {
        1 => &TIER1,
        2 => &TIER2,
        _ => &TIER3,
    }
}

fn tier_size(tier: u8) -> usize {
    patterns(tier).len() * Token::GEMS.len()
}

/// Look up a card by id.
pub fn card(id: &str) -> Option<Card> {
    let (tier, n) = id.strip_prefix('t')?.split_once("-c")?;
    let tier: u8 = tier.parse().ok().filter(|t| (1..=3).contains(t))?;
    let n: usize = n.parse().ok().filter(|&n| n >= 1 && n <= tier_size(tier))?;

    let table = patterns(tier);
    let color = (n - 1) / table.len();
    let (shape, points) = table[(n - 1) % table.len()];
    let mut cost = Tokens::default();
    for (offset, &amount) in shape.iter().enumerate() {
        if amount > 0 {
            cost.add(Token::gem(color + offset), amount);
        }
    }
    Some(Card {
        id: id.to_string(),
        tier,
        bonus: Token::gem(color),
        points,
        cost,
    })
}

const NOBLES: [[u32; 5]; 10] = [
    [0, 0, 4, 4, 0],
    [4, 0, 0, 0, 4],
    [4, 4, 0, 0, 0],
    [0, 0, 0, 4, 4],
    [0, 4, 4, 0, 0],
    [0, 0, 3, 3, 3],
    [0, 3, 3, 3, 0],
    [3, 0, 0, 3, 3],
    [3, 3, 0, 0, 3],
    [3, 3, 3, 0, 0],
];

/// Bonus requirement of noble `n1`..`n10`.
pub fn noble(id: &str) -> Option<Tokens> {
    let n: usize = id.strip_prefix('n')?.parse().ok()?;
    let shape = NOBLES.get(n.checked_sub(1)?)?;
    let mut need = Tokens::default();
    for (i, &amount) in shape.iter().enumerate() {
        if amount > 0 {
            need.add(Token::gem(i), amount);
        }
    }
    Some(need)
}

/// One player's holdings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Hand {
    pub tokens: Tokens,
    pub reserved: Vec<String>,
    pub purchased: Vec<String>,
    pub nobles: Vec<String>,
    pub prestige: u32,
}

impl Hand {
    /// Permanent discounts from purchased cards.
    pub fn bonuses(&self) -> Tokens {
        let mut bonuses = Tokens::default();
        for card in self.purchased.iter().filter_map(|id| card(id)) {
            bonuses.add(card.bonus, 1);
        }
        bonuses
    }
}

/// Splendor payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub bank: Tokens,
    /// Face-down decks, top first, indexed by tier - 1.
    pub decks: Vec<Vec<String>>,
    /// Face-up cards, indexed by tier - 1.
    pub market: Vec<Vec<String>>,
    pub nobles: Vec<String>,
    pub hands: BTreeMap<PlayerId, Hand>,
    #[serde(default)]
    pub last_round: bool,
    #[serde(default)]
    pub game_over: bool,
    #[serde(default)]
    pub resigned: Option<PlayerId>,
}

impl Board {
    fn hand(&self, player: &PlayerId) -> Result<&Hand, Rejection> {
        self.hands
            .get(player)
            .ok_or_else(|| Rejection::new(ReasonCode::INVALID_STATE, format!("no hand for {}", player)))
    }

    fn hand_mut(&mut self, player: &PlayerId) -> Result<&mut Hand, Rejection> {
        self.hands
            .get_mut(player)
            .ok_or_else(|| Rejection::new(ReasonCode::INVALID_STATE, format!("no hand for {}", player)))
    }

    fn draw(&mut self, tier: u8) -> Option<String> {
        let deck = self.decks.get_mut(usize::from(tier) - 1)?;
        (!deck.is_empty()).then(|| deck.remove(0))
    }

    /// Remove a face-up card, refilling its slot from the deck.
    fn take_from_market(&mut self, card_id: &str) -> Option<Card> {
        let card = card(card_id)?;
        let tier = usize::from(card.tier) - 1;
        let slot = self.market.get(tier)?.iter().position(|id| id == card_id)?;
        match self.draw(card.tier) {
            Some(refill) => self.market[tier][slot] = refill,
            None => {
                self.market[tier].remove(slot);
            }
        }
        Some(card)
    }
}

#[derive(Debug, Deserialize)]
struct ColorsArgs {
    colors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ColorArgs {
    color: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardArgs {
    card_id: String,
    #[serde(default)]
    payment: Option<Tokens>,
}

#[derive(Debug, Deserialize)]
struct TierArgs {
    tier: u8,
}

#[derive(Debug, Deserialize)]
struct ReturnArgs {
    returns: Tokens,
}

fn gem(name: &str) -> Result<Token, Rejection> {
    match Token::parse(name) {
        Some(Token::Gold) => reject(INVALID_COLOR, "gold cannot be taken directly"),
        Some(token) => Ok(token),
        None => reject(INVALID_COLOR, format!("{} is not a gem color", name)),
    }
}

/// Work out which tokens pay for `card`.
fn settle(card: &Card, hand: &Hand, payment: Option<&Tokens>) -> Result<Tokens, Rejection> {
    let bonuses = hand.bonuses();
    let owed: Vec<(Token, u32)> = Token::GEMS
        .iter()
        .map(|&gem| (gem, card.cost.get(gem).saturating_sub(bonuses.get(gem))))
        .collect();

    let Some(payment) = payment else {
        let mut paid = Tokens::default();
        let mut short = 0;
        for &(gem, due) in &owed {
            let from_gems = due.min(hand.tokens.get(gem));
            paid.add(gem, from_gems);
            short += due - from_gems;
        }
        if hand.tokens.get(Token::Gold) < short {
            return reject(INSUFFICIENT_PAYMENT, format!("{} is short by {} tokens", card.id, short));
        }
        paid.add(Token::Gold, short);
        return Ok(paid);
    };

    if !hand.tokens.covers(payment) {
        return reject(INSUFFICIENT_PAYMENT, "payment uses tokens you do not hold");
    }
    let mut deficit = 0;
    for &(gem, due) in &owed {
        let offered = payment.get(gem);
        if offered > due {
            return reject(INVALID_PAYMENT, format!("overpays {:?} for {}", gem, card.id));
        }
        deficit += due - offered;
    }
    let gold = payment.get(Token::Gold);
    if gold < deficit {
        reject(INSUFFICIENT_PAYMENT, format!("{} is short by {} tokens", card.id, deficit - gold))
    } else if gold > deficit {
        reject(INVALID_PAYMENT, format!("{} gold offered, {} needed", gold, deficit))
    } else {
        Ok(payment.clone())
    }
}

/// What resolving an action did.
struct Resolved {
    board: Board,
    phase: &'static str,
    pass_turn: bool,
    events: Vec<&'static str>,
}

/// Splendor rule engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct Splendor;

impl Splendor {
    /// Apply `action` to a copy of the board, or say why it is illegal.
    ///
    /// `validate` and `reduce` both run this, so they cannot disagree.
    fn resolve(&self, state: &GameState, action: &GameAction) -> Result<Resolved, Rejection> {
        let mut board: Board = guards::board(state)?;
        let actor = &action.actor_id;
        let mut events = Vec::new();

        if action.is(RESIGN) {
            board.resigned = Some(actor.clone());
            return Ok(Resolved {
                board,
                phase: MAIN_TURN,
                pass_turn: false,
                events: vec!["resigned"],
            });
        }

        let overflowing = state.phase == RETURN_TOKENS;
        if action.is(RETURN_TOKENS_AFTER_OVERFLOW) {
            if !overflowing {
                return reject(NOT_IN_OVERFLOW, "no tokens to return");
            }
            let args: ReturnArgs = guards::args(action)?;
            let hand = board.hand_mut(actor)?;
            let excess = hand.tokens.total().saturating_sub(TOKEN_LIMIT);
            if args.returns.total() != excess || !hand.tokens.covers(&args.returns) {
                return reject(INVALID_RETURN, format!("must return exactly {} held tokens", excess));
            }
            hand.tokens.remove_all(&args.returns);
            board.bank.add_all(&args.returns);
            events.push("tokens_returned");
            return Ok(self.end_turn(state, board, events));
        }
        if overflowing {
            return reject(ReasonCode::STAGE_VIOLATION, "return excess tokens first");
        }
        if state.phase != MAIN_TURN {
            return reject(ReasonCode::STAGE_VIOLATION, format!("no actions during {}", state.phase));
        }

        match action.action_type.as_str() {
            TAKE_TOKENS_DIFFERENT => {
                let args: ColorsArgs = guards::args(action)?;
                if args.colors.is_empty() || args.colors.len() > 3 {
                    return Err(Rejection::new(ReasonCode::INVALID_PAYLOAD, "take 1 to 3 colors").on_field("colors"));
                }
                let mut taken = Vec::with_capacity(3);
                for name in &args.colors {
                    let token = gem(name)?;
                    if taken.contains(&token) {
                        return reject(COLORS_NOT_DISTINCT, format!("{} requested twice", name));
                    }
                    if board.bank.get(token) == 0 {
                        return reject(TOKEN_UNAVAILABLE, format!("no {} left in the bank", name));
                    }
                    taken.push(token);
                }
                let hand = board.hand_mut(actor)?;
                for &token in &taken {
                    hand.tokens.add(token, 1);
                }
                for &token in &taken {
                    board.bank.remove(token, 1);
                }
                events.push("tokens_taken");
            }
            TAKE_TOKENS_SAME => {
                let args: ColorArgs = guards::args(action)?;
                let token = gem(&args.color)?;
                let available = board.bank.get(token);
                if available < SAME_COLOR_MINIMUM {
                    return reject(
                        TOKEN_POOL_TOO_LOW,
                        format!("{} has {} in the bank, {} needed", args.color, available, SAME_COLOR_MINIMUM),
                    );
                }
                board.bank.remove(token, 2);
                board.hand_mut(actor)?.tokens.add(token, 2);
                events.push("tokens_taken");
            }
            RESERVE_VISIBLE_CARD | RESERVE_TOP_DECK_CARD => {
                if board.hand(actor)?.reserved.len() >= RESERVE_LIMIT {
                    return reject(RESERVE_LIMIT_REACHED, "already holding 3 reserved cards");
                }
                let card_id = if action.is(RESERVE_VISIBLE_CARD) {
                    let args: CardArgs = guards::args(action)?;
                    board
                        .take_from_market(&args.card_id)
                        .ok_or_else(|| Rejection::new(CARD_NOT_FOUND, format!("{} is not face up", args.card_id)))?
                        .id
                } else {
                    let args: TierArgs = guards::args(action)?;
                    if !(1..=3).contains(&args.tier) {
                        return Err(Rejection::new(ReasonCode::INVALID_PAYLOAD, "tier must be 1-3").on_field("tier"));
                    }
                    board
                        .draw(args.tier)
                        .ok_or_else(|| Rejection::new(DECK_EMPTY, format!("tier {} deck is empty", args.tier)))?
                };
                let gold = board.bank.get(Token::Gold).min(1);
                board.bank.remove(Token::Gold, gold);
                let hand = board.hand_mut(actor)?;
                hand.reserved.push(card_id);
                hand.tokens.add(Token::Gold, gold);
                events.push("card_reserved");
            }
            PURCHASE_VISIBLE_CARD | PURCHASE_RESERVED_CARD => {
                let args: CardArgs = guards::args(action)?;
                let card = if action.is(PURCHASE_VISIBLE_CARD) {
                    board
                        .take_from_market(&args.card_id)
                        .ok_or_else(|| Rejection::new(CARD_NOT_FOUND, format!("{} is not face up", args.card_id)))?
                } else {
                    let hand = board.hand_mut(actor)?;
                    let slot = hand.reserved.iter().position(|id| id == &args.card_id).ok_or_else(|| {
                        Rejection::new(RESERVED_CARD_NOT_OWNED, format!("{} is not reserved by you", args.card_id))
                    })?;
                    let id = hand.reserved.remove(slot);
                    card(&id).ok_or_else(|| Rejection::new(ReasonCode::INVALID_STATE, format!("unknown card {}", id)))?
                };

                let paid = settle(&card, board.hand(actor)?, args.payment.as_ref())?;
                board.bank.add_all(&paid);
                let hand = board.hand_mut(actor)?;
                hand.tokens.remove_all(&paid);
                hand.purchased.push(card.id.clone());
                hand.prestige += card.points;
                events.push("card_purchased");

                let bonuses = hand.bonuses();
                if let Some(slot) = board
                    .nobles
                    .iter()
                    .position(|id| noble(id).is_some_and(|need| bonuses.covers(&need)))
                {
                    let id = board.nobles.remove(slot);
                    let hand = board.hand_mut(actor)?;
                    hand.nobles.push(id);
                    hand.prestige += NOBLE_PRESTIGE;
                    events.push("noble_assigned");
                }
            }
            other => return reject(ReasonCode::UNKNOWN_ACTION, format!("splendor has no {} action", other)),
        }

        if board.hand(actor)?.tokens.total() > TOKEN_LIMIT {
            events.push("token_overflow");
            return Ok(Resolved {
                board,
                phase: RETURN_TOKENS,
                pass_turn: false,
                events,
            });
        }
        Ok(self.end_turn(state, board, events))
    }

    fn end_turn(&self, state: &GameState, mut board: Board, mut events: Vec<&'static str>) -> Resolved {
        let prestige = board.hands.get(&state.current_player_id).map_or(0, |h| h.prestige);
        if prestige >= WINNING_PRESTIGE && !board.last_round {
            board.last_round = true;
            events.push("last_round_triggered");
        }
        let last_seat = state.current_seat() == Some(state.player_count() - 1);
        if board.last_round && last_seat {
            board.game_over = true;
        }
        Resolved {
            board,
            phase: MAIN_TURN,
            pass_turn: true,
            events,
        }
    }
}

/// Highest prestige, then fewest purchased cards; remaining ties share.
fn standings<'a>(board: &Board, candidates: impl Iterator<Item = &'a PlayerId>) -> Vec<PlayerId> {
    let ranked: Vec<(&PlayerId, u32, usize)> = candidates
        .filter_map(|p| board.hands.get(p).map(|h| (p, h.prestige, h.purchased.len())))
        .collect();
    let Some(best) = ranked.iter().map(|&(_, prestige, _)| prestige).max() else {
        return Vec::new();
    };
    let fewest = ranked
        .iter()
        .filter(|&&(_, prestige, _)| prestige == best)
        .map(|&(_, _, cards)| cards)
        .min()
        .unwrap_or(0);
    ranked
        .into_iter()
        .filter(|&(_, prestige, cards)| prestige == best && cards == fewest)
        .map(|(p, _, _)| p.clone())
        .collect()
}

impl RuleEngine for Splendor {
    fn game_id(&self) -> GameId {
        GameId::Splendor
    }

    fn setup(&self, players: &Seats, options: &MatchOptions) -> Result<Setup, SetupError> {
        let gems = match players.len() {
            2 => 4,
            3 => 5,
            4 => 7,
            count => return Err(SetupError::PlayerCount { game: GameId::Splendor, count }),
        };
        if let Some(variant) = options.variant.as_deref().filter(|v| *v != "base") {
            return Err(SetupError::UnknownVariant {
                game: GameId::Splendor,
                variant: variant.to_string(),
            });
        }

        let mut bank = Tokens::default();
        for gem in Token::GEMS {
            bank.add(gem, gems);
        }
        bank.add(Token::Gold, GOLD_SUPPLY);

        let mut decks: Vec<Vec<String>> = Vec::with_capacity(3);
        let mut market: Vec<Vec<String>> = Vec::with_capacity(3);
        for tier in 1..=3u8 {
            let mut deck: Vec<String> = (1..=tier_size(tier)).map(|n| format!("t{}-c{}", tier, n)).collect();
            GameRng::for_step(options.seed, 0, &format!("tier{}", tier)).shuffle(&mut deck);
            market.push(deck.drain(..MARKET_WIDTH).collect());
            decks.push(deck);
        }

        let mut nobles: Vec<String> = (1..=NOBLES.len()).map(|n| format!("n{}", n)).collect();
        GameRng::for_step(options.seed, 0, "nobles").shuffle(&mut nobles);
        nobles.truncate(players.len() + 1);

        let board = Board {
            bank,
            decks,
            market,
            nobles,
            hands: players.ids().map(|p| (p.clone(), Hand::default())).collect(),
            last_round: false,
            game_over: false,
            resigned: None,
        };
        let payload = guards::store_board(GameId::Splendor, &board).map_err(|e| SetupError::Encode {
            game: GameId::Splendor,
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
        next.phase = resolved.phase.to_string();
        next.payload = guards::store_board(GameId::Splendor, &resolved.board)?;
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
        let board: Board = guards::load_board(GameId::Splendor, state)?;
        if let Some(resigned) = &board.resigned {
            let winners = standings(&board, state.players.others(resigned));
            return Ok(Some(Finish::new(GameResult::from_leaders(winners), "resign")));
        }
        if board.game_over {
            let winners = standings(&board, state.players.ids());
            return Ok(Some(Finish::new(GameResult::from_leaders(winners), "prestige")));
        }
        Ok(None)
    }

    fn is_turn_exempt(&self, action_type: &str) -> bool {
        action_type == RESIGN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MatchStatus;
    use crate::pipeline::{apply, Applied};
    use serde_json::json;

    fn start(players: &[&str]) -> GameState {
        let seats = Seats::from_ids(players.iter().copied());
        let setup = Splendor.setup(&seats, &MatchOptions::default()).unwrap();
        GameState::new(GameId::Splendor, "s1", seats)
            .with_phase(setup.phase)
            .with_payload(setup.payload)
            .with_status(MatchStatus::Active)
    }

    fn board(state: &GameState) -> Board {
        state.payload.decode().unwrap()
    }

    fn edit(state: &GameState, f: impl FnOnce(&mut Board)) -> GameState {
        let mut board = board(state);
        f(&mut board);
        state.clone().with_payload(crate::core::Payload::encode(&board).unwrap())
    }

    fn act(actor: &str, kind: &str, payload: serde_json::Value) -> GameAction {
        GameAction::new(GameId::Splendor, "s1", actor, kind, 1).with_payload(payload)
    }

    fn play(state: &GameState, action: GameAction) -> crate::pipeline::Transition {
        match apply(&Splendor, state, &action).unwrap() {
            Applied::Accepted(t) => t,
            Applied::Rejected(errors) => panic!("rejected: {:?}", errors),
        }
    }

    fn code(state: &GameState, action: GameAction) -> ReasonCode {
        Splendor.validate(state, &action).errors()[0].code
    }

    #[test]
    fn test_catalogue() {
        let c = card("t1-c8").unwrap();
        assert_eq!(c.bonus, Token::Diamond);
        assert_eq!(c.points, 1);
        assert_eq!(c.cost, Tokens::of(&[(Token::Onyx, 4)]));

        assert_eq!(card("t3-c20").unwrap().bonus, Token::Onyx);
        assert!(card("t1-c41").is_none());
        assert!(card("t4-c1").is_none());
        assert!(card("rsv-7").is_none());
        assert_eq!(noble("n1").unwrap().total(), 8);
        assert!(noble("n11").is_none());
    }

    #[test]
    fn test_setup_layout() {
        let state = start(&["p1", "p2", "p3"]);
        let board = board(&state);

        assert_eq!(board.bank.get(Token::Ruby), 5);
        assert_eq!(board.bank.get(Token::Gold), 5);
        assert!(board.market.iter().all(|row| row.len() == 4));
        assert_eq!(board.decks[0].len(), 36);
        assert_eq!(board.nobles.len(), 4);
        assert_eq!(state.phase, "main_turn");
    }

    #[test]
    fn test_setup_is_seeded() {
        let seats = Seats::from_ids(["a", "b"]);
        let a = Splendor.setup(&seats, &MatchOptions::default().with_seed(1)).unwrap();
        let b = Splendor.setup(&seats, &MatchOptions::default().with_seed(1)).unwrap();
        let c = Splendor.setup(&seats, &MatchOptions::default().with_seed(2)).unwrap();

        assert_eq!(a, b);
        assert_ne!(a.payload, c.payload);
    }

    #[test]
    fn test_take_two_different() {
        let state = start(&["p1", "p2", "p3"]);
        let t = play(&state, act("p1", TAKE_TOKENS_DIFFERENT, json!({"colors": ["emerald", "ruby"]})));
        let board = board(&t.next_state);

        assert_eq!(t.next_state.version, 1);
        assert!(t.next_state.winner_ids.is_empty());
        assert_eq!(board.hands[&PlayerId::new("p1")].tokens.total(), 2);
        assert_eq!(board.bank.get(Token::Emerald), 4);
        assert_eq!(t.next_state.current_player_id, PlayerId::new("p2"));
    }

    #[test]
    fn test_take_tokens_errors() {
        let state = start(&["p1", "p2"]);
        let low = edit(&state, |b| b.bank = Tokens::of(&[(Token::Emerald, 3), (Token::Ruby, 0)]));

        assert_eq!(code(&low, act("p1", TAKE_TOKENS_SAME, json!({"color": "emerald"}))), TOKEN_POOL_TOO_LOW);
        assert_eq!(
            code(&state, act("p1", TAKE_TOKENS_DIFFERENT, json!({"colors": ["ruby", "ruby", "onyx"]}))),
            COLORS_NOT_DISTINCT
        );
        assert_eq!(
            code(&state, act("p1", TAKE_TOKENS_DIFFERENT, json!({"colors": ["gold"]}))),
            INVALID_COLOR
        );
        assert_eq!(
            code(&low, act("p1", TAKE_TOKENS_DIFFERENT, json!({"colors": ["ruby"]}))),
            TOKEN_UNAVAILABLE
        );
        assert_eq!(
            code(&state, act("p1", TAKE_TOKENS_DIFFERENT, json!({"colors": []}))),
            ReasonCode::INVALID_PAYLOAD
        );
    }

    #[test]
    fn test_take_same() {
        let state = start(&["p1", "p2"]);
        let t = play(&state, act("p1", TAKE_TOKENS_SAME, json!({"color": "onyx"})));

        assert_eq!(board(&t.next_state).bank.get(Token::Onyx), 2);
    }

    #[test]
    fn test_overflow_requires_return() {
        let state = edit(&start(&["p1", "p2"]), |b| {
            b.hands.get_mut(&PlayerId::new("p1")).unwrap().tokens = Tokens::of(&[(Token::Ruby, 4), (Token::Onyx, 5)]);
        });
        let t = play(&state, act("p1", TAKE_TOKENS_DIFFERENT, json!({"colors": ["diamond", "sapphire"]})));
        let over = t.next_state;

        assert_eq!(over.phase, "return_tokens");
        assert_eq!(over.current_player_id, PlayerId::new("p1"));
        assert_eq!(
            code(&over, act("p1", TAKE_TOKENS_SAME, json!({"color": "emerald"}))),
            ReasonCode::STAGE_VIOLATION
        );
        assert_eq!(
            code(&over, act("p1", RETURN_TOKENS_AFTER_OVERFLOW, json!({"returns": {"ruby": 2}}))),
            INVALID_RETURN
        );

        let done = play(&over, act("p1", RETURN_TOKENS_AFTER_OVERFLOW, json!({"returns": {"ruby": 1}}))).next_state;
        assert_eq!(done.phase, "main_turn");
        assert_eq!(board(&done).hands[&PlayerId::new("p1")].tokens.total(), 10);
        assert_eq!(done.current_player_id, PlayerId::new("p2"));
        assert_eq!(
            code(&done, act("p2", RETURN_TOKENS_AFTER_OVERFLOW, json!({"returns": {}}))),
            NOT_IN_OVERFLOW
        );
    }

    #[test]
    fn test_reserve() {
        let state = start(&["p1", "p2"]);
        let visible = board(&state).market[0][2].clone();

        let t = play(&state, act("p1", RESERVE_VISIBLE_CARD, json!({"tier": 1, "cardId": visible})));
        let after = board(&t.next_state);
        let hand = &after.hands[&PlayerId::new("p1")];
        assert_eq!(hand.reserved, vec![visible.clone()]);
        assert_eq!(hand.tokens.get(Token::Gold), 1);
        assert_eq!(after.market[0].len(), 4);
        assert!(!after.market[0].contains(&visible));

        let blind = play(&t.next_state, act("p2", RESERVE_TOP_DECK_CARD, json!({"tier": 2})));
        assert_eq!(board(&blind.next_state).decks[1].len(), after.decks[1].len() - 1);
    }

    #[test]
    fn test_reserve_errors() {
        let state = edit(&start(&["p1", "p2"]), |b| {
            b.hands.get_mut(&PlayerId::new("p1")).unwrap().reserved = vec!["t1-c1".into(), "t1-c2".into(), "t1-c3".into()];
            b.hands.get_mut(&PlayerId::new("p2")).unwrap().reserved = Vec::new();
            b.decks[2].clear();
        });
        let visible = board(&state).market[0][0].clone();

        assert_eq!(
            code(&state, act("p1", RESERVE_VISIBLE_CARD, json!({"cardId": visible}))),
            RESERVE_LIMIT_REACHED
        );
        let p2_turn = GameState { current_player_id: "p2".into(), ..state.clone() };
        assert_eq!(code(&p2_turn, act("p2", RESERVE_TOP_DECK_CARD, json!({"tier": 3}))), DECK_EMPTY);
        assert_eq!(
            code(&p2_turn, act("p2", RESERVE_VISIBLE_CARD, json!({"cardId": "t9-c9"}))),
            CARD_NOT_FOUND
        );
    }

    #[test]
    fn test_purchase_with_bonus_and_gold() {
        let state = start(&["p1", "p2"]);
        let target = board(&state).market[0][0].clone();
        let cost = card(&target).unwrap().cost;
        let state = edit(&state, |b| {
            let hand = b.hands.get_mut(&PlayerId::new("p1")).unwrap();
            hand.tokens = cost.clone();
            // Swap one owed gem for gold.
            let (&first, _) = cost.iter().find(|(_, n)| **n > 0).unwrap();
            hand.tokens.remove(first, 1);
            hand.tokens.add(Token::Gold, 1);
        });

        let t = play(&state, act("p1", PURCHASE_VISIBLE_CARD, json!({"cardId": target})));
        let after = board(&t.next_state);
        let hand = &after.hands[&PlayerId::new("p1")];
        assert_eq!(hand.purchased, vec![target]);
        assert_eq!(hand.tokens.total(), 0);
        assert!(t.events.iter().any(|e| e == "card_purchased"));
    }

    #[test]
    fn test_purchase_errors() {
        let state = start(&["p1", "p2"]);
        let target = board(&state).market[0][0].clone();

        assert_eq!(
            code(&state, act("p1", PURCHASE_VISIBLE_CARD, json!({"cardId": target}))),
            INSUFFICIENT_PAYMENT
        );
        assert_eq!(
            code(&state, act("p1", PURCHASE_RESERVED_CARD, json!({"cardId": "t1-c1"}))),
            RESERVED_CARD_NOT_OWNED
        );

        let rich = edit(&state, |b| {
            b.hands.get_mut(&PlayerId::new("p1")).unwrap().tokens = Tokens::of(&[(Token::Gold, 6)]);
        });
        // Tier-1 cards never owe more than 5.
        assert_eq!(
            code(&rich, act("p1", PURCHASE_VISIBLE_CARD, json!({"cardId": target, "payment": {"gold": 6}}))),
            INVALID_PAYMENT
        );
    }

    #[test]
    fn test_purchase_reserved_assigns_noble() {
        // n1 needs 4 emerald + 4 ruby bonuses; p1 has 4 + 3 and buys a ruby card.
        let ruby_card = "t1-c25";
        assert_eq!(card(ruby_card).unwrap().bonus, Token::Ruby);
        let state = edit(&start(&["p1", "p2"]), |b| {
            b.nobles = vec!["n3".into(), "n1".into()];
            let hand = b.hands.get_mut(&PlayerId::new("p1")).unwrap();
            hand.purchased = ["t1-c17", "t1-c18", "t1-c19", "t1-c20", "t1-c26", "t1-c27", "t1-c28"]
                .map(String::from)
                .to_vec();
            hand.reserved = vec![ruby_card.into()];
            hand.tokens = Tokens::of(&[(Token::Gold, 5)]);
        });
        assert_eq!(board(&state).hands[&PlayerId::new("p1")].bonuses().get(Token::Emerald), 4);

        let t = play(&state, act("p1", PURCHASE_RESERVED_CARD, json!({"cardId": ruby_card})));
        let after = board(&t.next_state);
        let hand = &after.hands[&PlayerId::new("p1")];

        assert_eq!(hand.nobles, vec!["n1".to_string()]);
        assert_eq!(after.nobles, vec!["n3".to_string()]);
        assert_eq!(hand.prestige, NOBLE_PRESTIGE);
        assert!(t.events.iter().any(|e| e == "noble_assigned"));
    }

    #[test]
    fn test_last_round_and_tie_break() {
        // p1 reaches 15 on the first seat; the round runs to p3, then ends.
        let state = edit(&start(&["p1", "p2", "p3"]), |b| {
            for (id, prestige, cards) in [("p1", 15, 9), ("p2", 15, 7), ("p3", 3, 2)] {
                let hand = b.hands.get_mut(&PlayerId::new(id)).unwrap();
                hand.prestige = prestige;
                hand.purchased = (1..=cards).map(|n| format!("t1-c{}", n)).collect();
            }
        });
        let take = |actor: &str| act(actor, TAKE_TOKENS_DIFFERENT, json!({"colors": ["ruby"]}));

        let t1 = play(&state, take("p1"));
        assert!(t1.events.iter().any(|e| e == "last_round_triggered"));
        assert_eq!(t1.next_state.status, MatchStatus::Active);
        let t2 = play(&t1.next_state, take("p2"));
        assert_eq!(t2.next_state.status, MatchStatus::Active);
        let t3 = play(&t2.next_state, take("p3"));

        assert_eq!(t3.next_state.status, MatchStatus::Finished);
        assert_eq!(t3.next_state.winner_ids, vec![PlayerId::new("p2")]);
    }

    #[test]
    fn test_full_tie_shares_win() {
        let mut board = board(&start(&["p1", "p2"]));
        for id in ["p1", "p2"] {
            board.hands.get_mut(&PlayerId::new(id)).unwrap().prestige = 16;
        }
        let ids = [PlayerId::new("p1"), PlayerId::new("p2")];

        assert_eq!(standings(&board, ids.iter()), ids.to_vec());
    }

    #[test]
    fn test_resign_out_of_turn() {
        let state = start(&["p1", "p2", "p3"]);
        let t = play(&state, act("p3", RESIGN, json!({})));

        assert_eq!(t.next_state.status, MatchStatus::Finished);
        assert_eq!(t.next_state.winner_ids, vec![PlayerId::new("p1"), PlayerId::new("p2")]);
    }
}
