//! Player identification and seating.
//!
//! ## PlayerId
//!
//! Opaque player identifier assigned by the hosting service (e.g. `"p1"`).
//!
//! ## Seats
//!
//! Ordered per-player public state. Membership and order are fixed at match
//! start; rule engines use seat order for turn rotation.

use std::fmt;
use std::ops::Index;

use im::Vector;
use serde::{Deserialize, Serialize};

/// Player identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Create a new player ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PlayerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for PlayerId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PlayerId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Public per-player state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub player_id: PlayerId,
    pub nickname: String,
    pub connected: bool,
    pub is_ready: bool,
}

impl PlayerState {
    /// Create a connected, ready player whose nickname is its id.
    pub fn new(player_id: impl Into<PlayerId>) -> Self {
        let player_id = player_id.into();
        Self {
            nickname: player_id.to_string(),
            player_id,
            connected: true,
            is_ready: true,
        }
    }

    /// Set the nickname.
    #[must_use]
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }
}

/// Ordered seating of a match.
///
/// Backed by `im::Vector` so cloning a state shares the seat list.
///
/// ## Example
///
/// ```
/// use boardgame_core::core::{PlayerId, PlayerState, Seats};
///
/// let seats = Seats::from_ids(["p1", "p2", "p3"]);
/// assert_eq!(seats.len(), 3);
/// assert_eq!(seats.next_after(&PlayerId::new("p3")), Some(&PlayerId::new("p1")));
/// assert_eq!(seats[1], PlayerState::new("p2"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seats {
    players: Vector<PlayerState>,
}

impl Seats {
    /// Create seats from player states, keeping their order.
    pub fn new(players: impl IntoIterator<Item = PlayerState>) -> Self {
        Self {
            players: players.into_iter().collect(),
        }
    }

    /// Create seats from bare ids.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PlayerId>,
    {
        Self::new(ids.into_iter().map(PlayerState::new))
    }

    /// Number of seated players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether nobody is seated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Seat index of a player.
    #[must_use]
    pub fn seat_of(&self, player: &PlayerId) -> Option<usize> {
        self.players.iter().position(|p| &p.player_id == player)
    }

    /// Whether the player is seated in this match.
    #[must_use]
    pub fn contains(&self, player: &PlayerId) -> bool {
        self.seat_of(player).is_some()
    }

    /// Player id at a seat index.
    #[must_use]
    pub fn id_at(&self, seat: usize) -> Option<&PlayerId> {
        self.players.get(seat).map(|p| &p.player_id)
    }

    /// The player seated after `player`, wrapping around.
    #[must_use]
    pub fn next_after(&self, player: &PlayerId) -> Option<&PlayerId> {
        let seat = self.seat_of(player)?;
        self.id_at((seat + 1) % self.players.len())
    }

    /// Iterate over player ids in seat order.
    pub fn ids(&self) -> impl Iterator<Item = &PlayerId> {
        self.players.iter().map(|p| &p.player_id)
    }

    /// Iterate over player states in seat order.
    pub fn iter(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.iter()
    }

    /// Ids of everyone except `player`, in seat order.
    pub fn others<'a>(&'a self, player: &'a PlayerId) -> impl Iterator<Item = &'a PlayerId> + 'a {
        self.ids().filter(move |id| *id != player)
    }

    /// Update the connection flag of a player. Returns false if not seated.
    pub fn set_connected(&mut self, player: &PlayerId, connected: bool) -> bool {
        match self.seat_of(player) {
            Some(seat) => {
                self.players[seat].connected = connected;
                true
            }
            None => false,
        }
    }
}

impl Index<usize> for Seats {
    type Output = PlayerState;

    fn index(&self, seat: usize) -> &Self::Output {
        &self.players[seat]
    }
}
