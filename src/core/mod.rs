//! Core types: players, state, actions, RNG, configuration.
//!
//! These are game-agnostic. Rule engines read and write them; the pipeline
//! only ever looks at the envelope (ids, version, status, seats), never at
//! the payload.

pub mod player;
pub mod rng;
pub mod config;
pub mod action;
pub mod state;

pub use player::{PlayerId, PlayerState, Seats};
pub use rng::GameRng;
pub use config::{standard_catalog, CatalogEntry, GameId, MatchOptions, SessionConfig, UnknownGameId};
pub use action::GameAction;
pub use state::{GameState, MatchStatus, Payload};
