//! Rule engine contract for game implementations.
//!
//! Games implement `RuleEngine` to define:
//! - Legality of an action against a state
//! - How an accepted action produces the next state
//! - Terminal conditions and winners
//!
//! The pipeline calls into `RuleEngine` but never interprets
//! game-specific concepts directly.

pub mod engine;
pub mod guards;

pub use engine::{
    Events, Finish, GameResult, ReasonCode, Reduction, Rejection, Rejections, RuleEngine, RuleFault, Setup,
    SetupError, Validation,
};
