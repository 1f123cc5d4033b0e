//! Rule engines for the hosted games and the registry that serves them.
//!
//! Each engine owns its payload schema, action types and reason codes.
//! Action-type and reason-code constants are exported per module
//! (`games::gomoku::PLACE_STONE`, `games::azul::ALREADY_TILED`, ...).

pub mod azul;
pub mod catan;
pub mod gomoku;
pub mod gostop;
pub mod registry;
pub mod splendor;

pub use azul::Azul;
pub use catan::Catan;
pub use gomoku::Gomoku;
pub use gostop::GoStop;
pub use registry::EngineRegistry;
pub use splendor::Splendor;
