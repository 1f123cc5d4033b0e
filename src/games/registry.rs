//! Engine registry.
//!
//! Built once at process start and passed by reference. Read-only after
//! construction; there is no global instance.

use rustc_hash::FxHashMap;

use super::{Azul, Catan, GoStop, Gomoku, Splendor};
use crate::core::{standard_catalog, CatalogEntry, GameId};
use crate::rules::RuleEngine;

struct Registered {
    entry: CatalogEntry,
    engine: Box<dyn RuleEngine>,
}

/// Lookup table from `GameId` to rule engine and catalog entry.
#[derive(Default)]
pub struct EngineRegistry {
    games: FxHashMap<GameId, Registered>,
}

impl EngineRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all five games and the standard catalog.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for entry in standard_catalog() {
            let engine: Box<dyn RuleEngine> = match entry.game_id {
                GameId::Splendor => Box::new(Splendor),
                GameId::Gomoku => Box::new(Gomoku::default()),
                GameId::Gostop => Box::new(GoStop),
                GameId::Catan => Box::new(Catan),
                GameId::Azul => Box::new(Azul),
            };
            registry.register(entry, engine);
        }
        registry
    }

    /// Register an engine under its catalog entry.
    ///
    /// Panics on duplicate registration or if the engine does not own the
    /// entry's game.
    pub fn register(&mut self, entry: CatalogEntry, engine: Box<dyn RuleEngine>) {
        assert_eq!(
            entry.game_id,
            engine.game_id(),
            "Engine registered under another game's catalog entry"
        );
        let game_id = entry.game_id;
        let previous = self.games.insert(game_id, Registered { entry, engine });
        assert!(previous.is_none(), "Game {} registered twice", game_id);
    }

    /// The engine for a game.
    pub fn engine(&self, game_id: GameId) -> Option<&dyn RuleEngine> {
        self.games.get(&game_id).map(|r| r.engine.as_ref())
    }

    /// The catalog entry for a game.
    pub fn entry(&self, game_id: GameId) -> Option<&CatalogEntry> {
        self.games.get(&game_id).map(|r| &r.entry)
    }

    /// Catalog entries in `GameId` order.
    pub fn catalog(&self) -> Vec<&CatalogEntry> {
        let mut entries: Vec<_> = self.games.values().map(|r| &r.entry).collect();
        entries.sort_by_key(|e| e.game_id);
        entries
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}
