//! Deterministic random number generation for reducers.
//!
//! Reducers must be pure functions of `(state, action)`, so they never own
//! an RNG across calls. Instead every draw derives a fresh stream from:
//!
//! - the match seed (captured in the payload at setup),
//! - the state version the reducer is producing,
//! - a context label separating unrelated draws (dice vs. shuffles).
//!
//! Replaying the same log therefore reproduces every roll and shuffle.
//!
//! ```
//! use boardgame_core::core::GameRng;
//!
//! let mut a = GameRng::for_step(42, 7, "dice");
//! let mut b = GameRng::for_step(42, 7, "dice");
//! assert_eq!(a.roll(6), b.roll(6));
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const CONTEXT_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const CONTEXT_PRIME: u64 = 0x0000_0100_0000_01b3;
const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Deterministic RNG.
///
/// Uses ChaCha8 for speed; the stream depends only on the derived seed.
#[derive(Clone, Debug)]
pub struct GameRng {
    inner: ChaCha8Rng,
    seed: u64,
}

impl GameRng {
    /// Create a new RNG with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Stream for one reducer step.
    ///
    /// The context label is folded with FNV-1a so the derived seed is stable
    /// across processes and toolchains (unlike `DefaultHasher`).
    #[must_use]
    pub fn for_step(match_seed: u64, version: u64, context: &str) -> Self {
        let mut mixed = CONTEXT_OFFSET;
        for byte in context.bytes() {
            mixed ^= u64::from(byte);
            mixed = mixed.wrapping_mul(CONTEXT_PRIME);
        }
        let seed = match_seed
            .wrapping_add(version.wrapping_mul(GOLDEN_GAMMA))
            ^ mixed;
        Self::new(seed)
    }

    /// The derived seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Roll one die with `sides` faces (1..=sides).
    pub fn roll(&mut self, sides: u8) -> u8 {
        self.inner.gen_range(1..=sides)
    }

    /// Generate a random usize in the given range.
    pub fn gen_range_usize(&mut self, range: std::ops::Range<usize>) -> usize {
        self.inner.gen_range(range)
    }

    /// Shuffle a slice in place.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        use rand::seq::SliceRandom;
        slice.shuffle(&mut self.inner);
    }
}
