//! Deterministic random number generation carried inside game state.
//!
//! ## Key Features
//!
//! - **Deterministic**: Same seed produces identical sequence
//! - **Tiny state**: One `u32`, stored in the state as a decimal string
//! - **Portable**: A 32-bit mulberry generator, so other implementations
//!   replaying the same actions reach the same hashes
//!
//! ## Replay Usage
//!
//! ```
//! use rulekit::core::GameRng;
//!
//! let mut rng = GameRng::new(42);
//! let mut deck = vec!["c1", "c2", "c3", "c4", "c5"];
//! rng.shuffle(&mut deck);
//!
//! // The carried state restores the exact same stream.
//! let saved = rng.state_string();
//! let mut restored = GameRng::from_state_str(&saved).unwrap();
//! assert_eq!(rng.next_u32(), restored.next_u32());
//! ```

use super::error::ExecError;

/// Increment applied to the state on every draw.
const GOLDEN_STEP: u32 = 0x6D2B_79F5;

/// 32-bit deterministic generator.
///
/// The whole generator state is a single word, so capturing and restoring it
/// is a string round-trip through `GameState::rng_state`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameRng {
    state: u32,
}

impl GameRng {
    /// Create a new RNG with the given seed.
    ///
    /// Only the low 32 bits of the seed are used.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { state: seed as u32 }
    }

    /// Restore a generator from its serialized state.
    pub fn from_state_str(state: &str) -> Result<Self, ExecError> {
        state
            .trim()
            .parse::<u32>()
            .map(|state| Self { state })
            .map_err(|_| ExecError::RngState(state.to_string()))
    }

    /// Current internal state.
    #[must_use]
    pub fn state(&self) -> u32 {
        self.state
    }

    /// Current internal state as stored in game state.
    #[must_use]
    pub fn state_string(&self) -> String {
        self.state.to_string()
    }

    /// Draw the next 32-bit value.
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(GOLDEN_STEP);
        let t = self.state;
        let mut r = (t ^ (t >> 15)).wrapping_mul(1 | t);
        r ^= r.wrapping_add((r ^ (r >> 7)).wrapping_mul(61 | r));
        r ^ (r >> 14)
    }

    /// Draw an index in `0..bound`. Returns 0 when `bound` is 0.
    pub fn gen_index(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        self.next_u32() as usize % bound
    }

    /// Fisher–Yates shuffle in place, walking from the tail down.
    ///
    /// Consumes exactly `len - 1` draws (none for 0 or 1 elements).
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = self.gen_index(i + 1);
            slice.swap(i, j);
        }
    }
}

/// Derive an independent seed from a base seed and a salt.
///
/// Used to give every self-play episode its own strategy stream.
#[must_use]
pub fn mix_seed(base: u32, salt: u32) -> u32 {
    let mut x = (base ^ 0x9E37_79B9).wrapping_add(salt);
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    x
}
