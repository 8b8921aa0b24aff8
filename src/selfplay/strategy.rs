//! Choice strategies for self-play.
//!
//! A strategy picks one call from the enumerated candidates of the active
//! seat. Returning `Ok(None)` gives up the episode; returning an error
//! counts as a violation.

use std::collections::BTreeMap;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::core::action::ActionCall;
use crate::core::state::GameState;
use crate::core::SeatId;

/// What a strategy sees besides the candidates.
#[derive(Clone, Copy, Debug)]
pub struct StrategyContext<'a> {
    pub seat: &'a str,
    pub state: &'a GameState,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    #[error("strategy chose '{0}', which was not offered")]
    NotOffered(String),

    #[error("strategy failed: {0}")]
    Failed(String),
}

// =============================================================================
// Strategy
// =============================================================================

pub trait Strategy: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn choose(&mut self, calls: &[ActionCall], ctx: &StrategyContext<'_>) -> Result<Option<ActionCall>, StrategyError>;
}

/// Always takes the first candidate.
#[derive(Clone, Debug, Default)]
pub struct FirstStrategy;

impl Strategy for FirstStrategy {
    fn name(&self) -> &'static str {
        "first"
    }

    fn choose(&mut self, calls: &[ActionCall], _ctx: &StrategyContext<'_>) -> Result<Option<ActionCall>, StrategyError> {
        Ok(calls.first().cloned())
    }
}

/// Uniform choice from a seeded generator.
#[derive(Clone, Debug)]
pub struct RandomStrategy {
    rng: ChaCha8Rng,
}

impl RandomStrategy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Strategy for RandomStrategy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn choose(&mut self, calls: &[ActionCall], _ctx: &StrategyContext<'_>) -> Result<Option<ActionCall>, StrategyError> {
        if calls.is_empty() {
            return Ok(None);
        }
        let index = self.rng.gen_range(0..calls.len());
        Ok(Some(calls[index].clone()))
    }
}

// =============================================================================
// Strategy selection
// =============================================================================

/// Built-in strategies by name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    First,
    Random,
}

impl StrategyKind {
    /// Build a strategy of this kind. `seed` only matters for `Random`.
    #[must_use]
    pub fn build(self, seed: u64) -> Box<dyn Strategy> {
        match self {
            Self::First => Box::new(FirstStrategy),
            Self::Random => Box::new(RandomStrategy::new(seed)),
        }
    }
}

/// Strategies assigned per seat. Unassigned seats play [`FirstStrategy`].
#[derive(Default)]
pub struct StrategyTable {
    by_seat: BTreeMap<SeatId, Box<dyn Strategy>>,
    fallback: FirstStrategy,
}

impl StrategyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The same kind for every listed seat, seeds derived from `seed` by seat index.
    pub fn uniform(kind: StrategyKind, seats: &[SeatId], seed: u64) -> Self {
        seats
            .iter()
            .enumerate()
            .fold(Self::new(), |table, (i, seat)| {
                table.with_seat(seat.clone(), kind.build(seed.wrapping_add(i as u64)))
            })
    }

    #[must_use]
    pub fn with_seat(mut self, seat: impl Into<SeatId>, strategy: Box<dyn Strategy>) -> Self {
        self.by_seat.insert(seat.into(), strategy);
        self
    }

    /// The strategy playing `seat`.
    pub fn for_seat(&mut self, seat: &str) -> &mut dyn Strategy {
        match self.by_seat.get_mut(seat) {
            Some(strategy) => strategy.as_mut(),
            None => &mut self.fallback,
        }
    }
}

impl std::fmt::Debug for StrategyTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let seats: BTreeMap<&str, &str> = self
            .by_seat
            .iter()
            .map(|(seat, strategy)| (seat.as_str(), strategy.name()))
            .collect();
        f.debug_struct("StrategyTable").field("by_seat", &seats).finish()
    }
}
