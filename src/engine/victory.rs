//! Victory evaluation.
//!
//! Rules are tried top to bottom; the first whose `when` holds decides the
//! outcome. No match means the game is ongoing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::compiler::spec::CompiledSpec;
use crate::core::action::Payload;
use crate::core::error::EvalError;
use crate::core::state::GameState;
use crate::core::SeatId;
use crate::expr::EvalContext;

/// Outcome class of a victory rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VictoryResult {
    Win,
    Loss,
    Tie,
    Ongoing,
}

impl VictoryResult {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "win" => Some(Self::Win),
            "loss" => Some(Self::Loss),
            "tie" => Some(Self::Tie),
            "ongoing" => Some(Self::Ongoing),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Loss => "loss",
            Self::Tie => "tie",
            Self::Ongoing => "ongoing",
        }
    }

    /// True for every result but `Ongoing`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Ongoing)
    }
}

impl fmt::Display for VictoryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decided outcome, with the rule that decided it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VictoryOutcome {
    pub result: VictoryResult,
    /// Seat named by a `result:seat` rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat: Option<SeatId>,
    /// `victory:{index}:{result}` of the matching rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl VictoryOutcome {
    #[must_use]
    pub fn ongoing() -> Self {
        Self {
            result: VictoryResult::Ongoing,
            seat: None,
            branch: None,
        }
    }
}

/// Evaluate the victory rules against a state.
pub fn evaluate_victory(spec: &CompiledSpec, state: &GameState) -> Result<VictoryOutcome, EvalError> {
    let evaluator = spec.eval_limits.evaluator();
    let payload = Payload::new();
    let ctx = EvalContext::new(state, state.active_seat.as_deref(), &payload);

    for (index, rule) in spec.victory.order.iter().enumerate() {
        if !evaluator.eval_condition(Some(&rule.when), &ctx)? {
            continue;
        }
        let (class, seat) = match rule.result.split_once(':') {
            Some((class, seat)) => (class, Some(seat.to_string())),
            None => (rule.result.as_str(), None),
        };
        let result = VictoryResult::parse(class)
            .ok_or_else(|| EvalError::Malformed(format!("victory result '{}'", rule.result)))?;
        return Ok(VictoryOutcome {
            result,
            seat,
            branch: Some(format!("victory:{index}:{}", rule.result)),
        });
    }
    Ok(VictoryOutcome::ongoing())
}
