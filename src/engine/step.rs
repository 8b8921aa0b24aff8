//! The step engine.
//!
//! ## Call sequence
//!
//! 1. Sequencing: `seq` must be exactly `last_seq + 1`
//! 2. Turn: the actor must be the active seat, or `system`
//! 3. Lookup, then payload validation against the input shape
//! 4. Precondition (`require_ast`)
//! 5. Effect pipeline, then `after:{action}` triggers, on a clone of the state
//! 6. Invariants on the result
//!
//! Any failure returns a [`StepError`] and the caller's state is untouched:
//! the working copy is simply dropped.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::invariants;
use super::payload::validate_payload;
use crate::compiler::spec::CompiledSpec;
use crate::compiler::END_TURN;
use crate::core::action::{Event, StepAction};
use crate::core::error::{ErrorReport, FieldError, StepError};
use crate::core::state::GameState;
use crate::core::SYSTEM_SEAT;
use crate::effects::{EffectResolver, ResolverContext};
use crate::expr::EvalContext;
use crate::triggers::TriggerRegistry;

/// An applied step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub next_state: GameState,
    pub event: Event,
    pub state_hash: String,
}

/// Plain-data result of a step, `{ok, next_state?, event?, error?, state_hash?}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_state: Option<GameState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_hash: Option<String>,
}

impl From<Result<Transition, StepError>> for StepOutput {
    fn from(result: Result<Transition, StepError>) -> Self {
        match result {
            Ok(t) => Self {
                ok: true,
                next_state: Some(t.next_state),
                event: Some(t.event),
                error: None,
                state_hash: Some(t.state_hash),
            },
            Err(err) => Self {
                ok: false,
                next_state: None,
                event: None,
                error: Some(err.report()),
                state_hash: None,
            },
        }
    }
}

/// Apply one action to a state.
pub fn step(spec: &CompiledSpec, state: &GameState, action: &StepAction) -> Result<Transition, StepError> {
    let result = apply(spec, state, action);
    match &result {
        Ok(t) => debug!(
            action = %action.id,
            by = %action.by,
            seq = action.seq,
            state_hash = %t.state_hash,
            "step applied"
        ),
        Err(err) if err.severity().is_internal() => error!(
            action = %action.id,
            by = %action.by,
            seq = action.seq,
            code = err.code(),
            error = %err,
            "step failed on a defect"
        ),
        Err(StepError::InvariantFailed(violations)) => warn!(
            action = %action.id,
            seq = action.seq,
            violations = violations.len(),
            "step rejected by invariants"
        ),
        Err(err) => debug!(action = %action.id, by = %action.by, code = err.code(), "step rejected"),
    }
    result
}

fn apply(spec: &CompiledSpec, state: &GameState, action: &StepAction) -> Result<Transition, StepError> {
    let last_seq = state.meta.last_seq;
    if action.seq != last_seq + 1 {
        return Err(StepError::DuplicateSeq {
            last_seq,
            got: action.seq,
        });
    }
    if action.by != SYSTEM_SEAT && state.active_seat.as_deref() != Some(action.by.as_str()) {
        return Err(StepError::IllegalAction {
            expected: state.active_seat.clone(),
            actual: action.by.clone(),
        });
    }

    let payload = &action.payload;
    let mut next = state.clone();
    let mut resolver = EffectResolver::new(ResolverContext::new(spec, Some(action.by.as_str()), payload));

    match spec.action(&action.id) {
        Some(def) => {
            validate_payload(&def.input_spec, payload).map_err(StepError::BadPayload)?;
            let ctx = EvalContext::new(state, Some(action.by.as_str()), payload);
            let evaluator = spec.eval_limits.evaluator();
            if !evaluator.eval_condition(Some(&def.require_ast), &ctx)? {
                return Err(StepError::RequireFailed(action.id.clone()));
            }
            resolver.run(&mut next, &def.effect_pipeline)?;
        }
        None if action.id == END_TURN => {
            if !payload.is_empty() {
                return Err(StepError::BadPayload(vec![FieldError {
                    path: String::new(),
                    message: "end_turn takes no payload".to_string(),
                }]));
            }
            advance_turn(&mut next);
        }
        None => return Err(StepError::UnknownAction(action.id.clone())),
    }

    TriggerRegistry::new(spec).fire_after(&action.id, &mut resolver, &mut next)?;
    next.meta.last_seq = action.seq;

    let violations = invariants::check(&next);
    if !violations.is_empty() {
        return Err(StepError::InvariantFailed(violations));
    }

    let state_hash = next.hash()?;
    Ok(Transition {
        next_state: next,
        event: Event::for_step(action),
        state_hash,
    })
}

/// Pass the turn to the next seat.
///
/// Wrapping back to the first seat increments `turn` and `vars.turn`.
pub fn advance_turn(state: &mut GameState) {
    if state.seats.is_empty() {
        return;
    }
    let current = state
        .active_seat
        .as_deref()
        .and_then(|seat| state.seat_index(seat))
        .unwrap_or(0);
    let next = (current + 1) % state.seats.len();
    if next == 0 {
        state.turn += 1;
        state.vars.insert("turn".to_string(), state.turn.into());
    }
    state.active_seat = state.seats.get(next).cloned();
}
