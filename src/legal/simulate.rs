//! Resource-aware count bounds for [`EnumerationMode::Simulate`].
//!
//! The first op of a pipeline that moves, creates or deletes a quantity of
//! entities decides how many `count` variants an action offers. Its bound
//! is read off the current state without running anything:
//!
//! - `move_top`/`deal`: source length and destination room, divided by how
//!   many pairs share each instance
//! - `spawn`: destination room, or 1 when unbounded
//! - `destroy`: source length
//!
//! [`EnumerationMode::Simulate`]: super::EnumerationMode::Simulate

use std::collections::BTreeMap;

use crate::core::owner::{instance_key_for, OwnerToken};
use crate::core::state::GameState;
use crate::core::SeatId;
use crate::effects::{EffectOp, Pipeline};

/// Instance address `(zone, owner key)`.
type Slot<'a> = (&'a str, SeatId);

/// The resource op that bounds `count`, if the pipeline has one.
#[must_use]
pub fn resource_op(pipeline: &Pipeline) -> Option<&EffectOp> {
    pipeline.iter().find(|op| op.count().is_some())
}

/// Largest `count` the op can run with against `state`.
///
/// Unresolvable owners, missing zones and same-instance moves bound it to 0.
#[must_use]
pub fn max_count(op: &EffectOp, state: &GameState, by: &str) -> usize {
    bound(op, state, by).unwrap_or(0)
}

fn bound(op: &EffectOp, state: &GameState, by: &str) -> Option<usize> {
    match op {
        EffectOp::MoveTop {
            from_zone,
            to_zone,
            from_owner,
            to_owner,
            ..
        }
        | EffectOp::Deal {
            from_zone,
            to_zone,
            from_owner,
            to_owner,
            ..
        } => {
            let pairs = pairs(state, by, (from_zone.as_str(), from_owner), (to_zone.as_str(), to_owner))?;
            if pairs.iter().any(|(from, to)| from == to) {
                return Some(0);
            }
            let mut sources: BTreeMap<Slot<'_>, usize> = BTreeMap::new();
            let mut targets: BTreeMap<Slot<'_>, usize> = BTreeMap::new();
            for (from, to) in pairs {
                *sources.entry(from).or_default() += 1;
                *targets.entry(to).or_default() += 1;
            }
            let mut max = usize::MAX;
            for ((zone, key), uses) in &sources {
                max = max.min(held(state, zone, key)? / uses);
            }
            for ((zone, key), uses) in &targets {
                if let Some(room) = room(state, zone, key)? {
                    max = max.min(room / uses);
                }
            }
            Some(max)
        }

        EffectOp::Spawn { to_zone, owner, pos, .. } => {
            let mut max = if pos.is_some() { 1 } else { usize::MAX };
            let mut bounded = false;
            for key in keys(state, by, to_zone, owner)? {
                if let Some(room) = room(state, to_zone, &key)? {
                    max = max.min(room);
                    bounded = true;
                }
            }
            Some(if bounded { max } else { 1 })
        }

        EffectOp::Destroy { from_zone, owner, .. } => {
            let mut max = usize::MAX;
            for key in keys(state, by, from_zone, owner)? {
                max = max.min(held(state, from_zone, &key)?);
            }
            Some(if max == usize::MAX { 0 } else { max })
        }

        _ => None,
    }
}

fn held(state: &GameState, zone: &str, key: &str) -> Option<usize> {
    state.instance(zone, key).ok().map(|instance| instance.len())
}

/// Free slots of an instance. `None` is unbounded.
fn room(state: &GameState, zone: &str, key: &str) -> Option<Option<usize>> {
    let runtime = state.zone(zone).ok()?;
    let held = runtime.instance(zone, key).ok()?.len();
    let limit = runtime
        .capacity
        .or_else(|| runtime.size.map(|size| size.width * size.height));
    Some(limit.map(|limit| limit.saturating_sub(held)))
}

fn keys(state: &GameState, by: &str, zone: &str, token: &OwnerToken) -> Option<Vec<SeatId>> {
    let scope = state.zone(zone).ok()?.scope;
    let mut keys: Vec<SeatId> = token
        .expand(Some(by), state)
        .ok()?
        .iter()
        .map(|seat| instance_key_for(scope, seat))
        .collect();
    keys.dedup();
    Some(keys)
}

/// Source/target pairs, once per seat when either side is `seat`.
fn pairs<'a>(
    state: &GameState,
    by: &str,
    (from_zone, from): (&'a str, &OwnerToken),
    (to_zone, to): (&'a str, &OwnerToken),
) -> Option<Vec<(Slot<'a>, Slot<'a>)>> {
    let from_scope = state.zone(from_zone).ok()?.scope;
    let to_scope = state.zone(to_zone).ok()?.scope;
    let single = |token: &OwnerToken, scope| token.instance_key(scope, Some(by), state).ok();

    if !from.is_each_seat() && !to.is_each_seat() {
        return Some(vec![(
            (from_zone, single(from, from_scope)?),
            (to_zone, single(to, to_scope)?),
        )]);
    }
    state
        .seats
        .iter()
        .map(|seat| {
            let from_key = if from.is_each_seat() {
                instance_key_for(from_scope, seat)
            } else {
                single(from, from_scope)?
            };
            let to_key = if to.is_each_seat() {
                instance_key_for(to_scope, seat)
            } else {
                single(to, to_scope)?
            };
            Some(((from_zone, from_key), (to_zone, to_key)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::compiler::spec::CompiledSpec;
    use crate::engine::{init, InitInput};
    use serde_json::json;

    fn spec() -> CompiledSpec {
        compile(&json!({
            "schema_version": 1,
            "engine_compat": ">=1.0",
            "id": "sim",
            "name": "Sim",
            "metadata": {"seats": {"min": 2, "max": 2}},
            "entities": [{"id": "coin"}],
            "zones": [
                {"id": "pile", "kind": "stack", "scope": "public", "visibility": "all"},
                {"id": "hand", "kind": "list", "scope": "per_seat", "visibility": "owner", "capacity": 3},
                {"id": "bank", "kind": "list", "scope": "public", "visibility": "all"}
            ],
            "phases": [{"id": "main"}],
            "actions": [],
            "victory": {"order": []}
        }))
        .compiled_spec
        .unwrap()
    }

    fn state(spec: &CompiledSpec) -> GameState {
        let mut state = init(spec, &InitInput::new(["A", "B"], 1)).unwrap().game_state;
        state.set_items("pile", "_", ["p1", "p2", "p3", "p4", "p5"]).unwrap();
        state.set_items("hand", "A", ["h1"]).unwrap();
        state
    }

    #[test]
    fn test_move_bounded_by_room() {
        let spec = spec();
        let state = state(&spec);
        let op = EffectOp::move_top("pile", "hand", 1);
        assert_eq!(max_count(&op, &state, "A"), 2);
        assert_eq!(max_count(&op, &state, "B"), 3);
    }

    #[test]
    fn test_deal_shares_source() {
        let spec = spec();
        let state = state(&spec);
        let op = EffectOp::deal("pile", "hand", 1);
        assert_eq!(max_count(&op, &state, "A"), 2);
    }

    #[test]
    fn test_spawn_and_destroy() {
        let spec = spec();
        let state = state(&spec);
        assert_eq!(max_count(&EffectOp::spawn("coin", "bank", 1), &state, "A"), 1);
        assert_eq!(max_count(&EffectOp::spawn("coin", "hand", 1), &state, "A"), 2);
        let destroy = EffectOp::Destroy {
            from_zone: "pile".into(),
            owner: OwnerToken::By,
            count: 1,
        };
        assert_eq!(max_count(&destroy, &state, "A"), 5);
    }

    #[test]
    fn test_same_instance_and_missing_zone() {
        let spec = spec();
        let state = state(&spec);
        assert_eq!(max_count(&EffectOp::move_top("pile", "pile", 1), &state, "A"), 0);
        assert_eq!(max_count(&EffectOp::move_top("void", "hand", 1), &state, "A"), 0);
    }

    #[test]
    fn test_resource_op_skips_plain_ops() {
        let pipeline = vec![EffectOp::set_var("x", json!(1)), EffectOp::move_top("pile", "hand", 1)];
        assert_eq!(resource_op(&pipeline).map(EffectOp::name), Some("move_top"));
        assert!(resource_op(&vec![EffectOp::shuffle("pile")]).is_none());
    }
}
