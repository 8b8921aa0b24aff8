//! Effect resolution: executing effect ops on a working state.
//!
//! The `EffectResolver` folds a pipeline over a `&mut GameState` that the
//! caller owns (a cheap clone of the state it was handed). Each op observes
//! the result of the previous one. On error the caller discards the copy.

use im::OrdMap;
use serde_json::Value;
use tracing::trace;

use super::effect::{CellRef, EffectOp};
use crate::compiler::spec::CompiledSpec;
use crate::core::action::Payload;
use crate::core::error::ExecError;
use crate::core::owner::{instance_key_for, OwnerToken, Owners};
use crate::core::rng::GameRng;
use crate::core::state::{EntityRecord, GameState};
use crate::core::{EntityId, SeatId};
use crate::expr::{EvalContext, Evaluator};
use crate::zones::{CellPos, ZoneManager};

/// Who is acting and with what payload.
#[derive(Clone, Copy, Debug)]
pub struct ResolverContext<'a> {
    pub spec: &'a CompiledSpec,
    /// Acting seat, or the system identity during setup.
    pub by: Option<&'a str>,
    pub payload: &'a Payload,
}

impl<'a> ResolverContext<'a> {
    pub fn new(spec: &'a CompiledSpec, by: Option<&'a str>, payload: &'a Payload) -> Self {
        Self { spec, by, payload }
    }
}

/// Executes effect ops.
///
/// One resolver serves one step: the RNG budget counts shuffles across the
/// main pipeline and its triggers together.
pub struct EffectResolver<'a> {
    ctx: ResolverContext<'a>,
    evaluator: Evaluator,
    rng_calls: u32,
    rng_budget: Option<u32>,
}

impl<'a> EffectResolver<'a> {
    pub fn new(ctx: ResolverContext<'a>) -> Self {
        Self {
            evaluator: ctx.spec.eval_limits.evaluator(),
            rng_budget: Some(ctx.spec.eval_limits.max_rng_calls_per_reduce),
            ctx,
            rng_calls: 0,
        }
    }

    /// Lift the per-step shuffle budget (setup plans).
    #[must_use]
    pub fn without_rng_budget(mut self) -> Self {
        self.rng_budget = None;
        self
    }

    /// Shuffles performed so far.
    #[must_use]
    pub fn rng_calls(&self) -> u32 {
        self.rng_calls
    }

    /// Run a pipeline in order.
    pub fn run(&mut self, state: &mut GameState, pipeline: &[EffectOp]) -> Result<(), ExecError> {
        for op in pipeline {
            self.apply(state, op)?;
        }
        Ok(())
    }

    /// Apply a single op.
    pub fn apply(&mut self, state: &mut GameState, op: &EffectOp) -> Result<(), ExecError> {
        trace!(op = op.name(), by = self.ctx.by, "applying effect");
        match op {
            EffectOp::MoveTop {
                from_zone,
                to_zone,
                from_owner,
                to_owner,
                count,
            }
            | EffectOp::Deal {
                from_zone,
                to_zone,
                from_owner,
                to_owner,
                count,
            } => {
                let count = self.count(*count)?;
                let pairs = self.pairs(state, (from_zone.as_str(), from_owner), (to_zone.as_str(), to_owner))?;
                for (from_key, to_key) in pairs {
                    ZoneManager::new(state).move_top(
                        (from_zone.as_str(), from_key.as_str()),
                        (to_zone.as_str(), to_key.as_str()),
                        count,
                    )?;
                }
                Ok(())
            }

            EffectOp::MoveId {
                from_zone,
                to_zone,
                from_owner,
                to_owner,
                entity_id,
            } => {
                let entity = self.entity_ref(entity_id, state)?;
                let from_key = self.key(state, from_zone, from_owner)?;
                let to_key = self.key(state, to_zone, to_owner)?;
                let target_kind = state.instance(to_zone, &to_key)?.kind();
                if !target_kind.is_ordered() {
                    return Err(ExecError::KindMismatch {
                        zone: to_zone.clone(),
                        kind: target_kind.to_string(),
                        op: "move_id",
                    });
                }
                let mut zones = ZoneManager::new(state);
                let moved = zones.remove(from_zone, &from_key, &entity)?;
                zones.push(to_zone, &to_key, vec![moved])
            }

            EffectOp::Shuffle { zone, owner } => {
                let mut rng = GameRng::from_state_str(&state.rng_state)?;
                for key in self.keys(state, zone, owner)? {
                    self.spend_rng()?;
                    ZoneManager::new(state).shuffle(zone, &key, &mut rng)?;
                }
                state.rng_state = rng.state_string();
                Ok(())
            }

            EffectOp::Spawn {
                entity,
                to_zone,
                owner,
                count,
                pos,
                props,
            } => {
                let def = self
                    .ctx
                    .spec
                    .entities_index
                    .get(entity)
                    .ok_or_else(|| ExecError::UnknownEntity(entity.clone()))?;
                let mut bag: OrdMap<String, Value> =
                    def.props.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                for (k, v) in props {
                    bag.insert(k.clone(), v.clone());
                }
                let count = self.count(*count)?;

                for key in self.keys(state, to_zone, owner)? {
                    match pos {
                        Some(cell) => {
                            let at = self.cell(cell, state)?;
                            let id = mint(state, entity, bag.clone());
                            ZoneManager::new(state).place(to_zone, &key, at, id)?;
                        }
                        None => {
                            let ids: Vec<EntityId> = (0..count).map(|_| mint(state, entity, bag.clone())).collect();
                            ZoneManager::new(state).push(to_zone, &key, ids)?;
                        }
                    }
                }
                Ok(())
            }

            EffectOp::Destroy { from_zone, owner, count } => {
                let count = self.count(*count)?;
                for key in self.keys(state, from_zone, owner)? {
                    let removed = ZoneManager::new(state).pop_top(from_zone, &key, count)?;
                    for id in removed {
                        state.entities.remove(&id);
                    }
                }
                Ok(())
            }

            EffectOp::MovePiece { zone, owner, from, to } => {
                let key = self.key(state, zone, owner)?;
                let from = self.cell(from, state)?;
                let to = self.cell(to, state)?;
                ZoneManager::new(state).relocate(zone, &key, from, to)
            }

            EffectOp::SetVar { key, value } => {
                state.vars.insert(key.clone(), value.clone());
                Ok(())
            }

            EffectOp::SetPhase { phase } => {
                state.phase = phase.clone();
                Ok(())
            }
        }
    }

    // === Helpers ===

    /// The op's count, or a positive integer `payload.count` when present.
    fn count(&self, declared: u32) -> Result<usize, ExecError> {
        let count = self
            .ctx
            .payload
            .get("count")
            .and_then(Value::as_u64)
            .filter(|n| *n > 0)
            .unwrap_or(u64::from(declared));
        if count == 0 {
            return Err(ExecError::InvalidCount(count.to_string()));
        }
        usize::try_from(count).map_err(|_| ExecError::InvalidCount(count.to_string()))
    }

    fn spend_rng(&mut self) -> Result<(), ExecError> {
        if let Some(limit) = self.rng_budget {
            if self.rng_calls >= limit {
                return Err(ExecError::RngBudgetExceeded { limit });
            }
        }
        self.rng_calls += 1;
        Ok(())
    }

    /// Single instance key for a token.
    fn key(&self, state: &GameState, zone: &str, token: &OwnerToken) -> Result<SeatId, ExecError> {
        let scope = state.zone(zone)?.scope;
        token.instance_key(scope, self.ctx.by, state)
    }

    /// Instance keys for a token, iterating seats for `seat`.
    fn keys(&self, state: &GameState, zone: &str, token: &OwnerToken) -> Result<Owners, ExecError> {
        let scope = state.zone(zone)?.scope;
        Ok(token
            .expand(self.ctx.by, state)?
            .iter()
            .map(|seat| instance_key_for(scope, seat))
            .collect())
    }

    /// Source/target key pairs; once per seat when either side is `seat`.
    fn pairs(
        &self,
        state: &GameState,
        (from_zone, from): (&str, &OwnerToken),
        (to_zone, to): (&str, &OwnerToken),
    ) -> Result<Vec<(SeatId, SeatId)>, ExecError> {
        if !from.is_each_seat() && !to.is_each_seat() {
            return Ok(vec![(self.key(state, from_zone, from)?, self.key(state, to_zone, to)?)]);
        }
        let from_scope = state.zone(from_zone)?.scope;
        let to_scope = state.zone(to_zone)?.scope;
        state
            .seats
            .iter()
            .map(|seat| {
                let from_key = if from.is_each_seat() {
                    instance_key_for(from_scope, seat)
                } else {
                    self.key(state, from_zone, from)?
                };
                let to_key = if to.is_each_seat() {
                    instance_key_for(to_scope, seat)
                } else {
                    self.key(state, to_zone, to)?
                };
                Ok((from_key, to_key))
            })
            .collect()
    }

    fn eval(&self, ast: &Value, state: &GameState) -> Result<Value, ExecError> {
        let ctx = EvalContext::new(state, self.ctx.by, self.ctx.payload);
        Ok(self.evaluator.eval_value(ast, &ctx)?)
    }

    fn entity_ref(&self, ast: &Value, state: &GameState) -> Result<EntityId, ExecError> {
        match self.eval(ast, state)? {
            Value::String(id) if !id.is_empty() => Ok(id),
            other => Err(ExecError::BadEntityRef(other.to_string())),
        }
    }

    fn cell(&self, cell: &CellRef, state: &GameState) -> Result<CellPos, ExecError> {
        let coord = |ast: &Value| -> Result<i64, ExecError> {
            let value = self.eval(ast, state)?;
            value
                .as_i64()
                .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .ok_or_else(|| ExecError::BadCoordinate(value.to_string()))
        };
        Ok(CellPos::new(coord(&cell.x)?, coord(&cell.y)?))
    }
}

/// Mint a new entity id and record.
fn mint(state: &mut GameState, entity: &str, props: OrdMap<String, Value>) -> EntityId {
    let id = format!("e{}", state.meta.next_eid);
    state.meta.next_eid += 1;
    state
        .entities
        .insert(id.clone(), EntityRecord::new(entity).with_props(props));
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::engine::{init, InitInput};
    use serde_json::json;

    fn spec() -> CompiledSpec {
        let output = compile(&json!({
            "schema_version": 1,
            "engine_compat": ">=1.0",
            "id": "resolver",
            "name": "Resolver",
            "metadata": {"seats": {"min": 2, "max": 4}},
            "entities": [
                {"id": "card", "type": "card", "props": {"power": 1}},
                {"id": "pawn", "type": "piece"}
            ],
            "zones": [
                {"id": "deck", "kind": "stack", "scope": "public", "visibility": "none"},
                {"id": "hand", "kind": "list", "scope": "per_seat", "visibility": "owner", "capacity": 3},
                {"id": "board", "kind": "grid", "scope": "public", "visibility": "all", "size": {"width": 3, "height": 3}}
            ],
            "phases": [{"id": "main"}],
            "actions": [],
            "victory": {"order": []}
        }));
        output.compiled_spec.unwrap()
    }

    fn fresh(spec: &CompiledSpec) -> GameState {
        init(spec, &InitInput::new(["A", "B"], 42)).unwrap().game_state
    }

    fn payload() -> Payload {
        Payload::new()
    }

    #[test]
    fn test_spawn_mints_sequential_ids() {
        let spec = spec();
        let mut state = fresh(&spec);
        let empty = payload();
        let mut resolver = EffectResolver::new(ResolverContext::new(&spec, Some("A"), &empty));
        let mut spawn = EffectOp::spawn("card", "deck", 3);
        if let EffectOp::Spawn { props, .. } = &mut spawn {
            props.insert("power".into(), json!(5));
        }
        resolver.apply(&mut state, &spawn).unwrap();

        assert_eq!(
            state.items("deck", "_").unwrap().iter().cloned().collect::<Vec<_>>(),
            vec!["e1", "e2", "e3"]
        );
        assert_eq!(state.meta.next_eid, 4);
        let record = &state.entities["e2"];
        assert_eq!(record.entity_type, "card");
        assert_eq!(record.props["power"], json!(5));
    }

    #[test]
    fn test_deal_iterates_seats() {
        let spec = spec();
        let mut state = fresh(&spec);
        state.set_items("deck", "_", ["c1", "c2", "c3", "c4"]).unwrap();
        let empty = payload();
        let mut resolver = EffectResolver::new(ResolverContext::new(&spec, Some("A"), &empty));
        resolver.apply(&mut state, &EffectOp::deal("deck", "hand", 2)).unwrap();

        let hand = |seat: &str| state.items("hand", seat).unwrap().iter().cloned().collect::<Vec<_>>();
        assert_eq!(hand("A"), vec!["c4", "c3"]);
        assert_eq!(hand("B"), vec!["c2", "c1"]);
        assert!(state.items("deck", "_").unwrap().is_empty());
    }

    #[test]
    fn test_payload_count_overrides() {
        let spec = spec();
        let mut state = fresh(&spec);
        state.set_items("deck", "_", ["c1", "c2", "c3"]).unwrap();
        let mut with_count = payload();
        with_count.insert("count".into(), json!(2));
        let mut resolver = EffectResolver::new(ResolverContext::new(&spec, Some("A"), &with_count));
        resolver.apply(&mut state, &EffectOp::move_top("deck", "hand", 1)).unwrap();
        assert_eq!(state.items("hand", "A").unwrap().len(), 2);
    }

    #[test]
    fn test_shuffle_budget() {
        let spec = spec();
        let mut state = fresh(&spec);
        state.set_items("deck", "_", ["c1", "c2", "c3"]).unwrap();
        let empty = payload();
        let mut resolver = EffectResolver::new(ResolverContext::new(&spec, Some("A"), &empty));
        let shuffles = vec![EffectOp::shuffle("deck"); 9];
        let err = resolver.run(&mut state, &shuffles).unwrap_err();
        assert_eq!(err, ExecError::RngBudgetExceeded { limit: 8 });
        assert_eq!(resolver.rng_calls(), 8);
    }

    #[test]
    fn test_shuffle_advances_rng_state() {
        let spec = spec();
        let mut state = fresh(&spec);
        state.set_items("deck", "_", ["c1", "c2", "c3", "c4", "c5"]).unwrap();
        let before = state.rng_state.clone();
        let empty = payload();
        EffectResolver::new(ResolverContext::new(&spec, Some("A"), &empty))
            .apply(&mut state, &EffectOp::shuffle("deck"))
            .unwrap();
        assert_ne!(state.rng_state, before);
        assert_eq!(state.items("deck", "_").unwrap().len(), 5);
    }

    #[test]
    fn test_move_id_from_payload() {
        let spec = spec();
        let mut state = fresh(&spec);
        state.set_items("hand", "A", ["c1", "c2"]).unwrap();
        let mut call = payload();
        call.insert("card".into(), json!("c1"));
        let op = EffectOp::MoveId {
            from_zone: "hand".into(),
            to_zone: "deck".into(),
            from_owner: OwnerToken::By,
            to_owner: OwnerToken::By,
            entity_id: json!({"var": "payload.card"}),
        };
        EffectResolver::new(ResolverContext::new(&spec, Some("A"), &call))
            .apply(&mut state, &op)
            .unwrap();
        assert_eq!(state.items("hand", "A").unwrap().iter().cloned().collect::<Vec<_>>(), vec!["c2"]);
        assert_eq!(state.items("deck", "_").unwrap().iter().cloned().collect::<Vec<_>>(), vec!["c1"]);
    }

    #[test]
    fn test_board_spawn_and_move_piece() {
        let spec = spec();
        let mut state = fresh(&spec);
        let mut call = payload();
        call.insert("x".into(), json!(2));
        let mut resolver = EffectResolver::new(ResolverContext::new(&spec, Some("A"), &call));
        let spawn = EffectOp::Spawn {
            entity: "pawn".into(),
            to_zone: "board".into(),
            owner: OwnerToken::By,
            count: 1,
            pos: Some(CellRef {
                x: json!({"var": "payload.x"}),
                y: json!(0),
            }),
            props: serde_json::Map::new(),
        };
        resolver.apply(&mut state, &spawn).unwrap();
        assert!(matches!(
            resolver.apply(&mut state, &spawn),
            Err(ExecError::CellOccupied { x: 2, y: 0, .. })
        ));

        let step = EffectOp::MovePiece {
            zone: "board".into(),
            owner: OwnerToken::By,
            from: CellRef::at(2, 0),
            to: CellRef::at(1, 1),
        };
        resolver.apply(&mut state, &step).unwrap();
        let cells = state.instance("board", "_").unwrap().cells().unwrap();
        assert_eq!(cells[1][1].as_deref(), Some("e1"));
        assert_eq!(cells[0][2], None);
    }

    #[test]
    fn test_destroy_removes_records() {
        let spec = spec();
        let mut state = fresh(&spec);
        let empty = payload();
        let mut resolver = EffectResolver::new(ResolverContext::new(&spec, Some("A"), &empty));
        resolver.apply(&mut state, &EffectOp::spawn("card", "deck", 2)).unwrap();
        let destroy = EffectOp::Destroy {
            from_zone: "deck".into(),
            owner: OwnerToken::By,
            count: 1,
        };
        resolver.apply(&mut state, &destroy).unwrap();
        assert!(!state.entities.contains_key("e2"));
        assert!(state.entities.contains_key("e1"));
        assert_eq!(state.zone_population(), 1);
    }

    #[test]
    fn test_unresolved_owner_is_defect() {
        let spec = spec();
        let mut state = fresh(&spec);
        let empty = payload();
        let err = EffectResolver::new(ResolverContext::new(&spec, None, &empty))
            .apply(&mut state, &EffectOp::move_top("hand", "hand", 1))
            .unwrap_err();
        assert!(err.severity().is_internal());
    }
}
