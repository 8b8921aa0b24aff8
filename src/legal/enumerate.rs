//! Legal-action enumeration.
//!
//! ## Order
//!
//! Actions are visited in definition order. Within an action, payloads are
//! produced by a depth-first walk over the `input_enum` fields in declared
//! order, the first field varying slowest. Caps cut from the tail of this
//! order.
//!
//! ## Acceptance
//!
//! A candidate is kept when its payload fits the declared input shape and
//! the action's `require` holds. Nothing is executed; the state is only read.

use serde_json::Value;
use tracing::debug;

use super::options::{EnumerateOptions, EnumerationMode};
use super::simulate;
use crate::compiler::spec::{ActionDef, CompiledSpec, InputEnum};
use crate::compiler::END_TURN;
use crate::core::action::{ActionCall, Payload};
use crate::core::error::EvalError;
use crate::core::owner::instance_key_for;
use crate::core::state::GameState;
use crate::core::SYSTEM_SEAT;
use crate::engine::validate_payload;
use crate::expr::{EvalContext, Evaluator};

/// List the calls `by` can make in `state`.
///
/// Only the active seat and `system` have legal actions; any other seat
/// gets an empty list.
///
/// # Example
///
/// ```
/// use rulekit::compiler::compile;
/// use rulekit::engine::{init, InitInput};
/// use rulekit::legal::{legal_actions, EnumerateOptions};
/// use serde_json::json;
///
/// let spec = compile(&json!({
///     "schema_version": 1,
///     "engine_compat": ">=1.0",
///     "id": "coin",
///     "name": "Coin",
///     "metadata": {"seats": {"min": 2, "max": 2}},
///     "phases": [{"id": "main"}],
///     "actions": [{
///         "id": "call",
///         "input": {"type": "object", "properties": {"side": {"enum": ["heads", "tails"]}}},
///         "effect": [{"op": "set_var", "key": "called", "value": {"var": "payload.side"}}]
///     }],
///     "victory": {"order": []}
/// }))
/// .compiled_spec
/// .unwrap();
/// let state = init(&spec, &InitInput::new(["A", "B"], 1)).unwrap().game_state;
///
/// let calls = legal_actions(&spec, &state, "A", &EnumerateOptions::default()).unwrap();
/// let names: Vec<_> = calls.iter().map(|c| c.action.as_str()).collect();
/// assert_eq!(names, ["call", "call", "end_turn"]);
/// assert_eq!(calls[0].payload["side"], "heads");
/// ```
pub fn legal_actions(
    spec: &CompiledSpec,
    state: &GameState,
    by: &str,
    options: &EnumerateOptions,
) -> Result<Vec<ActionCall>, EvalError> {
    let mut enumerator = Enumerator {
        spec,
        state,
        by,
        options,
        evaluator: spec.eval_limits.evaluator(),
        calls: Vec::new(),
    };

    if by == SYSTEM_SEAT || state.active_seat.as_deref() == Some(by) {
        for (id, def) in spec.actions() {
            if enumerator.full() {
                break;
            }
            if def.enumerable() {
                enumerator.action(id, def)?;
            }
        }
        if spec.action(END_TURN).is_none() && !enumerator.full() {
            enumerator.calls.push(ActionCall::new(END_TURN, by));
        }
    }

    debug!(by, mode = ?options.mode, candidates = enumerator.calls.len(), "legal actions enumerated");
    Ok(enumerator.calls)
}

struct Enumerator<'a> {
    spec: &'a CompiledSpec,
    state: &'a GameState,
    by: &'a str,
    options: &'a EnumerateOptions,
    evaluator: Evaluator,
    calls: Vec<ActionCall>,
}

impl Enumerator<'_> {
    fn full(&self) -> bool {
        self.options.caps.total.is_some_and(|cap| self.calls.len() >= cap)
    }

    fn action(&mut self, id: &str, def: &ActionDef) -> Result<(), EvalError> {
        let mut kept = 0;
        match &def.input_enum {
            Some(fields) => {
                if !required_covered(def, |name| fields.iter().any(|f| f.field == name)) {
                    return Ok(());
                }
                let mut domains = Vec::with_capacity(fields.len());
                for input in fields {
                    let values = self.candidates(&input.source);
                    if values.is_empty() {
                        return Ok(());
                    }
                    domains.push((input.field.as_str(), values));
                }
                self.expand(id, def, &domains, &mut Payload::new(), &mut kept)
            }
            None if self.options.mode == EnumerationMode::Simulate => {
                match simulate::resource_op(&def.effect_pipeline) {
                    Some(op) => {
                        for count in 1..=simulate::max_count(op, self.state, self.by) {
                            let mut payload = Payload::new();
                            payload.insert("count".to_string(), count.into());
                            if !self.offer(id, def, payload, &mut kept)? {
                                break;
                            }
                        }
                        Ok(())
                    }
                    None => self.offer(id, def, Payload::new(), &mut kept).map(drop),
                }
            }
            None => {
                if required_covered(def, |_| false) {
                    self.offer(id, def, Payload::new(), &mut kept)?;
                }
                Ok(())
            }
        }
    }

    /// Walk the cartesian product of `domains`, offering each full payload.
    fn expand(
        &mut self,
        id: &str,
        def: &ActionDef,
        domains: &[(&str, Vec<Value>)],
        payload: &mut Payload,
        kept: &mut usize,
    ) -> Result<(), EvalError> {
        let Some(((name, values), rest)) = domains.split_first() else {
            self.offer(id, def, payload.clone(), kept)?;
            return Ok(());
        };
        for value in values {
            if self.action_full(*kept) || self.full() {
                break;
            }
            payload.insert((*name).to_string(), value.clone());
            self.expand(id, def, rest, payload, kept)?;
        }
        payload.remove(*name);
        Ok(())
    }

    /// Keep the candidate if it is acceptable. Returns whether more may follow.
    fn offer(&mut self, id: &str, def: &ActionDef, payload: Payload, kept: &mut usize) -> Result<bool, EvalError> {
        if self.action_full(*kept) || self.full() {
            return Ok(false);
        }
        if validate_payload(&def.input_spec, &payload).is_err() {
            return Ok(true);
        }
        let ctx = EvalContext::new(self.state, Some(self.by), &payload);
        if !self.evaluator.eval_condition(Some(&def.require_ast), &ctx)? {
            return Ok(true);
        }
        self.calls.push(ActionCall {
            action: id.to_string(),
            by: self.by.to_string(),
            payload,
        });
        *kept += 1;
        Ok(!self.action_full(*kept) && !self.full())
    }

    fn action_full(&self, kept: usize) -> bool {
        self.options.caps.per_action.is_some_and(|cap| kept >= cap)
    }

    /// Candidate values of one field: a fixed list, or the live items of a zone.
    fn candidates(&self, source: &InputEnum) -> Vec<Value> {
        match source {
            InputEnum::Values { values } => values.clone(),
            InputEnum::Zone { zone, owner } => {
                let Some(meta) = self.spec.zones_index.get(zone) else {
                    return Vec::new();
                };
                let Ok(seats) = owner.clone().unwrap_or_default().expand(Some(self.by), self.state) else {
                    return Vec::new();
                };
                let mut keys: Vec<_> = seats.iter().map(|seat| instance_key_for(meta.scope, seat)).collect();
                keys.dedup();
                keys.iter()
                    .filter_map(|key| self.state.instance(zone, key).ok())
                    .flat_map(|instance| instance.occupants())
                    .map(|(_, id)| Value::String(id.clone()))
                    .collect()
            }
        }
    }
}

/// Whether every `required` field of the input shape passes `covered`.
fn required_covered(def: &ActionDef, covered: impl Fn(&str) -> bool) -> bool {
    def.input_spec
        .get("required")
        .and_then(Value::as_array)
        .map_or(true, |required| required.iter().filter_map(Value::as_str).all(covered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::core::action::StepAction;
    use crate::engine::{init, step, InitInput};
    use serde_json::json;

    fn spec(actions: Value) -> CompiledSpec {
        compile(&json!({
            "schema_version": 1,
            "engine_compat": ">=1.0",
            "id": "legal",
            "name": "Legal",
            "metadata": {"seats": {"min": 2, "max": 2}},
            "entities": [{"id": "card"}],
            "zones": [
                {"id": "deck", "kind": "stack", "scope": "per_seat", "visibility": "owner"},
                {"id": "hand", "kind": "list", "scope": "per_seat", "visibility": "owner", "capacity": 3},
                {"id": "table", "kind": "list", "scope": "public", "visibility": "all"}
            ],
            "state": {"vars": {"open": true}},
            "phases": [{"id": "main"}],
            "actions": actions,
            "victory": {"order": []}
        }))
        .compiled_spec
        .unwrap()
    }

    fn state(spec: &CompiledSpec) -> GameState {
        let mut state = init(spec, &InitInput::new(["A", "B"], 3)).unwrap().game_state;
        state.set_items("deck", "A", ["c1", "c2", "c3"]).unwrap();
        state.set_items("hand", "A", ["h1", "h2"]).unwrap();
        state
    }

    fn names(calls: &[ActionCall]) -> Vec<&str> {
        calls.iter().map(|c| c.action.as_str()).collect()
    }

    fn play_spec() -> CompiledSpec {
        spec(json!([
            {"id": "draw", "effect": [{"op": "move_top", "from_zone": "deck", "to_zone": "hand"}]},
            {
                "id": "play",
                "input": {"type": "object", "properties": {"card": {"type": "string"}}, "required": ["card"]},
                "require": {"op": "!=", "args": [{"var": "payload.card"}, "h2"]},
                "effect": [{"op": "move_id", "from_zone": "hand", "to_zone": "table", "entity_id": {"var": "payload.card"}}]
            },
            {"id": "pass", "require": {"var": "state.vars.closed"}}
        ]))
    }

    #[test]
    fn test_zone_candidates_filtered_by_require() {
        let spec = play_spec();
        let state = state(&spec);
        let calls = legal_actions(&spec, &state, "A", &EnumerateOptions::default()).unwrap();
        assert_eq!(names(&calls), ["draw", "play", "end_turn"]);
        assert_eq!(calls[1].payload["card"], json!("h1"));
        assert_eq!(calls[1].by, "A");
    }

    #[test]
    fn test_every_candidate_steps() {
        let spec = play_spec();
        let state = state(&spec);
        let calls = legal_actions(&spec, &state, "A", &EnumerateOptions::default()).unwrap();
        for call in calls {
            let seq = state.meta.last_seq + 1;
            let action = call.clone().into_step(seq);
            assert!(step(&spec, &state, &action).is_ok(), "{call:?} should apply");
        }
    }

    #[test]
    fn test_inactive_seat_has_nothing() {
        let spec = play_spec();
        let state = state(&spec);
        assert!(legal_actions(&spec, &state, "B", &EnumerateOptions::default()).unwrap().is_empty());
        let system = legal_actions(&spec, &state, "system", &EnumerateOptions::default()).unwrap();
        assert_eq!(names(&system)[0], "draw");
    }

    #[test]
    fn test_empty_domain_skips_action() {
        let spec = play_spec();
        let mut state = state(&spec);
        state.set_items("hand", "A", Vec::<String>::new()).unwrap();
        let calls = legal_actions(&spec, &state, "A", &EnumerateOptions::default()).unwrap();
        assert_eq!(names(&calls), ["draw", "end_turn"]);
    }

    #[test]
    fn test_cartesian_order_and_caps() {
        let spec = spec(json!([{
            "id": "aim",
            "input": {
                "type": "object",
                "properties": {"dir": {"enum": ["L", "R"]}, "power": {"enum": [1, 2, 3]}}
            }
        }]));
        let state = state(&spec);
        let calls = legal_actions(&spec, &state, "A", &EnumerateOptions::default()).unwrap();
        let pairs: Vec<(Value, Value)> = calls
            .iter()
            .filter(|c| c.action == "aim")
            .map(|c| (c.payload["dir"].clone(), c.payload["power"].clone()))
            .collect();
        assert_eq!(pairs.len(), 6);
        assert_eq!(pairs[0], (json!("L"), json!(1)));
        assert_eq!(pairs[1], (json!("L"), json!(2)));
        assert_eq!(pairs[3], (json!("R"), json!(1)));

        let capped = legal_actions(&spec, &state, "A", &EnumerateOptions::new().with_per_action_cap(2)).unwrap();
        assert_eq!(names(&capped), ["aim", "aim", "end_turn"]);

        let total = legal_actions(&spec, &state, "A", &EnumerateOptions::new().with_total_cap(4)).unwrap();
        assert_eq!(names(&total), ["aim", "aim", "aim", "aim"]);
    }

    #[test]
    fn test_declared_field_order_governs_caps() {
        let spec = spec(json!([{
            "id": "mark",
            "input": {
                "type": "object",
                "properties": {"z": {"enum": [1, 2]}, "a": {"enum": ["x", "y"]}}
            }
        }]));
        let state = state(&spec);
        let capped = legal_actions(&spec, &state, "A", &EnumerateOptions::new().with_per_action_cap(2)).unwrap();
        let marks: Vec<_> = capped.iter().filter(|c| c.action == "mark").collect();
        assert_eq!(marks.len(), 2);
        assert_eq!((&marks[0].payload["z"], &marks[0].payload["a"]), (&json!(1), &json!("x")));
        assert_eq!((&marks[1].payload["z"], &marks[1].payload["a"]), (&json!(1), &json!("y")));
        let keys: Vec<&str> = marks[0].payload.keys().map(String::as_str).collect();
        assert_eq!(keys, ["z", "a"]);
    }

    #[test]
    fn test_auto_enum_false_and_declared_end_turn() {
        let spec = spec(json!([
            {"id": "secret", "auto_enum": false},
            {"id": "end_turn", "effect": [{"op": "set_var", "key": "done", "value": true}]}
        ]));
        let state = state(&spec);
        let calls = legal_actions(&spec, &state, "A", &EnumerateOptions::default()).unwrap();
        assert_eq!(names(&calls), ["end_turn"]);
    }

    #[test]
    fn test_simulate_counts() {
        let spec = spec(json!([
            {"id": "draw", "effect": [{"op": "move_top", "from_zone": "deck", "to_zone": "hand"}]},
            {"id": "burn", "effect": [{"op": "destroy", "from_zone": "deck"}]},
            {"id": "mark", "effect": [{"op": "set_var", "key": "marked", "value": true}]}
        ]));
        let state = state(&spec);
        let options = EnumerateOptions::new().with_mode(EnumerationMode::Simulate);
        let calls = legal_actions(&spec, &state, "A", &options).unwrap();
        assert_eq!(names(&calls), ["draw", "burn", "burn", "burn", "mark", "end_turn"]);
        assert_eq!(calls[0].payload["count"], json!(1));
        assert_eq!(calls[3].payload["count"], json!(3));
        assert!(calls[4].payload.is_empty());

        let t = step(&spec, &state, &StepAction::new("burn", "A", 1).with_payload(calls[3].payload.clone())).unwrap();
        assert!(t.next_state.items("deck", "A").unwrap().is_empty());
    }
}
