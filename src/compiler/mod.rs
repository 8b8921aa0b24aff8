//! Rule-document compiler.
//!
//! [`compile`] turns a raw rule document into a [`CompiledSpec`]:
//!
//! 1. Validate the document; structural problems end compilation.
//! 2. Index entities and zones.
//! 3. Normalize every action's effects and parse its precondition. A
//!    failing action is dropped and compilation goes on without it.
//! 4. Hash each surviving pipeline (`action_hash`) and derive `input_enum`.
//! 5. Normalize triggers and the setup plan, parse victory rules.
//! 6. Hash the assembled spec (`spec_id`).
//!
//! Compilation never returns a Rust error. Everything found along the way
//! is reported in [`CompileOutput::errors`] or [`CompileOutput::warnings`].

pub mod normalize;
pub mod spec;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::core::canonical::hash_of;
use crate::core::error::{Issue, IssueCode};
use crate::core::owner::OwnerToken;
use crate::dsl::{validate, ActionDecl, Document};
use crate::effects::Pipeline;
use crate::expr::{Evaluator, PathRoot, Segment};
use crate::triggers::TriggerKey;

pub use normalize::{Normalizer, PlanKind};
pub use spec::{
    ActionDef, CompiledSpec, EntityMeta, EvalLimits, InputEnum, InputField, Initializers, PhaseGraph,
    PhaseTransition, ReadCap, SourceMeta, VictoryRule, VictorySpec, ZoneMeta,
    COMPILED_SCHEMA_VERSION,
};

/// Name of the turn-passing action the engine provides when a document
/// does not declare its own.
pub const END_TURN: &str = "end_turn";

/// Result of one compilation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompileOutput {
    /// True when no errors were reported.
    pub ok: bool,
    /// Present whenever the document passed validation, even with errors.
    pub compiled_spec: Option<CompiledSpec>,
    pub spec_id: Option<String>,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub time_ms: u64,
}

impl CompileOutput {
    fn rejected(errors: Vec<Issue>, started: Instant) -> Self {
        Self {
            ok: false,
            compiled_spec: None,
            spec_id: None,
            errors,
            warnings: Vec::new(),
            time_ms: elapsed_ms(started),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Compile a raw rule document.
///
/// ## Example
///
/// ```
/// use rulekit::compiler::compile;
/// use serde_json::json;
///
/// let output = compile(&json!({
///     "schema_version": 1,
///     "engine_compat": ">=1.0",
///     "id": "draw-one",
///     "name": "Draw One",
///     "metadata": {"seats": {"min": 2, "max": 2}},
///     "zones": [
///         {"id": "deck", "kind": "stack", "scope": "per_seat", "visibility": "owner"},
///         {"id": "hand", "kind": "list", "scope": "per_seat", "visibility": "owner"}
///     ],
///     "phases": [{"id": "main"}],
///     "actions": [{"id": "draw", "effect": [{"op": "move_top", "from_zone": "deck", "to_zone": "hand"}]}],
///     "victory": {"order": []}
/// }));
/// assert!(output.ok);
/// assert!(output.spec_id.unwrap().starts_with("sha256:"));
/// ```
pub fn compile(raw: &Value) -> CompileOutput {
    let started = Instant::now();
    let doc = match validate(raw) {
        Ok(doc) => doc,
        Err(errors) => {
            debug!(errors = errors.len(), "document failed validation");
            return CompileOutput::rejected(errors, started);
        }
    };

    let mut compiler = Compiler::default();
    let spec = compiler.build(&doc);
    let spec = match spec.content_id() {
        Ok(spec_id) => CompiledSpec { spec_id, ..spec },
        Err(err) => {
            compiler.error(IssueCode::SchemaError, "", err.to_string());
            return CompileOutput::rejected(compiler.errors, started);
        }
    };

    info!(
        spec_id = %spec.spec_id,
        actions = spec.actions_index.len(),
        errors = compiler.errors.len(),
        warnings = compiler.warnings.len(),
        "spec compiled"
    );
    CompileOutput {
        ok: compiler.errors.is_empty(),
        spec_id: Some(spec.spec_id.clone()),
        compiled_spec: Some(spec),
        errors: compiler.errors,
        warnings: compiler.warnings,
        time_ms: elapsed_ms(started),
    }
}

#[derive(Default)]
struct Compiler {
    errors: Vec<Issue>,
    warnings: Vec<Issue>,
}

impl Compiler {
    fn error(&mut self, code: IssueCode, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(Issue::new(code, path, message));
    }

    fn warn(&mut self, code: IssueCode, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(Issue::new(code, path, message));
    }

    fn build(&mut self, doc: &Document) -> CompiledSpec {
        let eval_limits = EvalLimits::default();
        let evaluator = eval_limits.evaluator();

        let entities_index = entities(doc);
        let zones_index = self.zones(doc, &entities_index);

        let effects = Normalizer::new(&zones_index, &entities_index, PlanKind::Effect);
        let (actions_index, action_order) = self.actions(doc, &effects, &evaluator);
        let triggers_index = self.triggers(doc, &effects);

        let setup = Normalizer::new(&zones_index, &entities_index, PlanKind::Setup);
        let plan = setup.plan(doc.setup.as_deref().unwrap_or_default(), "/setup", &mut self.errors);

        let mut seed_vars = Map::new();
        seed_vars.insert("turn".to_string(), json!(1));
        let (vars, defaults) = doc
            .state
            .as_ref()
            .map(|s| (s.vars.clone(), s.per_seat.clone().unwrap_or_default().defaults))
            .unwrap_or_default();
        seed_vars.extend(vars);

        let phase_graph = self.phase_graph(doc, &evaluator);
        let victory = self.victory(doc, &evaluator);
        let read_caps = doc
            .zones
            .iter()
            .map(|z| (z.id.clone(), ReadCap { visibility: z.visibility }))
            .collect();

        CompiledSpec {
            compiled_schema_version: COMPILED_SCHEMA_VERSION,
            spec_id: String::new(),
            source_meta: SourceMeta {
                dsl_schema_version: doc.schema_version.clone(),
                engine_compat: doc.engine_compat.clone(),
                id: doc.id.clone(),
                name: doc.name.clone(),
                seats: doc.metadata.seats,
            },
            entities_index,
            zones_index,
            initializers: Initializers {
                plan,
                seed_vars,
                seed_per_seat: defaults,
            },
            phase_graph,
            actions_index,
            action_order,
            triggers_index,
            victory,
            invariants: Vec::new(),
            read_caps,
            eval_limits,
        }
    }

    fn zones(
        &mut self,
        doc: &Document,
        entities: &BTreeMap<String, EntityMeta>,
    ) -> BTreeMap<String, ZoneMeta> {
        let mut index = BTreeMap::new();
        for (i, zone) in doc.zones.iter().enumerate() {
            if zone.capacity == Some(0) {
                self.warn(
                    IssueCode::SchemaError,
                    format!("/zones/{i}/capacity"),
                    format!("zone '{}' has capacity 0 and can never hold an entity", zone.id),
                );
            }

            // `of_types` widens `of` with every entity of the named types.
            let of = match (&zone.of, &zone.of_types) {
                (of, None) => of.clone(),
                (of, Some(types)) => {
                    let mut ids = of.clone().unwrap_or_default();
                    for entity in entities.values() {
                        let typed = entity
                            .entity_type
                            .as_ref()
                            .is_some_and(|t| types.contains(t));
                        if typed && !ids.contains(&entity.id) {
                            ids.push(entity.id.clone());
                        }
                    }
                    Some(ids)
                }
            };

            index.insert(
                zone.id.clone(),
                ZoneMeta {
                    kind: zone.kind,
                    scope: zone.scope,
                    of,
                    visibility: zone.visibility,
                    capacity: zone.capacity,
                    size: zone.size,
                },
            );
        }
        index
    }

    fn actions(
        &mut self,
        doc: &Document,
        normalizer: &Normalizer<'_>,
        evaluator: &Evaluator,
    ) -> (BTreeMap<String, ActionDef>, Vec<String>) {
        let mut index = BTreeMap::new();
        let mut order = Vec::new();

        for decl in &doc.actions {
            let base = format!("/actions/{}", decl.id);
            let Some(effect_pipeline) =
                normalizer.pipeline(&decl.effect, &format!("{base}/effect"), &mut self.errors)
            else {
                debug!(action = %decl.id, "action dropped");
                continue;
            };

            let require_ast = decl.require.clone().unwrap_or_else(|| json!({"const": true}));
            let require = match evaluator.prepare(&require_ast) {
                Ok(expr) => expr,
                Err(err) => {
                    self.error(IssueCode::SchemaError, format!("{base}/require"), err.to_string());
                    continue;
                }
            };
            if let Some(declared) = input_fields(decl) {
                for path in require.paths() {
                    if path.root() != PathRoot::Payload {
                        continue;
                    }
                    if let Some(Segment::Key(field)) = path.segments().first() {
                        if !declared.contains(field.as_str()) {
                            self.warn(
                                IssueCode::RefNotFound,
                                format!("{base}/require"),
                                format!("'{path}' is not a declared input field"),
                            );
                        }
                    }
                }
            }

            let action_hash = match hash_of(&effect_pipeline) {
                Ok(hash) => hash,
                Err(err) => {
                    self.error(IssueCode::SchemaError, format!("{base}/effect"), err.to_string());
                    continue;
                }
            };

            order.push(decl.id.clone());
            index.insert(
                decl.id.clone(),
                ActionDef {
                    input_spec: decl.input.clone().unwrap_or_else(|| json!({})),
                    require_ast,
                    effect_pipeline,
                    action_hash,
                    input_enum: input_enum(decl),
                    auto_enum: decl.auto_enum,
                },
            );
        }
        (index, order)
    }

    fn triggers(&mut self, doc: &Document, normalizer: &Normalizer<'_>) -> BTreeMap<String, Vec<Pipeline>> {
        let mut index = BTreeMap::new();
        let Some(triggers) = &doc.triggers else {
            return index;
        };
        let declared: BTreeSet<&str> = doc.actions.iter().map(|a| a.id.as_str()).collect();

        for (action, raw) in triggers {
            let base = format!("/triggers/{action}");
            if !declared.contains(action.as_str()) && action != END_TURN {
                self.error(IssueCode::RefNotFound, &base, format!("action '{action}' not found"));
                continue;
            }

            let steps = raw.as_array().map(Vec::as_slice).unwrap_or_default();
            let nested = steps.first().is_some_and(Value::is_array);
            let raw_pipelines: Vec<(String, &[Value])> = if nested {
                steps
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (format!("{base}/{i}"), p.as_array().map(Vec::as_slice).unwrap_or_default()))
                    .collect()
            } else {
                vec![(base.clone(), steps)]
            };

            let pipelines: Vec<Pipeline> = raw_pipelines
                .into_iter()
                .filter_map(|(path, steps)| normalizer.pipeline(steps, &path, &mut self.errors))
                .filter(|p| !p.is_empty())
                .collect();
            if !pipelines.is_empty() {
                index.insert(TriggerKey::after(action.as_str()).to_string(), pipelines);
            }
        }
        index
    }

    fn phase_graph(&mut self, doc: &Document, evaluator: &Evaluator) -> PhaseGraph {
        let mut transitions = Vec::new();
        for (i, phase) in doc.phases.iter().enumerate() {
            for (j, transition) in phase.transitions.iter().enumerate() {
                if let Some(when) = &transition.when {
                    if let Err(err) = evaluator.prepare(when) {
                        self.error(
                            IssueCode::SchemaError,
                            format!("/phases/{i}/transitions/{j}/when"),
                            err.to_string(),
                        );
                        continue;
                    }
                }
                transitions.push(PhaseTransition {
                    from: phase.id.clone(),
                    to: transition.to.clone(),
                    when: transition.when.clone(),
                });
            }
        }

        PhaseGraph {
            initial_phase: doc
                .phases
                .first()
                .map_or_else(|| "setup".to_string(), |p| p.id.clone()),
            nodes: doc.phases.iter().map(|p| p.id.clone()).collect(),
            transitions,
            turn_order: "clockwise".to_string(),
        }
    }

    fn victory(&mut self, doc: &Document, evaluator: &Evaluator) -> VictorySpec {
        let mut order = Vec::with_capacity(doc.victory.order.len());
        for (i, rule) in doc.victory.order.iter().enumerate() {
            if let Err(err) = evaluator.prepare(&rule.when) {
                self.error(IssueCode::SchemaError, format!("/victory/order/{i}/when"), err.to_string());
                continue;
            }
            order.push(VictoryRule {
                when: rule.when.clone(),
                result: rule.result.clone(),
            });
        }
        VictorySpec { order }
    }
}

fn entities(doc: &Document) -> BTreeMap<String, EntityMeta> {
    doc.entities
        .iter()
        .map(|e| {
            (
                e.id.clone(),
                EntityMeta {
                    id: e.id.clone(),
                    entity_type: e.entity_type.clone(),
                    props: e.props.clone(),
                },
            )
        })
        .collect()
}

/// Declared input properties, or `None` when the action has no input shape.
fn input_fields(decl: &ActionDecl) -> Option<BTreeSet<&str>> {
    let props = decl.input.as_ref()?.get("properties")?.as_object()?;
    Some(props.keys().map(String::as_str).collect())
}

/// Where the enumerator finds candidates for each input field.
///
/// An explicit `enum` wins. Otherwise the first effect step with a top-level
/// `{"var": "payload.<field>"}` value and a `from_zone` names the zone whose
/// live items are the candidates.
fn input_enum(decl: &ActionDecl) -> Option<Vec<InputField>> {
    let props = decl.input.as_ref()?.get("properties")?.as_object()?;
    let mut out = Vec::new();

    for (field, prop) in props {
        if let Some(values) = prop.get("enum").and_then(Value::as_array) {
            out.push(InputField {
                field: field.clone(),
                source: InputEnum::Values { values: values.clone() },
            });
            continue;
        }
        let reference = format!("payload.{field}");
        let source = decl.effect.iter().filter_map(Value::as_object).find(|step| {
            let mentions = step
                .values()
                .any(|v| v.get("var").and_then(Value::as_str) == Some(reference.as_str()));
            mentions && step.get("from_zone").is_some_and(Value::is_string)
        });
        if let Some(step) = source {
            let zone = step.get("from_zone").and_then(Value::as_str).unwrap_or_default();
            out.push(InputField {
                field: field.clone(),
                source: InputEnum::Zone {
                    zone: zone.to_string(),
                    owner: step
                        .get("from_owner")
                        .and_then(Value::as_str)
                        .map(OwnerToken::parse),
                },
            });
        }
    }

    (!out.is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::EffectOp;

    fn document() -> Value {
        json!({
            "schema_version": 1,
            "engine_compat": ">=1.0",
            "id": "cards",
            "name": "Cards",
            "metadata": {"seats": {"min": 2, "max": 4, "default": 2}},
            "entities": [
                {"id": "c1", "type": "card", "props": {"rank": 1}},
                {"id": "c2", "type": "card", "props": {"rank": 2}}
            ],
            "zones": [
                {"id": "deck", "kind": "stack", "scope": "per_seat", "visibility": "owner"},
                {"id": "hand", "kind": "list", "scope": "per_seat", "visibility": "owner", "capacity": 5},
                {"id": "discard", "kind": "list", "scope": "public", "visibility": "all"}
            ],
            "state": {"vars": {"round": 0}, "per_seat": {"defaults": {"score": 0}}},
            "setup": [
                {"op": "spawn", "entity_type": "card", "to_zone": "deck"},
                {"op": "shuffle", "zone": "deck"}
            ],
            "phases": [{"id": "main", "transitions": [{"to": "end"}]}, {"id": "end"}],
            "actions": [
                {"id": "draw", "effect": [{"op": "move_top", "from_zone": "deck", "to_zone": "hand"}]},
                {
                    "id": "play",
                    "input": {"type": "object", "properties": {"card": {"type": "string"}}, "required": ["card"]},
                    "effect": [{"op": "move_id", "from_zone": "hand", "to_zone": "discard", "entity_id": {"var": "payload.card"}}]
                },
                {
                    "id": "pick",
                    "input": {"type": "object", "properties": {"side": {"type": "string", "enum": ["L", "R"]}}},
                    "require": {"op": "==", "args": [{"var": "payload.side"}, "L"]},
                    "effect": [{"op": "set_var", "key": "side", "value": {"var": "payload.side"}}]
                }
            ],
            "triggers": {"draw": [{"op": "set_var", "key": "drew", "value": true}]},
            "victory": {"order": [{"when": {"op": ">=", "args": [{"var": "state.vars.round"}, 3]}, "result": "tie"}]}
        })
    }

    #[test]
    fn test_compiles_clean_document() {
        let output = compile(&document());
        assert!(output.ok, "{:?}", output.errors);
        assert!(output.warnings.is_empty());
        let spec = output.compiled_spec.unwrap();
        assert_eq!(Some(spec.spec_id.clone()), output.spec_id);
        assert_eq!(spec.action_order, vec!["draw", "play", "pick"]);
        assert_eq!(spec.phase_graph.initial_phase, "main");
        assert_eq!(spec.phase_graph.transitions.len(), 1);
        assert_eq!(spec.initializers.seed_vars["turn"], 1);
        assert_eq!(spec.initializers.seed_vars["round"], 0);
        assert_eq!(spec.initializers.seed_per_seat["score"], 0);
        assert_eq!(spec.initializers.plan.len(), 3);
        assert_eq!(spec.read_caps["discard"].visibility, crate::core::state::Visibility::All);
        assert_eq!(spec.actions_index["draw"].require_ast, json!({"const": true}));
    }

    #[test]
    fn test_hashes_are_stable() {
        let first = compile(&document());
        let second = compile(&document());
        assert_eq!(first.spec_id, second.spec_id);
        let (a, b) = (first.compiled_spec.unwrap(), second.compiled_spec.unwrap());
        for id in &a.action_order {
            assert_eq!(a.actions_index[id].action_hash, b.actions_index[id].action_hash);
        }
        assert_eq!(a.content_id().unwrap(), a.spec_id);
    }

    #[test]
    fn test_action_hash_tracks_pipeline() {
        let spec = compile(&document()).compiled_spec.unwrap();
        let expected = hash_of(&vec![EffectOp::move_top("deck", "hand", 1)]).unwrap();
        assert_eq!(spec.actions_index["draw"].action_hash, expected);
    }

    #[test]
    fn test_input_enum_derivation() {
        let spec = compile(&document()).compiled_spec.unwrap();
        let play = &spec.actions_index["play"];
        assert_eq!(
            play.input_source("card").unwrap(),
            &InputEnum::Zone {
                zone: "hand".into(),
                owner: None
            }
        );
        let pick = &spec.actions_index["pick"];
        assert_eq!(
            pick.input_source("side").unwrap(),
            &InputEnum::Values { values: vec![json!("L"), json!("R")] }
        );
        assert!(spec.actions_index["draw"].input_enum.is_none());
    }

    #[test]
    fn test_failing_action_is_dropped() {
        let mut doc = document();
        doc["actions"][0]["effect"][0]["from_zone"] = json!("pile");
        let output = compile(&doc);
        assert!(!output.ok);
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].code, IssueCode::RefNotFound);
        assert_eq!(output.errors[0].path, "/actions/draw/effect/0/from_zone");
        let spec = output.compiled_spec.unwrap();
        assert!(!spec.actions_index.contains_key("draw"));
        assert_eq!(spec.action_order, vec!["play", "pick"]);
    }

    #[test]
    fn test_unknown_require_operator() {
        let mut doc = document();
        doc["actions"][2]["require"] = json!({"op": "xor", "args": [true, false]});
        let output = compile(&doc);
        assert_eq!(output.errors[0].code, IssueCode::SchemaError);
        assert_eq!(output.errors[0].path, "/actions/pick/require");
        assert!(!output.compiled_spec.unwrap().actions_index.contains_key("pick"));
    }

    #[test]
    fn test_validation_failure_has_no_spec() {
        let mut doc = document();
        doc["zones"][0]["kind"] = json!("pile");
        let output = compile(&doc);
        assert!(!output.ok);
        assert!(output.compiled_spec.is_none());
        assert!(output.spec_id.is_none());
        assert!(output.errors.iter().all(|e| e.code == IssueCode::SchemaError));
    }

    #[test]
    fn test_unsupported_setup_op_keeps_spec() {
        let mut doc = document();
        doc["setup"][1] = json!({"op": "teleport"});
        let output = compile(&doc);
        assert_eq!(output.errors[0].code, IssueCode::InitUnsupported);
        assert_eq!(output.errors[0].path, "/setup/1");
        assert_eq!(output.compiled_spec.unwrap().initializers.plan.len(), 2);
    }

    #[test]
    fn test_triggers_index() {
        let spec = compile(&document()).compiled_spec.unwrap();
        let pipelines = &spec.triggers_index["after:draw"];
        assert_eq!(pipelines, &vec![vec![EffectOp::set_var("drew", json!(true))]]);

        let mut doc = document();
        doc["triggers"] = json!({"fold": [{"op": "set_var", "key": "x"}]});
        let output = compile(&doc);
        assert_eq!(output.errors[0].code, IssueCode::RefNotFound);
        assert_eq!(output.errors[0].path, "/triggers/fold");
    }

    #[test]
    fn test_warnings() {
        let mut doc = document();
        doc["zones"][2]["capacity"] = json!(0);
        doc["actions"][2]["require"] = json!({"op": "==", "args": [{"var": "payload.hand"}, "L"]});
        let output = compile(&doc);
        assert!(output.ok);
        let codes: Vec<_> = output.warnings.iter().map(|w| (w.code, w.path.as_str())).collect();
        assert_eq!(
            codes,
            vec![
                (IssueCode::SchemaError, "/zones/2/capacity"),
                (IssueCode::RefNotFound, "/actions/pick/require"),
            ]
        );
    }
}
