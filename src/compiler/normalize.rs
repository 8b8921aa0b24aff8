//! Effect-pipeline and setup-plan normalization.
//!
//! Raw steps are `{ "op": ..., ...fields }` objects. Each recognized op is
//! mapped onto an [`EffectOp`] with defaults filled in and zone references
//! checked against the zone index. Owner tokens are kept as written.
//!
//! Action pipelines are all-or-nothing: the first failing step rejects the
//! pipeline. The setup plan drops failing steps one at a time.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::spec::{EntityMeta, ZoneMeta};
use crate::core::error::{Issue, IssueCode};
use crate::core::owner::OwnerToken;
use crate::core::state::ZoneKind;
use crate::effects::{CellRef, EffectOp, Pipeline};
use crate::expr::Expr;

/// What a pipeline is for; decides default owners and the unsupported-op code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanKind {
    Effect,
    Setup,
}

impl PlanKind {
    const fn unsupported(self) -> IssueCode {
        match self {
            Self::Effect => IssueCode::EffectUnsupported,
            Self::Setup => IssueCode::InitUnsupported,
        }
    }

    /// Default owner of ops that may iterate seats.
    fn iterating_owner(self) -> OwnerToken {
        match self {
            Self::Effect => OwnerToken::By,
            Self::Setup => OwnerToken::Seat,
        }
    }

    /// Default owner of ops that address exactly one instance.
    fn single_owner(self) -> OwnerToken {
        match self {
            Self::Effect => OwnerToken::By,
            Self::Setup => OwnerToken::Active,
        }
    }
}

/// Which zone kinds an op accepts.
#[derive(Clone, Copy, Debug)]
enum KindRule {
    Ordered,
    Items,
    Board,
    Any,
}

impl KindRule {
    fn admits(self, kind: ZoneKind) -> bool {
        match self {
            Self::Ordered => kind.is_ordered(),
            Self::Items => !kind.is_board(),
            Self::Board => kind.is_board(),
            Self::Any => true,
        }
    }
}

/// Normalizes raw steps against the compiled indexes.
pub struct Normalizer<'a> {
    zones: &'a BTreeMap<String, ZoneMeta>,
    entities: &'a BTreeMap<String, EntityMeta>,
    kind: PlanKind,
}

impl<'a> Normalizer<'a> {
    pub fn new(
        zones: &'a BTreeMap<String, ZoneMeta>,
        entities: &'a BTreeMap<String, EntityMeta>,
        kind: PlanKind,
    ) -> Self {
        Self { zones, entities, kind }
    }

    /// Normalize a whole pipeline, or `None` after the first failing step.
    pub fn pipeline(&self, raw: &[Value], base: &str, issues: &mut Vec<Issue>) -> Option<Pipeline> {
        let mut out = Vec::with_capacity(raw.len());
        for (i, step) in raw.iter().enumerate() {
            match self.step(step, &format!("{base}/{i}")) {
                Ok(ops) => out.extend(ops),
                Err(mut errs) => {
                    issues.append(&mut errs);
                    return None;
                }
            }
        }
        Some(out)
    }

    /// Normalize a plan, keeping every step that normalizes.
    pub fn plan(&self, raw: &[Value], base: &str, issues: &mut Vec<Issue>) -> Pipeline {
        let mut out = Vec::with_capacity(raw.len());
        for (i, step) in raw.iter().enumerate() {
            match self.step(step, &format!("{base}/{i}")) {
                Ok(ops) => out.extend(ops),
                Err(mut errs) => issues.append(&mut errs),
            }
        }
        out
    }

    /// Normalize one step. `entity_type` spawns expand to several ops.
    pub fn step(&self, raw: &Value, path: &str) -> Result<Vec<EffectOp>, Vec<Issue>> {
        let Some(node) = raw.as_object() else {
            return Err(vec![Issue::new(IssueCode::SchemaError, path, "step must be an object")]);
        };
        let Some(op) = node.get("op").and_then(Value::as_str) else {
            return Err(vec![Issue::new(IssueCode::SchemaError, format!("{path}/op"), "op is required")]);
        };
        let mut step = StepReader {
            node,
            path,
            zones: self.zones,
            issues: Vec::new(),
        };
        let iterating = self.kind.iterating_owner();
        let single = self.kind.single_owner();

        let ops = match op {
            "move_top" | "deal" => {
                let from_zone = step.zone("from_zone", KindRule::Ordered, op);
                let to_zone = step.zone("to_zone", KindRule::Ordered, op);
                let from_owner = step.owner("from_owner", iterating.clone());
                let default_to = if op == "deal" { OwnerToken::Seat } else { iterating };
                let to_owner = step.owner("to_owner", default_to);
                let count = step.count();
                if op == "deal" {
                    vec![EffectOp::Deal {
                        from_zone,
                        to_zone,
                        from_owner,
                        to_owner,
                        count,
                    }]
                } else {
                    vec![EffectOp::MoveTop {
                        from_zone,
                        to_zone,
                        from_owner,
                        to_owner,
                        count,
                    }]
                }
            }

            "shuffle" => vec![EffectOp::Shuffle {
                zone: step.zone("zone", KindRule::Ordered, op),
                owner: step.owner("owner", iterating),
            }],

            "spawn" => self.spawn(&mut step, iterating),

            "destroy" => vec![EffectOp::Destroy {
                from_zone: step.zone("from_zone", KindRule::Items, op),
                owner: step.owner("owner", iterating),
                count: step.count(),
            }],

            "move_id" => vec![EffectOp::MoveId {
                from_zone: step.zone("from_zone", KindRule::Ordered, op),
                to_zone: step.zone("to_zone", KindRule::Ordered, op),
                from_owner: step.single_owner("from_owner", single.clone()),
                to_owner: step.single_owner("to_owner", single),
                entity_id: step.operand("entity_id"),
            }],

            "move_piece" => vec![EffectOp::MovePiece {
                zone: step.zone("zone", KindRule::Board, op),
                owner: step.single_owner("owner", single),
                from: step.cell("from"),
                to: step.cell("to"),
            }],

            "set_var" => vec![EffectOp::SetVar {
                key: step.name("key"),
                value: node.get("value").cloned().unwrap_or(Value::Null),
            }],

            "set_phase" => vec![EffectOp::SetPhase {
                phase: step.name("phase"),
            }],

            other => {
                return Err(vec![Issue::new(
                    self.kind.unsupported(),
                    path,
                    format!("unsupported op '{other}'"),
                )]);
            }
        };

        if step.issues.is_empty() {
            Ok(ops)
        } else {
            Err(step.issues)
        }
    }

    fn spawn(&self, step: &mut StepReader<'_>, default_owner: OwnerToken) -> Vec<EffectOp> {
        let to_zone = step.zone("to_zone", KindRule::Any, "spawn");
        let owner = step.owner("owner", default_owner);
        let count = step.count();
        let props = match step.node.get("props") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(props)) => props.clone(),
            Some(_) => {
                step.fail(IssueCode::SchemaError, "props", "props must be an object");
                Map::new()
            }
        };

        let on_board = self.zones.get(&to_zone).is_some_and(|z| z.kind.is_board());
        let pos = if on_board {
            if count != 1 {
                step.fail(IssueCode::SchemaError, "count", "spawn onto a board places exactly one entity");
            }
            Some(step.cell("pos"))
        } else {
            if step.node.get("pos").is_some_and(|p| !p.is_null()) {
                step.fail(IssueCode::SchemaError, "pos", "pos only applies to board zones");
            }
            None
        };

        let entities: Vec<String> = match (step.node.get("entity"), step.node.get("entity_type")) {
            (Some(Value::String(entity)), _) if !entity.is_empty() => {
                if !self.entities.contains_key(entity) {
                    step.fail(IssueCode::RefNotFound, "entity", format!("entity '{entity}' not found"));
                }
                vec![entity.clone()]
            }
            (_, Some(Value::String(entity_type))) if !entity_type.is_empty() => {
                let matching: Vec<String> = self
                    .entities
                    .values()
                    .filter(|e| e.entity_type.as_deref() == Some(entity_type.as_str()))
                    .map(|e| e.id.clone())
                    .collect();
                if matching.is_empty() {
                    step.fail(
                        IssueCode::RefNotFound,
                        "entity_type",
                        format!("no entity of type '{entity_type}'"),
                    );
                }
                matching
            }
            _ => {
                step.fail(IssueCode::SchemaError, "entity", "entity or entity_type is required");
                Vec::new()
            }
        };

        entities
            .into_iter()
            .map(|entity| EffectOp::Spawn {
                entity,
                to_zone: to_zone.clone(),
                owner: owner.clone(),
                count,
                pos: pos.clone(),
                props: props.clone(),
            })
            .collect()
    }
}

/// Field access for one raw step, collecting issues as it goes.
struct StepReader<'s> {
    node: &'s Map<String, Value>,
    path: &'s str,
    zones: &'s BTreeMap<String, ZoneMeta>,
    issues: Vec<Issue>,
}

impl StepReader<'_> {
    fn fail(&mut self, code: IssueCode, key: &str, message: impl Into<String>) {
        self.issues
            .push(Issue::new(code, format!("{}/{key}", self.path), message));
    }

    /// A required non-empty string field.
    fn name(&mut self, key: &str) -> String {
        match self.node.get(key).and_then(Value::as_str) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => {
                self.fail(IssueCode::SchemaError, key, format!("{key} is required"));
                String::new()
            }
        }
    }

    /// A zone reference, checked against the index and the op's kind rule.
    fn zone(&mut self, key: &str, rule: KindRule, op: &str) -> String {
        let zone = self.name(key);
        if zone.is_empty() {
            return zone;
        }
        match self.zones.get(&zone) {
            None => self.fail(IssueCode::RefNotFound, key, format!("zone '{zone}' not found")),
            Some(meta) if !rule.admits(meta.kind) => self.fail(
                IssueCode::KindUnsupported,
                key,
                format!("kind '{}' not supported by {op}", meta.kind),
            ),
            Some(_) => {}
        }
        zone
    }

    fn owner(&mut self, key: &str, default: OwnerToken) -> OwnerToken {
        match self.node.get(key) {
            None | Some(Value::Null) => default,
            Some(Value::String(token)) if !token.is_empty() => OwnerToken::parse(token),
            Some(_) => {
                self.fail(IssueCode::SchemaError, key, "owner must be a non-empty string");
                default
            }
        }
    }

    /// An owner that must name exactly one instance.
    fn single_owner(&mut self, key: &str, default: OwnerToken) -> OwnerToken {
        let owner = self.owner(key, default);
        if owner.is_each_seat() {
            self.fail(IssueCode::SchemaError, key, "'seat' cannot name a single instance");
        }
        owner
    }

    fn count(&mut self) -> u32 {
        match self.node.get("count") {
            None | Some(Value::Null) => 1,
            Some(value) => match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
                Some(n) if n > 0 => n,
                _ => {
                    self.fail(IssueCode::SchemaError, "count", "count must be positive integer");
                    1
                }
            },
        }
    }

    /// A literal string or an expression resolving to one at run time.
    fn operand(&mut self, key: &str) -> Value {
        match self.node.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Value::String(s.clone()),
            Some(value @ Value::Object(_)) => {
                if let Err(err) = Expr::parse(value) {
                    self.fail(IssueCode::SchemaError, key, err.to_string());
                }
                value.clone()
            }
            _ => {
                self.fail(IssueCode::SchemaError, key, format!("{key} is required"));
                Value::Null
            }
        }
    }

    /// A `{x, y}` cell whose coordinates are integers or expressions.
    fn cell(&mut self, key: &str) -> CellRef {
        let Some(cell) = self.node.get(key).and_then(Value::as_object) else {
            self.fail(IssueCode::SchemaError, key, format!("{key} must be an {{x, y}} object"));
            return CellRef::at(0, 0);
        };
        let mut coord = |axis: &str| -> Value {
            let value = cell.get(axis).cloned().unwrap_or(Value::Null);
            let ok = match &value {
                Value::Number(n) => n.is_i64(),
                Value::Object(_) => Expr::parse(&value).is_ok(),
                _ => false,
            };
            if !ok {
                self.fail(
                    IssueCode::SchemaError,
                    &format!("{key}/{axis}"),
                    "coordinate must be an integer or an expression",
                );
            }
            value
        };
        let x = coord("x");
        let y = coord("y");
        CellRef { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{BoardSize, Visibility, ZoneScope};
    use serde_json::json;

    fn zone(kind: ZoneKind) -> ZoneMeta {
        ZoneMeta {
            kind,
            scope: ZoneScope::PerSeat,
            of: None,
            visibility: Visibility::Owner,
            capacity: None,
            size: kind.is_board().then_some(BoardSize { width: 3, height: 3 }),
        }
    }

    fn indexes() -> (BTreeMap<String, ZoneMeta>, BTreeMap<String, EntityMeta>) {
        let mut zones = BTreeMap::new();
        zones.insert("deck".to_string(), zone(ZoneKind::Stack));
        zones.insert("hand".to_string(), zone(ZoneKind::List));
        zones.insert("bag".to_string(), zone(ZoneKind::Set));
        zones.insert("board".to_string(), zone(ZoneKind::Grid));
        let mut entities = BTreeMap::new();
        for (id, ty) in [("c1", "card"), ("c2", "card"), ("pawn", "piece")] {
            entities.insert(
                id.to_string(),
                EntityMeta {
                    id: id.to_string(),
                    entity_type: Some(ty.to_string()),
                    props: Map::new(),
                },
            );
        }
        (zones, entities)
    }

    fn codes(issues: &[Issue]) -> Vec<(IssueCode, &str)> {
        issues.iter().map(|i| (i.code, i.path.as_str())).collect()
    }

    #[test]
    fn test_move_top_defaults() {
        let (zones, entities) = indexes();
        let normalizer = Normalizer::new(&zones, &entities, PlanKind::Effect);
        let ops = normalizer
            .step(&json!({"op": "move_top", "from_zone": "deck", "to_zone": "hand"}), "/actions/draw/effect/0")
            .unwrap();
        assert_eq!(ops, vec![EffectOp::move_top("deck", "hand", 1)]);
    }

    #[test]
    fn test_deal_defaults_to_each_seat() {
        let (zones, entities) = indexes();
        let normalizer = Normalizer::new(&zones, &entities, PlanKind::Effect);
        let ops = normalizer
            .step(&json!({"op": "deal", "from_zone": "deck", "to_zone": "hand", "count": 2}), "/x")
            .unwrap();
        assert_eq!(ops, vec![EffectOp::deal("deck", "hand", 2)]);
    }

    #[test]
    fn test_reference_and_kind_errors() {
        let (zones, entities) = indexes();
        let normalizer = Normalizer::new(&zones, &entities, PlanKind::Effect);
        let issues = normalizer
            .step(&json!({"op": "move_top", "from_zone": "pile", "to_zone": "bag", "count": 0}), "/a")
            .unwrap_err();
        assert_eq!(
            codes(&issues),
            vec![
                (IssueCode::RefNotFound, "/a/from_zone"),
                (IssueCode::KindUnsupported, "/a/to_zone"),
                (IssueCode::SchemaError, "/a/count"),
            ]
        );
    }

    #[test]
    fn test_unsupported_op_codes() {
        let (zones, entities) = indexes();
        let effect = Normalizer::new(&zones, &entities, PlanKind::Effect);
        let setup = Normalizer::new(&zones, &entities, PlanKind::Setup);
        let raw = json!({"op": "teleport"});
        assert_eq!(effect.step(&raw, "/e").unwrap_err()[0].code, IssueCode::EffectUnsupported);
        assert_eq!(setup.step(&raw, "/s").unwrap_err()[0].code, IssueCode::InitUnsupported);
    }

    #[test]
    fn test_pipeline_stops_at_first_failure() {
        let (zones, entities) = indexes();
        let normalizer = Normalizer::new(&zones, &entities, PlanKind::Effect);
        let raw = vec![
            json!({"op": "shuffle", "zone": "deck"}),
            json!({"op": "teleport"}),
            json!({"op": "nope"}),
        ];
        let mut issues = Vec::new();
        assert!(normalizer.pipeline(&raw, "/actions/a/effect", &mut issues).is_none());
        assert_eq!(codes(&issues), vec![(IssueCode::EffectUnsupported, "/actions/a/effect/1")]);
    }

    #[test]
    fn test_plan_keeps_good_steps() {
        let (zones, entities) = indexes();
        let normalizer = Normalizer::new(&zones, &entities, PlanKind::Setup);
        let raw = vec![
            json!({"op": "spawn", "entity_type": "card", "to_zone": "deck"}),
            json!({"op": "teleport"}),
            json!({"op": "shuffle", "zone": "deck"}),
        ];
        let mut issues = Vec::new();
        let plan = normalizer.plan(&raw, "/setup", &mut issues);
        assert_eq!(codes(&issues), vec![(IssueCode::InitUnsupported, "/setup/1")]);
        assert_eq!(plan.len(), 3);
        assert!(matches!(
            &plan[0],
            EffectOp::Spawn { entity, owner: OwnerToken::Seat, .. } if entity == "c1"
        ));
        assert!(matches!(&plan[1], EffectOp::Spawn { entity, .. } if entity == "c2"));
        assert!(matches!(&plan[2], EffectOp::Shuffle { owner: OwnerToken::Seat, .. }));
    }

    #[test]
    fn test_spawn_on_board_requires_pos() {
        let (zones, entities) = indexes();
        let normalizer = Normalizer::new(&zones, &entities, PlanKind::Effect);
        let issues = normalizer
            .step(&json!({"op": "spawn", "entity": "pawn", "to_zone": "board", "count": 2}), "/p")
            .unwrap_err();
        assert_eq!(
            codes(&issues),
            vec![(IssueCode::SchemaError, "/p/count"), (IssueCode::SchemaError, "/p/pos")]
        );

        let ops = normalizer
            .step(
                &json!({"op": "spawn", "entity": "pawn", "to_zone": "board", "pos": {"x": {"var": "payload.x"}, "y": 1}}),
                "/p",
            )
            .unwrap();
        assert!(matches!(&ops[0], EffectOp::Spawn { pos: Some(cell), .. } if cell.y == json!(1)));
    }

    #[test]
    fn test_spawn_unknown_entity() {
        let (zones, entities) = indexes();
        let normalizer = Normalizer::new(&zones, &entities, PlanKind::Effect);
        let issues = normalizer
            .step(&json!({"op": "spawn", "entity": "dragon", "to_zone": "hand"}), "/p")
            .unwrap_err();
        assert_eq!(codes(&issues), vec![(IssueCode::RefNotFound, "/p/entity")]);
    }

    #[test]
    fn test_move_id_and_move_piece() {
        let (zones, entities) = indexes();
        let normalizer = Normalizer::new(&zones, &entities, PlanKind::Effect);
        let ops = normalizer
            .step(
                &json!({"op": "move_id", "from_zone": "hand", "to_zone": "deck", "entity_id": {"var": "payload.card"}}),
                "/m",
            )
            .unwrap();
        assert!(matches!(&ops[0], EffectOp::MoveId { entity_id, .. } if entity_id == &json!({"var": "payload.card"})));

        let issues = normalizer
            .step(
                &json!({"op": "move_piece", "zone": "board", "owner": "seat", "from": {"x": 0, "y": 0}, "to": {"x": "a", "y": 0}}),
                "/m",
            )
            .unwrap_err();
        assert_eq!(
            codes(&issues),
            vec![(IssueCode::SchemaError, "/m/owner"), (IssueCode::SchemaError, "/m/to/x")]
        );
    }

    #[test]
    fn test_set_ops() {
        let (zones, entities) = indexes();
        let normalizer = Normalizer::new(&zones, &entities, PlanKind::Effect);
        assert_eq!(
            normalizer.step(&json!({"op": "set_var", "key": "score", "value": 5}), "/s").unwrap(),
            vec![EffectOp::set_var("score", json!(5))]
        );
        let issues = normalizer.step(&json!({"op": "set_phase", "phase": ""}), "/s").unwrap_err();
        assert_eq!(codes(&issues), vec![(IssueCode::SchemaError, "/s/phase")]);
    }
}
