//! The compiled specification.
//!
//! A compiled spec is plain serializable data: indexes keyed by id, typed
//! effect pipelines and raw expression ASTs. It never holds timestamps or
//! unordered containers, so its canonical hash (`spec_id`) depends only on
//! the source document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::core::canonical::hash_value;
use crate::core::error::CanonicalError;
use crate::core::owner::OwnerToken;
use crate::core::state::{BoardSize, Visibility, ZoneKind, ZoneScope};
use crate::core::ZoneId;
use crate::dsl::SeatRange;
use crate::effects::Pipeline;
use crate::expr::Evaluator;

/// Current compiled-spec layout version.
pub const COMPILED_SCHEMA_VERSION: u32 = 1;

/// Identity of the document a spec was compiled from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub dsl_schema_version: Number,
    pub engine_compat: String,
    pub id: String,
    pub name: String,
    pub seats: SeatRange,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub props: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneMeta {
    pub kind: ZoneKind,
    pub scope: ZoneScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub of: Option<Vec<String>>,
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<BoardSize>,
}

/// Where the enumerator finds candidate values for one input field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputEnum {
    /// A fixed list declared in the input shape.
    Values { values: Vec<Value> },
    /// The live items of a zone instance.
    Zone {
        zone: ZoneId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<OwnerToken>,
    },
}

/// An input field and its candidate source, kept in declaration order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    pub field: String,
    pub source: InputEnum,
}

/// One compiled action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDef {
    /// Declared payload shape (`{}` when none).
    pub input_spec: Value,
    /// Precondition AST (`{"const": true}` when none).
    pub require_ast: Value,
    pub effect_pipeline: Pipeline,
    pub action_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_enum: Option<Vec<InputField>>,
    /// `Some(false)` keeps the action out of enumeration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_enum: Option<bool>,
}

impl ActionDef {
    /// Whether the enumerator should offer this action.
    #[must_use]
    pub fn enumerable(&self) -> bool {
        self.auto_enum != Some(false)
    }

    /// Candidate source of one enumerated field.
    #[must_use]
    pub fn input_source(&self, field: &str) -> Option<&InputEnum> {
        self.input_enum
            .as_deref()?
            .iter()
            .find(|f| f.field == field)
            .map(|f| &f.source)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Initializers {
    pub plan: Pipeline,
    pub seed_vars: Map<String, Value>,
    pub seed_per_seat: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseGraph {
    pub initial_phase: String,
    pub nodes: Vec<String>,
    pub transitions: Vec<PhaseTransition>,
    pub turn_order: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VictoryRule {
    pub when: Value,
    pub result: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VictorySpec {
    pub order: Vec<VictoryRule>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadCap {
    pub visibility: Visibility,
}

/// Evaluation budget carried by the spec and enforced by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalLimits {
    /// Node limit of one parsed expression.
    pub max_expr_nodes: usize,
    /// Shuffles allowed in one step (pipeline plus triggers).
    pub max_rng_calls_per_reduce: u32,
    /// Elements one `any` may visit.
    pub max_for_each_iter: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_expr_nodes: 64,
            max_rng_calls_per_reduce: 8,
            max_for_each_iter: 100,
        }
    }
}

impl EvalLimits {
    /// An evaluator bounded by these limits.
    #[must_use]
    pub fn evaluator(&self) -> Evaluator {
        Evaluator::unbounded()
            .with_node_limit(self.max_expr_nodes)
            .with_iteration_limit(self.max_for_each_iter)
    }
}

/// The compiled, content-addressed specification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledSpec {
    pub compiled_schema_version: u32,
    pub spec_id: String,
    pub source_meta: SourceMeta,
    pub entities_index: BTreeMap<String, EntityMeta>,
    pub zones_index: BTreeMap<ZoneId, ZoneMeta>,
    pub initializers: Initializers,
    pub phase_graph: PhaseGraph,
    pub actions_index: BTreeMap<String, ActionDef>,
    /// Action ids in definition order.
    pub action_order: Vec<String>,
    /// `after:{action}` -> pipelines run in order.
    pub triggers_index: BTreeMap<String, Vec<Pipeline>>,
    pub victory: VictorySpec,
    pub invariants: Vec<Value>,
    pub read_caps: BTreeMap<ZoneId, ReadCap>,
    pub eval_limits: EvalLimits,
}

impl CompiledSpec {
    /// Canonical hash of this spec with `spec_id` itself removed.
    pub fn content_id(&self) -> Result<String, CanonicalError> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("spec_id");
        }
        Ok(hash_value(&value))
    }

    /// Look up an action.
    #[must_use]
    pub fn action(&self, id: &str) -> Option<&ActionDef> {
        self.actions_index.get(id)
    }

    /// Actions in definition order.
    pub fn actions(&self) -> impl Iterator<Item = (&str, &ActionDef)> {
        self.action_order
            .iter()
            .filter_map(|id| self.actions_index.get(id).map(|def| (id.as_str(), def)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_enum_shapes() {
        let values: InputEnum = serde_json::from_value(json!({"values": ["L", "R"]})).unwrap();
        assert_eq!(values, InputEnum::Values { values: vec![json!("L"), json!("R")] });

        let zone: InputEnum = serde_json::from_value(json!({"zone": "hand", "owner": "by"})).unwrap();
        assert_eq!(
            zone,
            InputEnum::Zone {
                zone: "hand".into(),
                owner: Some(OwnerToken::By)
            }
        );
    }

    #[test]
    fn test_eval_limit_defaults() {
        let limits = EvalLimits::default();
        assert_eq!(limits.max_expr_nodes, 64);
        assert_eq!(limits.max_rng_calls_per_reduce, 8);
        assert_eq!(limits.max_for_each_iter, 100);
        assert_eq!(
            limits.evaluator(),
            Evaluator::unbounded().with_node_limit(64).with_iteration_limit(100)
        );
    }
}
