//! Typed source document.
//!
//! These types mirror the rule document as authors write it. Effect steps,
//! setup steps, input shapes and expressions stay as raw JSON here; the
//! compiler normalizes them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::core::state::{BoardSize, Visibility, ZoneKind, ZoneScope};

/// A validated rule document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Document {
    pub schema_version: Number,
    pub engine_compat: String,
    pub id: String,
    pub name: String,
    pub metadata: Metadata,
    #[serde(default)]
    pub entities: Vec<EntityDecl>,
    #[serde(default)]
    pub zones: Vec<ZoneDecl>,
    #[serde(default)]
    pub state: Option<StateDecl>,
    #[serde(default)]
    pub setup: Option<Vec<Value>>,
    pub phases: Vec<PhaseDecl>,
    pub actions: Vec<ActionDecl>,
    #[serde(default)]
    pub triggers: Option<Map<String, Value>>,
    pub victory: VictoryDecl,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub seats: SeatRange,
}

/// Allowed seat counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeatRange {
    pub min: u32,
    pub max: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<u32>,
}

impl SeatRange {
    /// Whether a seat count is allowed.
    #[must_use]
    pub fn admits(&self, seats: usize) -> bool {
        (self.min as usize..=self.max as usize).contains(&seats)
    }

    /// Seat ids `A`, `B`, ... for the default seat count (`min` when unset).
    #[must_use]
    pub fn default_seats(&self) -> Vec<String> {
        let count = self.default.unwrap_or(self.min);
        (0..count)
            .map(|i| match char::from_u32(u32::from(b'A') + i) {
                Some(letter) if i < 26 => letter.to_string(),
                _ => format!("S{}", i + 1),
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityDecl {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub props: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneDecl {
    pub id: String,
    pub kind: ZoneKind,
    pub scope: ZoneScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub of: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub of_types: Option<Vec<String>>,
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<BoardSize>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateDecl {
    #[serde(default)]
    pub vars: Map<String, Value>,
    #[serde(default)]
    pub per_seat: Option<PerSeatDecl>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerSeatDecl {
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseDecl {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_enter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_actions: Option<Vec<String>>,
    #[serde(default)]
    pub transitions: Vec<TransitionDecl>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionDecl {
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionDecl {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require: Option<Value>,
    #[serde(default)]
    pub effect: Vec<Value>,
    /// `false` hides the action from legal-action enumeration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_enum: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VictoryDecl {
    pub order: Vec<VictoryRuleDecl>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VictoryRuleDecl {
    pub when: Value,
    pub result: String,
}
