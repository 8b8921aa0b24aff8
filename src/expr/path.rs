//! Variable paths: a fixed grammar resolved by an explicit interpreter.
//!
//! ```text
//! path    := root? segment ("." segment)*
//! root    := "state." | "payload." | "call.payload."
//! segment := name index* | index+
//! index   := "[" "-"? digits "]"
//! ```
//!
//! A segment spelled `by` is replaced with the acting seat at resolution
//! time. Negative indices count from the end (`[-1]` is the last element).
//! `length` on an array yields its length.
//!
//! State paths walk the typed [`GameState`] structure field by field;
//! generic JSON walking only happens inside open property bags
//! (`vars`, `per_seat` values, entity `props`) and payloads.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use smallvec::SmallVec;

use crate::core::error::EvalError;
use crate::core::state::{EntityRecord, GameState, ZoneInstance, ZoneRuntime};

/// Where a path starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathRoot {
    /// `state.` prefix.
    State,
    /// `payload.` or `call.payload.` prefix.
    Payload,
    /// No prefix: bindings, then payload, then state.
    Unprefixed,
}

/// One step of a path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    /// The reserved `by` token.
    By,
    Index(i64),
}

/// A step after `by` substitution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Key(String),
    Index(i64),
}

/// A parsed variable path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Path {
    raw: String,
    root: PathRoot,
    segments: SmallVec<[Segment; 6]>,
}

impl Path {
    /// Parse a path string.
    pub fn parse(raw: &str) -> Result<Self, EvalError> {
        let bad = |reason: &str| EvalError::BadPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let (root, rest) = if raw == "state" {
            (PathRoot::State, "")
        } else if raw == "payload" || raw == "call.payload" {
            (PathRoot::Payload, "")
        } else if let Some(rest) = raw.strip_prefix("state.") {
            (PathRoot::State, rest)
        } else if let Some(rest) = raw.strip_prefix("call.payload.") {
            (PathRoot::Payload, rest)
        } else if let Some(rest) = raw.strip_prefix("payload.") {
            (PathRoot::Payload, rest)
        } else {
            (PathRoot::Unprefixed, raw)
        };

        let mut segments = SmallVec::new();
        if rest.is_empty() {
            if root == PathRoot::Unprefixed {
                return Err(bad("empty path"));
            }
            return Ok(Self {
                raw: raw.to_string(),
                root,
                segments,
            });
        }

        for part in rest.split('.') {
            let (name, mut brackets) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if name.is_empty() && brackets.is_empty() {
                return Err(bad("empty segment"));
            }
            if !name.is_empty() {
                segments.push(if name == "by" {
                    Segment::By
                } else {
                    Segment::Key(name.to_string())
                });
            }
            while !brackets.is_empty() {
                let close = brackets.find(']').ok_or_else(|| bad("unclosed '['"))?;
                let index = brackets[1..close]
                    .parse::<i64>()
                    .map_err(|_| bad("index must be an integer"))?;
                segments.push(Segment::Index(index));
                brackets = &brackets[close + 1..];
                if !brackets.is_empty() && !brackets.starts_with('[') {
                    return Err(bad("unexpected text after ']'"));
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            root,
            segments,
        })
    }

    #[must_use]
    pub fn root(&self) -> PathRoot {
        self.root
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Substitute the acting seat for every `by` segment.
    pub fn steps(&self, by: Option<&str>) -> Result<Vec<Step>, EvalError> {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Key(key) => Ok(Step::Key(key.clone())),
                Segment::Index(i) => Ok(Step::Index(*i)),
                Segment::By => by
                    .map(|seat| Step::Key(seat.to_string()))
                    .ok_or_else(|| EvalError::MissingActor(self.raw.clone())),
            })
            .collect()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Map a possibly negative index onto `0..len`.
fn wrap_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let idx = if index < 0 { len + index } else { index };
    if (0..len).contains(&idx) {
        usize::try_from(idx).ok()
    } else {
        None
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}

fn step_key(step: &Step) -> Option<&str> {
    match step {
        Step::Key(key) => Some(key),
        Step::Index(_) => None,
    }
}

/// Walk a plain JSON value.
#[must_use]
pub fn walk_json(value: &Value, steps: &[Step]) -> Option<Value> {
    let Some((first, rest)) = steps.split_first() else {
        return Some(value.clone());
    };
    match (value, first) {
        (Value::Object(map), Step::Key(key)) => walk_json(map.get(key)?, rest),
        (Value::Array(items), Step::Key(key)) if key == "length" => {
            rest.is_empty().then(|| Value::from(items.len()))
        }
        (Value::Array(items), Step::Key(key)) => {
            let index = key.parse::<i64>().ok()?;
            walk_json(items.get(wrap_index(index, items.len())?)?, rest)
        }
        (Value::Array(items), Step::Index(index)) => {
            walk_json(items.get(wrap_index(*index, items.len())?)?, rest)
        }
        (Value::String(text), Step::Key(key)) if key == "length" && rest.is_empty() => {
            Some(Value::from(text.chars().count()))
        }
        _ => None,
    }
}

/// Walk a JSON object given as a map.
#[must_use]
pub fn walk_map(map: &Map<String, Value>, steps: &[Step]) -> Option<Value> {
    let Some((first, rest)) = steps.split_first() else {
        return Some(Value::Object(map.clone()));
    };
    walk_json(map.get(step_key(first)?)?, rest)
}

fn walk_bag(bag: &im::OrdMap<String, Value>, steps: &[Step]) -> Option<Value> {
    let Some((first, rest)) = steps.split_first() else {
        return to_json(bag);
    };
    walk_json(bag.get(step_key(first)?)?, rest)
}

fn walk_list<'a, I>(items: I, len: usize, steps: &[Step]) -> Option<Value>
where
    I: IntoIterator<Item = &'a String>,
{
    let Some((first, rest)) = steps.split_first() else {
        return Some(Value::Array(items.into_iter().cloned().map(Value::String).collect()));
    };
    let index = match first {
        Step::Key(key) if key == "length" => return rest.is_empty().then(|| Value::from(len)),
        Step::Key(key) => key.parse::<i64>().ok()?,
        Step::Index(i) => *i,
    };
    let idx = wrap_index(index, len)?;
    let item = items.into_iter().nth(idx)?;
    walk_json(&Value::String(item.clone()), rest)
}

fn walk_instance(instance: &ZoneInstance, steps: &[Step]) -> Option<Value> {
    let Some((first, rest)) = steps.split_first() else {
        return to_json(instance);
    };
    match (step_key(first)?, instance) {
        ("kind", _) => rest.is_empty().then(|| Value::from(instance.kind().as_str())),
        ("items", ZoneInstance::Items { items, .. }) => walk_list(items.iter(), items.len(), rest),
        ("cells", ZoneInstance::Cells { cells, .. }) => walk_json(&to_json(cells)?, rest),
        ("length", _) => rest.is_empty().then(|| Value::from(instance.len())),
        _ => None,
    }
}

fn walk_zone(zone: &ZoneRuntime, steps: &[Step]) -> Option<Value> {
    let Some((first, rest)) = steps.split_first() else {
        return to_json(zone);
    };
    match step_key(first)? {
        "instances" => match rest.split_first() {
            None => to_json(&zone.instances),
            Some((owner, rest)) => walk_instance(zone.instances.get(step_key(owner)?)?, rest),
        },
        "kind" => walk_json(&to_json(&zone.kind)?, rest),
        "scope" => walk_json(&to_json(&zone.scope)?, rest),
        "of" => walk_json(&to_json(zone.of.as_ref()?)?, rest),
        "capacity" => walk_json(&to_json(&zone.capacity?)?, rest),
        "size" => walk_json(&to_json(&zone.size?)?, rest),
        _ => None,
    }
}

fn walk_entity(entity: &EntityRecord, steps: &[Step]) -> Option<Value> {
    let Some((first, rest)) = steps.split_first() else {
        return to_json(entity);
    };
    match step_key(first)? {
        "entity_type" => rest.is_empty().then(|| Value::from(entity.entity_type.as_str())),
        "props" => walk_bag(&entity.props, rest),
        "tags" => walk_json(&to_json(entity.tags.as_ref()?)?, rest),
        _ => None,
    }
}

/// Resolve steps against a game state.
#[must_use]
pub fn walk_state(state: &GameState, steps: &[Step]) -> Option<Value> {
    let Some((first, rest)) = steps.split_first() else {
        return to_json(state);
    };
    match step_key(first)? {
        "phase" => walk_json(&Value::from(state.phase.as_str()), rest),
        "turn" => rest.is_empty().then(|| Value::from(state.turn)),
        "seats" => walk_list(state.seats.iter(), state.seats.len(), rest),
        "active_seat" => walk_json(&Value::from(state.active_seat.as_deref()?), rest),
        "rng_state" => walk_json(&Value::from(state.rng_state.as_str()), rest),
        "vars" => walk_bag(&state.vars, rest),
        "per_seat" => match rest.split_first() {
            None => to_json(&state.per_seat),
            Some((seat, rest)) => walk_bag(state.per_seat.get(step_key(seat)?)?, rest),
        },
        "entities" => match rest.split_first() {
            None => to_json(&state.entities),
            Some((id, rest)) => walk_entity(state.entities.get(step_key(id)?)?, rest),
        },
        "zones" => match rest.split_first() {
            None => to_json(&state.zones),
            Some((id, rest)) => walk_zone(state.zones.get(step_key(id)?)?, rest),
        },
        "meta" => walk_json(&to_json(&state.meta)?, rest),
        _ => None,
    }
}
