//! Structural validation of a raw rule document.
//!
//! The validator walks the raw JSON once, collecting every problem as a
//! `SCHEMA_ERROR` [`Issue`] with a JSON-pointer path, and only deserializes
//! into [`Document`] when the walk found nothing.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::debug;

use super::document::Document;
use crate::core::error::{Issue, IssueCode};

const TOP_LEVEL_KEYS: &[&str] = &[
    "schema_version",
    "engine_compat",
    "id",
    "name",
    "metadata",
    "entities",
    "zones",
    "state",
    "setup",
    "phases",
    "actions",
    "triggers",
    "victory",
];

const ZONE_KINDS: &[&str] = &["list", "stack", "queue", "set", "grid", "hexgrid", "track"];
const BOARD_KINDS: &[&str] = &["grid", "hexgrid", "track"];
const ZONE_SCOPES: &[&str] = &["public", "per_seat"];
const VISIBILITIES: &[&str] = &["owner", "all", "none", "custom"];
const INPUT_TYPES: &[&str] = &["object", "string", "number", "integer", "boolean", "array"];
const VICTORY_RESULTS: &[&str] = &["win", "loss", "tie", "ongoing"];

/// Validate a raw document and return its typed form.
pub fn validate(raw: &Value) -> Result<Document, Vec<Issue>> {
    let mut checker = Checker::default();
    checker.document(raw);
    if !checker.issues.is_empty() {
        debug!(issues = checker.issues.len(), "document rejected");
        return Err(checker.issues);
    }
    serde_json::from_value(raw.clone())
        .map_err(|err| vec![Issue::new(IssueCode::SchemaError, "", err.to_string())])
}

fn pointer(base: &str, key: impl std::fmt::Display) -> String {
    format!("{base}/{key}")
}

#[derive(Default)]
struct Checker {
    issues: Vec<Issue>,
}

impl Checker {
    fn fail(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(Issue::new(IssueCode::SchemaError, path, message));
    }

    fn object<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a Map<String, Value>> {
        let obj = value.as_object();
        if obj.is_none() {
            self.fail(path, "must be an object");
        }
        obj
    }

    fn required<'a>(&mut self, obj: &'a Map<String, Value>, key: &str, path: &str) -> Option<&'a Value> {
        let value = obj.get(key).filter(|v| !v.is_null());
        if value.is_none() {
            self.fail(pointer(path, key), "is required");
        }
        value
    }

    fn string<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &str,
        required: bool,
    ) -> Option<&'a str> {
        let value = if required {
            self.required(obj, key, path)?
        } else {
            obj.get(key).filter(|v| !v.is_null())?
        };
        match value.as_str() {
            Some("") => {
                self.fail(pointer(path, key), "must not be empty");
                None
            }
            Some(s) => Some(s),
            None => {
                self.fail(pointer(path, key), "must be a string");
                None
            }
        }
    }

    fn one_of<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &str,
        allowed: &[&str],
    ) -> Option<&'a str> {
        let value = self.string(obj, key, path, true)?;
        if allowed.contains(&value) {
            Some(value)
        } else {
            self.fail(
                pointer(path, key),
                format!("'{value}' is not one of {}", allowed.join("|")),
            );
            None
        }
    }

    fn array<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &str,
        required: bool,
    ) -> Option<&'a Vec<Value>> {
        let value = if required {
            self.required(obj, key, path)?
        } else {
            obj.get(key).filter(|v| !v.is_null())?
        };
        let items = value.as_array();
        if items.is_none() {
            self.fail(pointer(path, key), "must be an array");
        }
        items
    }

    fn integer(&mut self, obj: &Map<String, Value>, key: &str, path: &str, min: u64) -> Option<u64> {
        let value = obj.get(key).filter(|v| !v.is_null())?;
        match value.as_u64() {
            Some(n) if n >= min => Some(n),
            _ => {
                self.fail(pointer(path, key), format!("must be an integer >= {min}"));
                None
            }
        }
    }

    fn unknown_keys(&mut self, obj: &Map<String, Value>, allowed: &[&str], path: &str) {
        for key in obj.keys() {
            if !allowed.contains(&key.as_str()) {
                self.fail(pointer(path, key), "unknown property");
            }
        }
    }

    fn unique<'a>(&mut self, seen: &mut HashSet<&'a str>, id: &'a str, path: &str) {
        if !seen.insert(id) {
            self.fail(pointer(path, "id"), format!("duplicate id '{id}'"));
        }
    }

    // === Sections ===

    fn document(&mut self, raw: &Value) {
        let Some(doc) = self.object(raw, "") else {
            return;
        };
        self.unknown_keys(doc, TOP_LEVEL_KEYS, "");

        if let Some(version) = self.required(doc, "schema_version", "") {
            if !version.is_number() {
                self.fail("/schema_version", "must be a number");
            }
        }
        self.string(doc, "engine_compat", "", true);
        self.string(doc, "id", "", true);
        self.string(doc, "name", "", true);

        if let Some(meta) = self.required(doc, "metadata", "") {
            self.metadata(meta);
        }

        let entity_ids = self.entities(doc);
        self.zones(doc, &entity_ids);

        if let Some(state) = doc.get("state").filter(|v| !v.is_null()) {
            self.state(state);
        }
        if let Some(setup) = self.array(doc, "setup", "", false) {
            self.steps(setup, "/setup");
        }

        self.phases(doc);
        self.actions(doc);

        if let Some(triggers) = doc.get("triggers").filter(|v| !v.is_null()) {
            self.triggers(triggers);
        }
        if let Some(victory) = self.required(doc, "victory", "") {
            self.victory(victory);
        }
    }

    fn metadata(&mut self, meta: &Value) {
        let Some(meta) = self.object(meta, "/metadata") else {
            return;
        };
        self.unknown_keys(meta, &["author", "seats"], "/metadata");
        if meta.contains_key("author") {
            self.string(meta, "author", "/metadata", false);
        }
        let Some(seats) = self.required(meta, "seats", "/metadata") else {
            return;
        };
        let Some(seats) = self.object(seats, "/metadata/seats") else {
            return;
        };
        let path = "/metadata/seats";
        self.unknown_keys(seats, &["min", "max", "default"], path);
        self.required(seats, "min", path);
        self.required(seats, "max", path);
        let min = self.integer(seats, "min", path, 1);
        let max = self.integer(seats, "max", path, 1);
        let default = self.integer(seats, "default", path, 1);
        if let (Some(min), Some(max)) = (min, max) {
            if max < min {
                self.fail(pointer(path, "max"), format!("must be >= min ({min})"));
            } else if let Some(default) = default {
                if default < min || default > max {
                    self.fail(pointer(path, "default"), format!("must lie within {min}..={max}"));
                }
            }
        }
    }

    fn entities<'a>(&mut self, doc: &'a Map<String, Value>) -> HashSet<&'a str> {
        let mut seen = HashSet::new();
        let Some(entities) = self.array(doc, "entities", "", false) else {
            return seen;
        };
        for (i, entity) in entities.iter().enumerate() {
            let path = pointer("/entities", i);
            let Some(entity) = self.object(entity, &path) else {
                continue;
            };
            self.unknown_keys(entity, &["id", "type", "props"], &path);
            if let Some(id) = self.string(entity, "id", &path, true) {
                self.unique(&mut seen, id, &path);
            }
            self.string(entity, "type", &path, false);
            if let Some(props) = entity.get("props").filter(|v| !v.is_null()) {
                self.object(props, &pointer(&path, "props"));
            }
        }
        seen
    }

    fn zones(&mut self, doc: &Map<String, Value>, entity_ids: &HashSet<&str>) {
        let Some(zones) = self.array(doc, "zones", "", false) else {
            return;
        };
        let mut seen = HashSet::new();
        for (i, zone) in zones.iter().enumerate() {
            let path = pointer("/zones", i);
            let Some(zone) = self.object(zone, &path) else {
                continue;
            };
            self.unknown_keys(
                zone,
                &["id", "kind", "scope", "of", "of_types", "visibility", "capacity", "size"],
                &path,
            );
            if let Some(id) = self.string(zone, "id", &path, true) {
                self.unique(&mut seen, id, &path);
            }
            let kind = self.one_of(zone, "kind", &path, ZONE_KINDS);
            let scope = self.one_of(zone, "scope", &path, ZONE_SCOPES);
            let visibility = self.one_of(zone, "visibility", &path, VISIBILITIES);
            if visibility == Some("owner") && scope == Some("public") {
                self.fail(pointer(&path, "visibility"), "visibility 'owner' requires scope 'per_seat'");
            }
            self.integer(zone, "capacity", &path, 0);

            if let Some(of) = self.array(zone, "of", &path, false) {
                for (j, entry) in of.iter().enumerate() {
                    match entry.as_str() {
                        Some(id) if entity_ids.contains(id) => {}
                        Some(id) => self.fail(
                            pointer(&pointer(&path, "of"), j),
                            format!("entity '{id}' is not declared"),
                        ),
                        None => self.fail(pointer(&pointer(&path, "of"), j), "must be a string"),
                    }
                }
            }
            if let Some(types) = self.array(zone, "of_types", &path, false) {
                if types.iter().any(|t| !t.is_string()) {
                    self.fail(pointer(&path, "of_types"), "must be an array of strings");
                }
            }

            if let Some(size) = zone.get("size").filter(|v| !v.is_null()) {
                let size_path = pointer(&path, "size");
                if kind.is_some_and(|k| !BOARD_KINDS.contains(&k)) {
                    self.fail(&size_path, "only board zones (grid|hexgrid|track) take a size");
                }
                if let Some(size) = self.object(size, &size_path) {
                    self.unknown_keys(size, &["width", "height"], &size_path);
                    self.required(size, "width", &size_path);
                    self.required(size, "height", &size_path);
                    self.integer(size, "width", &size_path, 1);
                    self.integer(size, "height", &size_path, 1);
                }
            }
        }
    }

    fn state(&mut self, state: &Value) {
        let Some(state) = self.object(state, "/state") else {
            return;
        };
        self.unknown_keys(state, &["vars", "per_seat"], "/state");
        if let Some(vars) = state.get("vars").filter(|v| !v.is_null()) {
            self.object(vars, "/state/vars");
        }
        if let Some(per_seat) = state.get("per_seat").filter(|v| !v.is_null()) {
            if let Some(per_seat) = self.object(per_seat, "/state/per_seat") {
                self.unknown_keys(per_seat, &["defaults"], "/state/per_seat");
                if let Some(defaults) = per_seat.get("defaults").filter(|v| !v.is_null()) {
                    self.object(defaults, "/state/per_seat/defaults");
                }
            }
        }
    }

    fn steps(&mut self, steps: &[Value], path: &str) {
        for (i, step) in steps.iter().enumerate() {
            let step_path = pointer(path, i);
            if let Some(step) = self.object(step, &step_path) {
                self.string(step, "op", &step_path, true);
            }
        }
    }

    fn phases(&mut self, doc: &Map<String, Value>) {
        let Some(phases) = self.array(doc, "phases", "", true) else {
            return;
        };
        if phases.is_empty() {
            self.fail("/phases", "at least one phase is required");
            return;
        }
        let declared: HashSet<&str> = phases
            .iter()
            .filter_map(|p| p.get("id").and_then(Value::as_str))
            .collect();

        let mut seen = HashSet::new();
        for (i, phase) in phases.iter().enumerate() {
            let path = pointer("/phases", i);
            let Some(phase) = self.object(phase, &path) else {
                continue;
            };
            self.unknown_keys(phase, &["id", "on_enter", "allowed_actions", "transitions"], &path);
            if let Some(id) = self.string(phase, "id", &path, true) {
                self.unique(&mut seen, id, &path);
            }
            if let Some(allowed) = self.array(phase, "allowed_actions", &path, false) {
                if allowed.iter().any(|a| !a.is_string()) {
                    self.fail(pointer(&path, "allowed_actions"), "must be an array of strings");
                }
            }
            let Some(transitions) = self.array(phase, "transitions", &path, false) else {
                continue;
            };
            for (j, transition) in transitions.iter().enumerate() {
                let t_path = pointer(&pointer(&path, "transitions"), j);
                let Some(transition) = self.object(transition, &t_path) else {
                    continue;
                };
                self.unknown_keys(transition, &["to", "when"], &t_path);
                if let Some(to) = self.string(transition, "to", &t_path, true) {
                    if !declared.contains(to) {
                        self.fail(pointer(&t_path, "to"), format!("phase '{to}' is not declared"));
                    }
                }
            }
        }
    }

    fn actions(&mut self, doc: &Map<String, Value>) {
        let Some(actions) = self.array(doc, "actions", "", true) else {
            return;
        };
        let mut seen = HashSet::new();
        for (i, action) in actions.iter().enumerate() {
            let path = pointer("/actions", i);
            let Some(action) = self.object(action, &path) else {
                continue;
            };
            self.unknown_keys(action, &["id", "input", "require", "effect", "auto_enum"], &path);
            if let Some(id) = self.string(action, "id", &path, true) {
                self.unique(&mut seen, id, &path);
            }
            if let Some(input) = action.get("input").filter(|v| !v.is_null()) {
                let input_path = pointer(&path, "input");
                if let Some(input) = self.object(input, &input_path) {
                    if input.get("type").is_some() {
                        self.one_of(input, "type", &input_path, INPUT_TYPES);
                    }
                }
            }
            if let Some(flag) = action.get("auto_enum").filter(|v| !v.is_null()) {
                if !flag.is_boolean() {
                    self.fail(pointer(&path, "auto_enum"), "must be a boolean");
                }
            }
            if let Some(effect) = self.array(action, "effect", &path, false) {
                self.steps(effect, &pointer(&path, "effect"));
            }
        }
    }

    fn triggers(&mut self, triggers: &Value) {
        let Some(triggers) = self.object(triggers, "/triggers") else {
            return;
        };
        for (action, pipelines) in triggers {
            let path = pointer("/triggers", action);
            let Some(items) = pipelines.as_array() else {
                self.fail(&path, "must be a pipeline or a list of pipelines");
                continue;
            };
            if items.iter().all(Value::is_array) {
                for (i, pipeline) in items.iter().enumerate() {
                    if let Some(steps) = pipeline.as_array() {
                        self.steps(steps, &pointer(&path, i));
                    }
                }
            } else {
                self.steps(items, &path);
            }
        }
    }

    fn victory(&mut self, victory: &Value) {
        let Some(victory) = self.object(victory, "/victory") else {
            return;
        };
        self.unknown_keys(victory, &["order"], "/victory");
        let Some(order) = self.array(victory, "order", "/victory", true) else {
            return;
        };
        for (i, rule) in order.iter().enumerate() {
            let path = pointer("/victory/order", i);
            let Some(rule) = self.object(rule, &path) else {
                continue;
            };
            self.unknown_keys(rule, &["when", "result"], &path);
            self.required(rule, "when", &path);
            if let Some(result) = self.string(rule, "result", &path, true) {
                let (head, seat) = match result.split_once(':') {
                    Some((head, seat)) => (head, Some(seat)),
                    None => (result, None),
                };
                if !VICTORY_RESULTS.contains(&head) || seat == Some("") {
                    self.fail(
                        pointer(&path, "result"),
                        format!("'{result}' must be win|loss|tie|ongoing, optionally ':<seat>'"),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "schema_version": 1,
            "engine_compat": ">=1.0",
            "id": "mini",
            "name": "Mini",
            "metadata": {"seats": {"min": 2, "max": 4, "default": 2}},
            "entities": [{"id": "c1"}, {"id": "c2"}],
            "zones": [
                {"id": "deck", "kind": "stack", "scope": "per_seat", "visibility": "owner", "of": ["c1", "c2"]},
                {"id": "board", "kind": "grid", "scope": "public", "visibility": "all", "size": {"width": 3, "height": 3}}
            ],
            "phases": [{"id": "main", "transitions": [{"to": "main"}]}],
            "actions": [{"id": "draw", "effect": [{"op": "move_top", "from_zone": "deck", "to_zone": "deck"}]}],
            "victory": {"order": [{"when": false, "result": "win:A"}]}
        })
    }

    fn paths(issues: &[Issue]) -> Vec<&str> {
        issues.iter().map(|i| i.path.as_str()).collect()
    }

    #[test]
    fn test_minimal_document_accepted() {
        let doc = validate(&minimal()).unwrap();
        assert_eq!(doc.id, "mini");
        assert_eq!(doc.zones.len(), 2);
        assert_eq!(doc.metadata.seats.default, Some(2));
        assert!(doc.metadata.seats.admits(3));
    }

    #[test]
    fn test_unknown_top_level_key() {
        let mut raw = minimal();
        raw["extra"] = json!(1);
        let issues = validate(&raw).unwrap_err();
        assert_eq!(paths(&issues), vec!["/extra"]);
        assert!(issues.iter().all(|i| i.code == IssueCode::SchemaError));
    }

    #[test]
    fn test_zone_rules_collected() {
        let mut raw = minimal();
        raw["zones"] = json!([
            {"id": "z", "kind": "pile", "scope": "public", "visibility": "owner"},
            {"id": "z", "kind": "list", "scope": "public", "visibility": "all", "size": {"width": 1, "height": 1}},
            {"id": "y", "kind": "set", "scope": "public", "visibility": "all", "of": ["nope"], "capacity": -1}
        ]);
        let issues = validate(&raw).unwrap_err();
        let got = paths(&issues);
        assert!(got.contains(&"/zones/0/kind"));
        assert!(got.contains(&"/zones/0/visibility"));
        assert!(got.contains(&"/zones/1/id"));
        assert!(got.contains(&"/zones/1/size"));
        assert!(got.contains(&"/zones/2/of/0"));
        assert!(got.contains(&"/zones/2/capacity"));
    }

    #[test]
    fn test_phase_rules() {
        let mut raw = minimal();
        raw["phases"] = json!([]);
        assert_eq!(paths(&validate(&raw).unwrap_err()), vec!["/phases"]);

        raw["phases"] = json!([{"id": "main", "transitions": [{"to": "end"}]}]);
        assert_eq!(paths(&validate(&raw).unwrap_err()), vec!["/phases/0/transitions/0/to"]);
    }

    #[test]
    fn test_effect_steps_need_op() {
        let mut raw = minimal();
        raw["actions"] = json!([{"id": "draw", "effect": [{"from_zone": "deck"}, 3]}]);
        let issues = validate(&raw).unwrap_err();
        assert_eq!(paths(&issues), vec!["/actions/0/effect/0/op", "/actions/0/effect/1"]);
    }

    #[test]
    fn test_seat_range() {
        let mut raw = minimal();
        raw["metadata"]["seats"] = json!({"min": 3, "max": 2, "default": 5});
        let issues = validate(&raw).unwrap_err();
        assert_eq!(paths(&issues), vec!["/metadata/seats/max"]);

        raw["metadata"]["seats"] = json!({"min": 2, "max": 4, "default": 5});
        assert_eq!(paths(&validate(&raw).unwrap_err()), vec!["/metadata/seats/default"]);
    }

    #[test]
    fn test_victory_result_format() {
        let mut raw = minimal();
        raw["victory"] = json!({"order": [
            {"when": true, "result": "draw"},
            {"when": true, "result": "win:"},
            {"when": true, "result": "tie"}
        ]});
        let issues = validate(&raw).unwrap_err();
        assert_eq!(paths(&issues), vec!["/victory/order/0/result", "/victory/order/1/result"]);
    }

    #[test]
    fn test_trigger_shapes() {
        let mut raw = minimal();
        raw["triggers"] = json!({
            "draw": [{"op": "set_var", "key": "x", "value": 1}],
            "other": [[{"op": "set_phase", "phase": "main"}], [{"nope": 1}]],
            "bad": 3
        });
        let issues = validate(&raw).unwrap_err();
        assert_eq!(paths(&issues), vec!["/triggers/bad", "/triggers/other/1/0/op"]);
    }
}
