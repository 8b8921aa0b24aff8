//! Command-line front end tests.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::{json, Value};
use tempfile::TempDir;

fn rulekit(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rulekit"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run rulekit")
}

fn rules_dir(doc: &Value) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("dsl.json"), serde_json::to_string_pretty(doc).unwrap()).unwrap();
    dir
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn draw_game() -> Value {
    json!({
        "schema_version": 1,
        "engine_compat": ">=1.0",
        "id": "draw",
        "name": "Draw",
        "metadata": {"seats": {"min": 2, "max": 4, "default": 2}},
        "entities": [{"id": "card"}],
        "zones": [
            {"id": "deck", "kind": "stack", "scope": "per_seat", "visibility": "owner"},
            {"id": "hand", "kind": "list", "scope": "per_seat", "visibility": "owner", "capacity": 2}
        ],
        "setup": [{"op": "spawn", "entity": "card", "to_zone": "deck", "count": 3}],
        "phases": [{"id": "main"}],
        "actions": [{"id": "draw", "effect": [{"op": "move_top", "from_zone": "deck", "to_zone": "hand"}]}],
        "victory": {"order": [{
            "when": {"op": ">=", "args": [{"var": "state.zones.hand.instances.A.items.length"}, 2]},
            "result": "win:A"
        }]}
    })
}

/// Test that compile writes both outputs next to the document.
#[test]
fn test_compile_writes_outputs() {
    let dir = rules_dir(&draw_game());
    let path = dir.path().to_str().unwrap();
    let output = rulekit(&["compile", path, "--seats", "A,B,C", "--seed", "9"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let compiled = read_json(&dir.path().join("compile.out.json"));
    assert_eq!(compiled["ok"], json!(true));
    assert!(compiled["spec_id"].as_str().unwrap().starts_with("sha256:"));
    assert_eq!(compiled["compiled_spec"]["action_order"], json!(["draw"]));

    let started = read_json(&dir.path().join("init.out.json"));
    assert_eq!(started["game_state"]["seats"], json!(["A", "B", "C"]));
    assert_eq!(started["game_state"]["rng_state"], json!("9"));
    assert!(started["state_hash"].as_str().unwrap().starts_with("sha256:"));

    let text = fs::read_to_string(dir.path().join("compile.out.json")).unwrap();
    assert!(text.starts_with("{\n  \""));
}

/// Test the output directory, minified output and default seats.
#[test]
fn test_compile_minify_to_out_dir() {
    let dir = rules_dir(&draw_game());
    let out = TempDir::new().unwrap();
    let output = rulekit(&[
        "compile",
        dir.path().to_str().unwrap(),
        "--minify",
        "-o",
        out.path().to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let text = fs::read_to_string(out.path().join("init.out.json")).unwrap();
    assert_eq!(text.lines().count(), 1);
    let started: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(started["game_state"]["seats"], json!(["A", "B"]));
    assert!(!dir.path().join("compile.out.json").exists());
}

/// Test that compile errors fail the run but still report the issues.
#[test]
fn test_compile_errors_exit_nonzero() {
    let mut doc = draw_game();
    doc["actions"][0]["effect"][0]["to_zone"] = json!("nowhere");
    let dir = rules_dir(&doc);
    let output = rulekit(&["compile", dir.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));

    let compiled = read_json(&dir.path().join("compile.out.json"));
    assert_eq!(compiled["ok"], json!(false));
    assert_eq!(compiled["errors"][0]["code"], json!("REF_NOT_FOUND"));
}

/// Test that a missing document is reported.
#[test]
fn test_missing_document() {
    let dir = TempDir::new().unwrap();
    let output = rulekit(&["compile", dir.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("dsl.json"));
}

/// Test that selfplay prints a JSON summary on stdout.
#[test]
fn test_selfplay_summary() {
    let dir = rules_dir(&draw_game());
    let output = rulekit(&["selfplay", dir.path().to_str().unwrap(), "--episodes", "3"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["episodes"], json!(3));
    assert_eq!(summary["wins"], json!(3));
    assert_eq!(summary["episode_steps"], json!([2, 2, 2]));

    let random = rulekit(&[
        "selfplay",
        dir.path().to_str().unwrap(),
        "--strategy",
        "random",
        "--simulate",
        "--max-steps",
        "10",
    ]);
    assert!(random.status.success());
}
