//! Enumeration and self-play integration tests.
//!
//! The fixture is a take-away game: seven stones in a public pile, each
//! turn the active seat removes one or two, and whoever empties the pile
//! while active wins.

use rulekit::{
    compile, init, legal_actions, self_play, step, CompiledSpec, EnumerateOptions, EnumerationMode,
    GameState, InitInput, SelfPlayConfig, StrategyKind, StrategyTable,
};
use serde_json::json;

fn take_away() -> CompiledSpec {
    let pile = json!({"var": "state.zones.pile.instances._.items.length"});
    let output = compile(&json!({
        "schema_version": 1,
        "engine_compat": ">=1.0",
        "id": "take-away",
        "name": "Take Away",
        "metadata": {"seats": {"min": 2, "max": 2}},
        "entities": [{"id": "stone"}],
        "zones": [{"id": "pile", "kind": "stack", "scope": "public", "visibility": "all"}],
        "setup": [{"op": "spawn", "entity": "stone", "to_zone": "pile", "owner": "A", "count": 7}],
        "phases": [{"id": "play"}],
        "actions": [{
            "id": "take",
            "input": {"type": "object", "properties": {"count": {"enum": [1, 2]}}, "required": ["count"]},
            "require": {"op": ">=", "args": [pile.clone(), {"var": "payload.count"}]},
            "effect": [{"op": "destroy", "from_zone": "pile"}]
        }],
        "victory": {"order": [
            {
                "when": {"op": "and", "args": [
                    {"op": "==", "args": [pile.clone(), 0]},
                    {"op": "==", "args": [{"var": "state.active_seat"}, "A"]}
                ]},
                "result": "win:A"
            },
            {"when": {"op": "==", "args": [pile, 0]}, "result": "win:B"}
        ]}
    }));
    assert!(output.ok, "unexpected issues: {:?}", output.errors);
    output.compiled_spec.expect("spec")
}

fn started(spec: &CompiledSpec) -> GameState {
    init(spec, &InitInput::new(["A", "B"], 1)).expect("init").game_state
}

/// Test the candidate list of the opening position.
#[test]
fn test_opening_candidates() {
    let spec = take_away();
    let state = started(&spec);
    assert_eq!(state.items("pile", "_").unwrap().len(), 7);

    let calls = legal_actions(&spec, &state, "A", &EnumerateOptions::default()).unwrap();
    let listed: Vec<_> = calls
        .iter()
        .map(|c| (c.action.as_str(), c.payload.get("count").cloned()))
        .collect();
    assert_eq!(
        listed,
        vec![("take", Some(json!(1))), ("take", Some(json!(2))), ("end_turn", None)]
    );
    assert!(legal_actions(&spec, &state, "B", &EnumerateOptions::default()).unwrap().is_empty());
}

/// Test that the precondition filters payloads as the pile shrinks.
#[test]
fn test_require_filters_counts() {
    let spec = take_away();
    let mut state = started(&spec);
    state.set_items("pile", "_", ["s1"]).unwrap();
    let calls = legal_actions(&spec, &state, "A", &EnumerateOptions::default()).unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].payload["count"], json!(1));
    assert_eq!(calls[1].action, "end_turn");

    let simulated = legal_actions(
        &spec,
        &state,
        "A",
        &EnumerateOptions::new().with_mode(EnumerationMode::Simulate),
    )
    .unwrap();
    assert_eq!(simulated, calls);
}

/// Test that every enumerated candidate is accepted by the step engine.
#[test]
fn test_candidates_always_step() {
    let spec = take_away();
    let mut state = started(&spec);
    for turn in 0..12 {
        let seat = state.active_seat.clone().unwrap();
        let calls = legal_actions(&spec, &state, &seat, &EnumerateOptions::default()).unwrap();
        assert!(!calls.is_empty());
        for call in &calls {
            let action = call.clone().into_step(state.meta.last_seq + 1);
            assert!(step(&spec, &state, &action).is_ok(), "turn {turn}: {call:?}");
        }
        // Alternate between taking and passing.
        let pick = calls[turn % calls.len()].clone();
        state = step(&spec, &state, &pick.into_step(state.meta.last_seq + 1)).unwrap().next_state;
        if state.items("pile", "_").unwrap().is_empty() {
            break;
        }
    }
}

/// Test that the first strategy empties the pile on A's first turn.
#[test]
fn test_first_strategy_summary() {
    let spec = take_away();
    let config = SelfPlayConfig::new().with_episodes(3).with_trajectory(true);
    let summary = self_play(&spec, &config, &mut StrategyTable::new()).unwrap();

    assert_eq!(summary.wins, 3);
    assert_eq!(summary.episode_steps, vec![7, 7, 7]);
    assert_eq!(summary.action_hits["take"], 21);
    assert_eq!(summary.branch_hits["victory:0:win:A"], 3);
    assert_eq!(summary.trajectories.as_ref().unwrap()[2].len(), 7);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["wins"], json!(3));
    assert_eq!(json["no_action"], json!(0));
}

/// Test that random self-play is reproducible and always terminates cleanly.
#[test]
fn test_random_selfplay() {
    let spec = take_away();
    let config = SelfPlayConfig::new()
        .with_episodes(8)
        .with_max_steps(200)
        .with_seed_offset(100);
    let run = || {
        let mut strategies = StrategyTable::uniform(StrategyKind::Random, &config.seats, 5);
        self_play(&spec, &config, &mut strategies).unwrap()
    };

    let summary = run();
    assert_eq!(summary, run());
    assert_eq!(summary.episodes, 8);
    assert_eq!(summary.violations, 0);
    assert_eq!(summary.wins + summary.ties + summary.losses, 8);
    assert_eq!(summary.episode_steps.iter().sum::<usize>(), summary.steps);
}
