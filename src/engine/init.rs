//! Initial state construction.
//!
//! `init` builds the empty state the compiled spec describes, seeds its
//! variables, runs the setup plan and checks the state invariants.

use std::collections::BTreeMap;

use im::{OrdMap, Vector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::invariants;
use crate::compiler::spec::CompiledSpec;
use crate::core::action::{Event, Payload};
use crate::core::error::InitError;
use crate::core::rng::GameRng;
use crate::core::state::{GameState, StateMeta, ZoneInstance, ZoneRuntime, ZoneScope};
use crate::core::{SeatId, PUBLIC_OWNER, SYSTEM_SEAT};
use crate::effects::{EffectResolver, ResolverContext};

/// Identifiers that cannot name a seat.
pub const RESERVED_SEATS: &[&str] = &[SYSTEM_SEAT, PUBLIC_OWNER, "by", "active", "seat"];

/// Caller-supplied variable overrides.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(default)]
    pub vars: Map<String, Value>,
    #[serde(default)]
    pub per_seat: BTreeMap<SeatId, Map<String, Value>>,
}

/// Everything needed to start a game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitInput {
    pub seats: Vec<SeatId>,
    pub seed: u64,
    #[serde(default)]
    pub overrides: Overrides,
    /// Wall-clock seconds recorded in `meta.created_at`. Never hashed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
}

impl InitInput {
    pub fn new<I, S>(seats: I, seed: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SeatId>,
    {
        Self {
            seats: seats.into_iter().map(Into::into).collect(),
            seed,
            overrides: Overrides::default(),
            created_at: None,
        }
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Override one global variable.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: Value) -> Self {
        self.overrides.vars.insert(key.into(), value);
        self
    }

    /// Override one variable of one seat.
    #[must_use]
    pub fn with_seat_var(mut self, seat: impl Into<SeatId>, key: impl Into<String>, value: Value) -> Self {
        self.overrides
            .per_seat
            .entry(seat.into())
            .or_default()
            .insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_created_at(mut self, seconds: u64) -> Self {
        self.created_at = Some(seconds);
        self
    }
}

/// A started game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitOutput {
    pub game_state: GameState,
    pub init_events: Vec<Event>,
    pub state_hash: String,
}

/// Build the initial state of a game.
pub fn init(spec: &CompiledSpec, input: &InitInput) -> Result<InitOutput, InitError> {
    check_seats(spec, &input.seats)?;

    let mut state = empty_state(spec, input);
    let payload = Payload::new();
    let mut resolver =
        EffectResolver::new(ResolverContext::new(spec, Some(SYSTEM_SEAT), &payload)).without_rng_budget();
    if let Err(err) = resolver.run(&mut state, &spec.initializers.plan) {
        warn!(spec_id = %spec.spec_id, error = %err, "setup plan failed");
        return Err(InitError::Setup(err));
    }

    let violations = invariants::check(&state);
    if !violations.is_empty() {
        warn!(spec_id = %spec.spec_id, violations = violations.len(), "initial state violates invariants");
        return Err(InitError::InvariantFailedAtInit(violations));
    }

    let state_hash = state.hash()?;
    debug!(
        spec_id = %spec.spec_id,
        seats = state.seats.len(),
        entities = state.entities.len(),
        %state_hash,
        "game initialized"
    );
    Ok(InitOutput {
        game_state: state,
        init_events: vec![Event::setup()],
        state_hash,
    })
}

fn check_seats(spec: &CompiledSpec, seats: &[SeatId]) -> Result<(), InitError> {
    let range = spec.source_meta.seats;
    if !range.admits(seats.len()) {
        return Err(InitError::SeatCount {
            count: seats.len(),
            min: range.min,
            max: range.max,
        });
    }
    for (i, seat) in seats.iter().enumerate() {
        if RESERVED_SEATS.contains(&seat.as_str()) {
            return Err(InitError::ReservedSeat(seat.clone()));
        }
        if seats[..i].contains(seat) {
            return Err(InitError::DuplicateSeat(seat.clone()));
        }
    }
    Ok(())
}

fn empty_state(spec: &CompiledSpec, input: &InitInput) -> GameState {
    let seats: Vector<SeatId> = input.seats.iter().cloned().collect();

    let zones = spec
        .zones_index
        .iter()
        .map(|(id, meta)| {
            let owners: Vec<SeatId> = match meta.scope {
                ZoneScope::Public => vec![PUBLIC_OWNER.to_string()],
                ZoneScope::PerSeat => input.seats.clone(),
            };
            let instances = owners
                .into_iter()
                .map(|owner| (owner, ZoneInstance::empty(meta.kind, meta.size)))
                .collect();
            let runtime = ZoneRuntime {
                kind: meta.kind,
                scope: meta.scope,
                of: meta.of.clone(),
                capacity: meta.capacity,
                size: meta.size,
                instances,
            };
            (id.clone(), runtime)
        })
        .collect();

    let mut vars: OrdMap<String, Value> = spec
        .initializers
        .seed_vars
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (k, v) in &input.overrides.vars {
        vars.insert(k.clone(), v.clone());
    }

    let per_seat = input
        .seats
        .iter()
        .map(|seat| {
            let mut bag: OrdMap<String, Value> = spec
                .initializers
                .seed_per_seat
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if let Some(overrides) = input.overrides.per_seat.get(seat) {
                for (k, v) in overrides {
                    bag.insert(k.clone(), v.clone());
                }
            }
            (seat.clone(), bag)
        })
        .collect();

    GameState {
        phase: spec.phase_graph.initial_phase.clone(),
        turn: 1,
        active_seat: seats.front().cloned(),
        seats,
        vars,
        per_seat,
        entities: OrdMap::new(),
        zones,
        rng_state: GameRng::new(input.seed).state_string(),
        meta: StateMeta {
            created_at: input.created_at,
            ..StateMeta::default()
        },
    }
}
