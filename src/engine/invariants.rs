//! State invariants checked at initialization and after every step.
//!
//! Every breach is collected; nothing short-circuits, so one failing
//! transition reports all of its problems at once.

use rustc_hash::FxHashSet;

use crate::core::error::{Violation, ViolationCode};
use crate::core::state::{GameState, ZoneScope};

/// Check every invariant and return the breaches, in zone order.
#[must_use]
pub fn check(state: &GameState) -> Vec<Violation> {
    let mut violations = Vec::new();
    per_seat_keys(state, &mut violations);
    entity_locations(state, &mut violations);
    capacities(state, &mut violations);
    violations
}

/// Per-seat zones hold exactly one instance per seat.
fn per_seat_keys(state: &GameState, out: &mut Vec<Violation>) {
    let seats: FxHashSet<&str> = state.seats.iter().map(String::as_str).collect();
    for (zone_id, zone) in &state.zones {
        if zone.scope != ZoneScope::PerSeat {
            continue;
        }
        let same = zone.instances.len() == seats.len()
            && zone.instances.keys().all(|k| seats.contains(k.as_str()));
        if !same {
            let keys: Vec<&str> = zone.instances.keys().map(String::as_str).collect();
            out.push(Violation {
                code: ViolationCode::PerSeatKeys,
                path: format!("/zones/{zone_id}/instances"),
                message: format!(
                    "zone '{zone_id}' instance keys {keys:?} != seats {:?}",
                    state.seats.iter().collect::<Vec<_>>()
                ),
            });
        }
    }
}

/// No entity sits in two places. Every occurrence after the first is reported.
fn entity_locations(state: &GameState, out: &mut Vec<Violation>) {
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    for (zone_id, zone) in &state.zones {
        for (owner, instance) in &zone.instances {
            for (position, entity) in instance.occupants() {
                if !seen.insert(entity.as_str()) {
                    out.push(Violation {
                        code: ViolationCode::EntityLocUnique,
                        path: format!("/zones/{zone_id}/instances/{owner}/{position}"),
                        message: format!("entity '{entity}' appears in more than one place"),
                    });
                }
            }
        }
    }
}

fn capacities(state: &GameState, out: &mut Vec<Violation>) {
    for (zone_id, zone) in &state.zones {
        let Some(capacity) = zone.capacity else {
            continue;
        };
        for (owner, instance) in &zone.instances {
            let held = instance.len();
            if held > capacity {
                out.push(Violation {
                    code: ViolationCode::ZoneCapacity,
                    path: format!("/zones/{zone_id}/instances/{owner}/items"),
                    message: format!(
                        "zone '{zone_id}' owner '{owner}' holds {held}, capacity {capacity}"
                    ),
                });
            }
        }
    }
}
