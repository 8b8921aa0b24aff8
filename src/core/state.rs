//! Game state: the value threaded through every transition.
//!
//! ## GameState
//!
//! - Phase, turn, seats and the active seat
//! - Global `vars` and per-seat variables
//! - Entity records (type + property bag)
//! - Zone runtimes, one instance per owner
//! - Carried RNG state and bookkeeping `meta`
//!
//! All collections are `im` persistent structures, so the step engine can
//! clone a state in O(1), work on the copy and drop it on failure. A state
//! value that has been handed back to a caller is never edited again.
//!
//! ## Instance keys
//!
//! A `public` zone has exactly one instance keyed `"_"`; a `per_seat` zone
//! has exactly one instance per seat, keyed by seat id.

use std::fmt;

use im::{OrdMap, Vector};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::canonical::hash_value;
use super::error::{CanonicalError, ExecError};
use super::{EntityId, SeatId, ZoneId};

/// Storage discipline of a zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    // === Ordered lists (top = tail) ===
    Stack,
    Queue,
    List,

    // === Unordered ===
    Set,

    // === Boards (2-D cells) ===
    Grid,
    Hexgrid,
    Track,
}

impl ZoneKind {
    /// Kinds that support positional ops (move_top, shuffle, move_id).
    #[must_use]
    pub const fn is_ordered(self) -> bool {
        matches!(self, Self::Stack | Self::Queue | Self::List)
    }

    /// Kinds that store a `cells` grid instead of an `items` list.
    #[must_use]
    pub const fn is_board(self) -> bool {
        matches!(self, Self::Grid | Self::Hexgrid | Self::Track)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stack => "stack",
            Self::Queue => "queue",
            Self::List => "list",
            Self::Set => "set",
            Self::Grid => "grid",
            Self::Hexgrid => "hexgrid",
            Self::Track => "track",
        }
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a zone has one shared instance or one per seat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneScope {
    Public,
    PerSeat,
}

/// Who may read a zone's contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Owner,
    All,
    None,
    Custom,
}

/// Declared dimensions of a board zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoardSize {
    pub width: usize,
    pub height: usize,
}

/// A board cell grid, indexed `cells[y][x]`.
pub type Cells = Vec<Vec<Option<EntityId>>>;

/// One owner's storage slot in a zone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZoneInstance {
    Items { kind: ZoneKind, items: Vector<EntityId> },
    Cells { kind: ZoneKind, cells: Cells },
}

impl ZoneInstance {
    /// An empty instance of the given kind.
    ///
    /// Boards with a declared size start as a grid of empty cells; boards
    /// without one start with no rows and grow as pieces are placed.
    #[must_use]
    pub fn empty(kind: ZoneKind, size: Option<BoardSize>) -> Self {
        if kind.is_board() {
            let cells = size
                .map(|s| vec![vec![None; s.width]; s.height])
                .unwrap_or_default();
            Self::Cells { kind, cells }
        } else {
            Self::Items {
                kind,
                items: Vector::new(),
            }
        }
    }

    #[must_use]
    pub fn kind(&self) -> ZoneKind {
        match self {
            Self::Items { kind, .. } | Self::Cells { kind, .. } => *kind,
        }
    }

    /// The ordered item list, if this is not a board.
    #[must_use]
    pub fn items(&self) -> Option<&Vector<EntityId>> {
        match self {
            Self::Items { items, .. } => Some(items),
            Self::Cells { .. } => None,
        }
    }

    pub fn items_mut(&mut self) -> Option<&mut Vector<EntityId>> {
        match self {
            Self::Items { items, .. } => Some(items),
            Self::Cells { .. } => None,
        }
    }

    #[must_use]
    pub fn cells(&self) -> Option<&Cells> {
        match self {
            Self::Cells { cells, .. } => Some(cells),
            Self::Items { .. } => None,
        }
    }

    pub fn cells_mut(&mut self) -> Option<&mut Cells> {
        match self {
            Self::Cells { cells, .. } => Some(cells),
            Self::Items { .. } => None,
        }
    }

    /// Number of entities held (items, or occupied cells).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Items { items, .. } => items.len(),
            Self::Cells { cells, .. } => cells.iter().flatten().filter(|c| c.is_some()).count(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every held entity with its position path suffix
    /// (`items/3` or `cells/1/2`).
    #[must_use]
    pub fn occupants(&self) -> Vec<(String, &EntityId)> {
        match self {
            Self::Items { items, .. } => items
                .iter()
                .enumerate()
                .map(|(i, id)| (format!("items/{i}"), id))
                .collect(),
            Self::Cells { cells, .. } => cells
                .iter()
                .enumerate()
                .flat_map(|(y, row)| {
                    row.iter()
                        .enumerate()
                        .filter_map(move |(x, cell)| cell.as_ref().map(|id| (format!("cells/{y}/{x}"), id)))
                })
                .collect(),
        }
    }
}

/// Runtime record of one zone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneRuntime {
    pub kind: ZoneKind,
    pub scope: ZoneScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub of: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<BoardSize>,
    pub instances: OrdMap<SeatId, ZoneInstance>,
}

impl ZoneRuntime {
    /// Get an owner's instance.
    pub fn instance(&self, zone: &str, owner: &str) -> Result<&ZoneInstance, ExecError> {
        self.instances.get(owner).ok_or_else(|| ExecError::OwnerNotFound {
            zone: zone.to_string(),
            owner: owner.to_string(),
        })
    }

    /// Total entities held across all instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.values().map(ZoneInstance::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A minted or seeded entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_type: String,
    #[serde(default)]
    pub props: OrdMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl EntityRecord {
    #[must_use]
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            props: OrdMap::new(),
            tags: None,
        }
    }

    #[must_use]
    pub fn with_props(mut self, props: OrdMap<String, Value>) -> Self {
        self.props = props;
        self
    }
}

/// Bookkeeping carried alongside the game data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMeta {
    pub schema_version: u32,
    /// Wall-clock creation time in seconds. Never hashed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    /// Sequence number of the last applied step (0 after init).
    pub last_seq: u64,
    /// Counter for minted entity ids.
    pub next_eid: u64,
}

impl Default for StateMeta {
    fn default() -> Self {
        Self {
            schema_version: 1,
            created_at: None,
            last_seq: 0,
            next_eid: 1,
        }
    }
}

/// Complete game state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub phase: String,
    pub turn: u32,
    pub seats: Vector<SeatId>,
    pub active_seat: Option<SeatId>,
    pub vars: OrdMap<String, Value>,
    pub per_seat: OrdMap<SeatId, OrdMap<String, Value>>,
    pub entities: OrdMap<EntityId, EntityRecord>,
    pub zones: OrdMap<ZoneId, ZoneRuntime>,
    pub rng_state: String,
    pub meta: StateMeta,
}

impl GameState {
    /// Canonical hash of this state, ignoring `meta.created_at`.
    pub fn hash(&self) -> Result<String, CanonicalError> {
        let mut value = serde_json::to_value(self)?;
        if let Some(meta) = value.get_mut("meta").and_then(Value::as_object_mut) {
            meta.remove("created_at");
        }
        Ok(hash_value(&value))
    }

    /// Look up a zone.
    pub fn zone(&self, zone: &str) -> Result<&ZoneRuntime, ExecError> {
        self.zones
            .get(zone)
            .ok_or_else(|| ExecError::ZoneNotFound(zone.to_string()))
    }

    /// Look up one owner's instance of a zone.
    pub fn instance(&self, zone: &str, owner: &str) -> Result<&ZoneInstance, ExecError> {
        self.zone(zone)?.instance(zone, owner)
    }

    /// Mutable access to one owner's instance of a zone.
    pub fn instance_mut(&mut self, zone: &str, owner: &str) -> Result<&mut ZoneInstance, ExecError> {
        let runtime = self
            .zones
            .get_mut(zone)
            .ok_or_else(|| ExecError::ZoneNotFound(zone.to_string()))?;
        runtime
            .instances
            .get_mut(owner)
            .ok_or_else(|| ExecError::OwnerNotFound {
                zone: zone.to_string(),
                owner: owner.to_string(),
            })
    }

    /// Item list of an instance, if the zone, owner and list exist.
    #[must_use]
    pub fn items(&self, zone: &str, owner: &str) -> Option<&Vector<EntityId>> {
        self.zones.get(zone)?.instances.get(owner)?.items()
    }

    /// Replace the items of an ordered or set instance.
    ///
    /// Used to seed scenarios directly; entity records are not created.
    pub fn set_items<I, S>(&mut self, zone: &str, owner: &str, items: I) -> Result<(), ExecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<EntityId>,
    {
        let instance = self.instance_mut(zone, owner)?;
        let kind = instance.kind();
        let list = instance.items_mut().ok_or_else(|| ExecError::KindMismatch {
            zone: zone.to_string(),
            kind: kind.to_string(),
            op: "set_items",
        })?;
        *list = items.into_iter().map(Into::into).collect();
        Ok(())
    }

    /// Total entities held across every zone.
    #[must_use]
    pub fn zone_population(&self) -> usize {
        self.zones.values().map(ZoneRuntime::len).sum()
    }

    /// Position of a seat in turn order.
    #[must_use]
    pub fn seat_index(&self, seat: &str) -> Option<usize> {
        self.seats.iter().position(|s| s == seat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> GameState {
        let mut instances = OrdMap::new();
        instances.insert("A".to_string(), ZoneInstance::empty(ZoneKind::Stack, None));
        instances.insert("B".to_string(), ZoneInstance::empty(ZoneKind::Stack, None));
        let mut zones = OrdMap::new();
        zones.insert(
            "deck".to_string(),
            ZoneRuntime {
                kind: ZoneKind::Stack,
                scope: ZoneScope::PerSeat,
                of: None,
                capacity: None,
                size: None,
                instances,
            },
        );

        GameState {
            phase: "main".into(),
            turn: 1,
            seats: Vector::from(vec!["A".to_string(), "B".to_string()]),
            active_seat: Some("A".into()),
            vars: OrdMap::new(),
            per_seat: OrdMap::new(),
            entities: OrdMap::new(),
            zones,
            rng_state: "42".into(),
            meta: StateMeta::default(),
        }
    }

    #[test]
    fn test_kind_classes() {
        assert!(ZoneKind::Stack.is_ordered());
        assert!(!ZoneKind::Set.is_ordered());
        assert!(!ZoneKind::Set.is_board());
        assert!(ZoneKind::Hexgrid.is_board());
    }

    #[test]
    fn test_hash_ignores_created_at() {
        let state = sample_state();
        let mut stamped = state.clone();
        stamped.meta.created_at = Some(1_700_000_000);
        assert_eq!(state.hash().unwrap(), stamped.hash().unwrap());
    }

    #[test]
    fn test_hash_tracks_content() {
        let state = sample_state();
        let mut changed = state.clone();
        changed.set_items("deck", "A", ["c1"]).unwrap();
        assert_ne!(state.hash().unwrap(), changed.hash().unwrap());
    }

    #[test]
    fn test_clone_is_independent() {
        let state = sample_state();
        let mut copy = state.clone();
        copy.set_items("deck", "A", ["c1", "c2"]).unwrap();
        assert!(state.items("deck", "A").unwrap().is_empty());
        assert_eq!(copy.items("deck", "A").unwrap().len(), 2);
        assert_eq!(copy.zone_population(), 2);
    }

    #[test]
    fn test_instance_errors() {
        let state = sample_state();
        assert!(matches!(state.instance("hand", "A"), Err(ExecError::ZoneNotFound(_))));
        assert!(matches!(state.instance("deck", "C"), Err(ExecError::OwnerNotFound { .. })));
    }

    #[test]
    fn test_board_instance_serializes_cells() {
        let board = ZoneInstance::empty(ZoneKind::Grid, Some(BoardSize { width: 2, height: 1 }));
        let value = serde_json::to_value(&board).unwrap();
        assert_eq!(value, serde_json::json!({"kind": "grid", "cells": [[null, null]]}));
        let back: ZoneInstance = serde_json::from_value(value).unwrap();
        assert_eq!(back, board);
    }
}
