//! Effect operations.
//!
//! Effects are the primitive state changes an action pipeline, a trigger
//! or the setup plan is built from. The set is closed: the compiler only
//! emits these variants and the resolver matches them exhaustively.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::owner::OwnerToken;
use crate::core::ZoneId;

/// A board cell reference. Each coordinate is an integer or an expression
/// (e.g. `{"var": "payload.x"}`) evaluated when the op runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellRef {
    pub x: Value,
    pub y: Value,
}

impl CellRef {
    #[must_use]
    pub fn at(x: i64, y: i64) -> Self {
        Self {
            x: Value::from(x),
            y: Value::from(y),
        }
    }
}

/// A normalized effect operation.
///
/// ## Ordered zones
///
/// - `MoveTop`: pop `count` from the source tail, push onto the target tail
/// - `Deal`: `MoveTop` repeated once per seat when either owner is `seat`
/// - `MoveId`: move one entity, named by id, between ordered zones
/// - `Shuffle`: Fisher-Yates shuffle driven by the state RNG
///
/// ## Entity lifecycle
///
/// - `Spawn`: mint new entities into a zone (or onto one board cell)
/// - `Destroy`: pop from a tail and delete the entity records
///
/// ## Boards
///
/// - `MovePiece`: relocate one piece between cells
///
/// ## State fields
///
/// - `SetVar`, `SetPhase`: plain replacement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EffectOp {
    // === Ordered zones ===
    MoveTop {
        from_zone: ZoneId,
        to_zone: ZoneId,
        from_owner: OwnerToken,
        to_owner: OwnerToken,
        count: u32,
    },

    Deal {
        from_zone: ZoneId,
        to_zone: ZoneId,
        from_owner: OwnerToken,
        to_owner: OwnerToken,
        count: u32,
    },

    MoveId {
        from_zone: ZoneId,
        to_zone: ZoneId,
        from_owner: OwnerToken,
        to_owner: OwnerToken,
        /// Entity id literal or expression.
        entity_id: Value,
    },

    Shuffle {
        zone: ZoneId,
        owner: OwnerToken,
    },

    // === Entity lifecycle ===
    Spawn {
        /// Entity definition id.
        entity: String,
        to_zone: ZoneId,
        owner: OwnerToken,
        count: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pos: Option<CellRef>,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        props: Map<String, Value>,
    },

    Destroy {
        from_zone: ZoneId,
        owner: OwnerToken,
        count: u32,
    },

    // === Boards ===
    MovePiece {
        zone: ZoneId,
        owner: OwnerToken,
        from: CellRef,
        to: CellRef,
    },

    // === State fields ===
    SetVar {
        key: String,
        #[serde(default)]
        value: Value,
    },

    SetPhase {
        phase: String,
    },
}

impl EffectOp {
    /// Create a move_top between the actor's instances.
    pub fn move_top(from_zone: impl Into<ZoneId>, to_zone: impl Into<ZoneId>, count: u32) -> Self {
        Self::MoveTop {
            from_zone: from_zone.into(),
            to_zone: to_zone.into(),
            from_owner: OwnerToken::By,
            to_owner: OwnerToken::By,
            count,
        }
    }

    /// Create a deal from the actor's instance to every seat.
    pub fn deal(from_zone: impl Into<ZoneId>, to_zone: impl Into<ZoneId>, count: u32) -> Self {
        Self::Deal {
            from_zone: from_zone.into(),
            to_zone: to_zone.into(),
            from_owner: OwnerToken::By,
            to_owner: OwnerToken::Seat,
            count,
        }
    }

    /// Create a shuffle of the actor's instance.
    pub fn shuffle(zone: impl Into<ZoneId>) -> Self {
        Self::Shuffle {
            zone: zone.into(),
            owner: OwnerToken::By,
        }
    }

    /// Create a spawn of `count` copies of an entity definition.
    pub fn spawn(entity: impl Into<String>, to_zone: impl Into<ZoneId>, count: u32) -> Self {
        Self::Spawn {
            entity: entity.into(),
            to_zone: to_zone.into(),
            owner: OwnerToken::By,
            count,
            pos: None,
            props: Map::new(),
        }
    }

    pub fn set_var(key: impl Into<String>, value: Value) -> Self {
        Self::SetVar {
            key: key.into(),
            value,
        }
    }

    pub fn set_phase(phase: impl Into<String>) -> Self {
        Self::SetPhase { phase: phase.into() }
    }

    /// Wire name of the op.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MoveTop { .. } => "move_top",
            Self::Deal { .. } => "deal",
            Self::MoveId { .. } => "move_id",
            Self::Shuffle { .. } => "shuffle",
            Self::Spawn { .. } => "spawn",
            Self::Destroy { .. } => "destroy",
            Self::MovePiece { .. } => "move_piece",
            Self::SetVar { .. } => "set_var",
            Self::SetPhase { .. } => "set_phase",
        }
    }

    /// Whether running this op draws from the state RNG.
    #[must_use]
    pub const fn consumes_rng(&self) -> bool {
        matches!(self, Self::Shuffle { .. })
    }

    /// The declared `count` of ops that move or create a quantity of entities.
    #[must_use]
    pub fn count(&self) -> Option<u32> {
        match self {
            Self::MoveTop { count, .. }
            | Self::Deal { count, .. }
            | Self::Spawn { count, .. }
            | Self::Destroy { count, .. } => Some(*count),
            _ => None,
        }
    }

    /// Copy of this op with `count` replaced, for ops that carry one.
    #[must_use]
    pub fn with_count(&self, new_count: u32) -> Self {
        let mut op = self.clone();
        match &mut op {
            Self::MoveTop { count, .. }
            | Self::Deal { count, .. }
            | Self::Spawn { count, .. }
            | Self::Destroy { count, .. } => *count = new_count,
            _ => {}
        }
        op
    }
}

/// A normalized pipeline.
pub type Pipeline = Vec<EffectOp>;
