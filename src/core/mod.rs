//! Core engine types: identifiers, canonical hashing, RNG, state, calls, errors.
//!
//! Everything here is independent of any particular rule set. The compiler
//! and engine layers build on these types; nothing in `core` depends on them.

pub mod action;
pub mod canonical;
pub mod error;
pub mod owner;
pub mod rng;
pub mod state;

/// Seat identifier as written in the rule document (`"A"`, `"north"`, ...).
pub type SeatId = String;

/// Zone identifier.
pub type ZoneId = String;

/// Entity identifier. Seeded entities use arbitrary ids, minted ones are `e{n}`.
pub type EntityId = String;

/// Reserved actor identity allowed to act regardless of the active seat.
pub const SYSTEM_SEAT: &str = "system";

/// Instance key used by public zones.
pub const PUBLIC_OWNER: &str = "_";

pub use action::{ActionCall, Event, Payload, StepAction};
pub use canonical::{canonical_string, canonicalize, digest, hash_of, hash_value};
pub use error::{
    CanonicalError, ErrorReport, ErrorSeverity, EvalError, ExecError, FieldError, InitError, Issue,
    IssueCode, StepError, Violation, ViolationCode,
};
pub use owner::{instance_key_for, OwnerToken, Owners};
pub use rng::{mix_seed, GameRng};
pub use state::{
    BoardSize, Cells, EntityRecord, GameState, StateMeta, Visibility, ZoneInstance, ZoneKind,
    ZoneRuntime, ZoneScope,
};
