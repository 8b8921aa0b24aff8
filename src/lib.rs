//! # rulekit
//!
//! A declarative game-rule compiler and deterministic execution engine.
//!
//! ## Design Principles
//!
//! 1. **Rules Are Data**: A game is a JSON document naming entities, zones,
//!    phases, actions and victory rules. Nothing about a particular game is
//!    hardcoded in the engine.
//!
//! 2. **Content-Addressed**: A compiled spec and every game state have a
//!    canonical SHA-256 hash. The same document always yields the same
//!    `spec_id`; the same seed and calls always yield the same state hashes.
//!
//! 3. **All-or-Nothing Steps**: A step either returns a new state or a
//!    structured error. The caller's state is never modified.
//!
//! ## Architecture
//!
//! - **Closed Effect Set**: Effects compile to a fixed [`EffectOp`] sum
//!   type; anything else is rejected at compile time, not at run time.
//!
//! - **Persistent Data Structures**: O(1) state cloning via `im-rs`, so
//!   every step works on its own copy.
//!
//! - **Bounded Evaluation**: Expressions are interpreted against a fixed
//!   path grammar under node, iteration and RNG budgets.
//!
//! ## Modules
//!
//! - `core`: identifiers, canonical hashing, RNG, state, calls, errors
//! - `dsl`: the typed source document and its validator
//! - `compiler`: document to [`CompiledSpec`]
//! - `expr`: expression AST and evaluator
//! - `zones`: zone instance operations
//! - `effects`: effect ops and the pipeline resolver
//! - `triggers`: `after:{action}` trigger pipelines
//! - `engine`: init, step, invariants, victory
//! - `legal`: legal-action enumeration
//! - `selfplay`: strategies and the self-play runner

pub mod core;
pub mod dsl;
pub mod compiler;
pub mod expr;
pub mod zones;
pub mod effects;
pub mod triggers;
pub mod engine;
pub mod legal;
pub mod selfplay;

// Re-export commonly used types
pub use crate::core::{
    ActionCall, Event, Payload, StepAction,
    GameState, GameRng, ZoneKind, ZoneScope, Visibility,
    Issue, IssueCode, StepError, InitError, ExecError, EvalError, ErrorReport,
    canonical_string, digest, hash_value,
};

pub use crate::compiler::{compile, CompileOutput, CompiledSpec};

pub use crate::effects::{EffectOp, EffectResolver, Pipeline};

pub use crate::engine::{
    init, step, evaluate_victory,
    InitInput, InitOutput, StepOutput, Transition, VictoryOutcome, VictoryResult,
};

pub use crate::legal::{legal_actions, Caps, EnumerateOptions, EnumerationMode};

pub use crate::selfplay::{self_play, SelfPlayConfig, SelfPlaySummary, Strategy, StrategyKind, StrategyTable};
