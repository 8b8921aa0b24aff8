//! Effect system for rule pipelines.
//!
//! - `EffectOp`: the closed set of primitive operations
//! - `EffectResolver`: executes ops on a working game state
//!
//! ## Design Philosophy
//!
//! Ops are game-agnostic. They move entity ids between zone instances,
//! mint and delete entities and replace plain state fields; the rule
//! document gives zones and variables their meaning.

mod effect;
mod resolver;

pub use effect::{CellRef, EffectOp, Pipeline};
pub use resolver::{EffectResolver, ResolverContext};
