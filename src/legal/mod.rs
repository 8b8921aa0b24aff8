//! Legal-action enumeration.
//!
//! Derives the calls a seat can currently make, with concrete payloads,
//! without touching the state.
//!
//! ## Modes
//!
//! - [`EnumerationMode::RequireOnly`] (default): candidates come from the
//!   declared `input_enum` sources and are filtered by `require`
//! - [`EnumerationMode::Simulate`]: actions without `input_enum` also offer
//!   one `payload.count` per quantity their first resource op can move

mod enumerate;
mod options;
pub mod simulate;

pub use enumerate::legal_actions;
pub use options::{Caps, EnumerateOptions, EnumerationMode};
