//! Zone storage operations.
//!
//! Zones are declared by the rule document, never hardcoded. Their runtime
//! records live in `GameState::zones` (see [`crate::core::state`]); this
//! module holds the checked primitive moves the effect executors use.
//!
//! ## Key Types
//!
//! - `ZoneManager`: Shortage/capacity-checked moves on a working state
//! - `CellPos`: A board coordinate

pub mod manager;

pub use manager::{CellPos, ZoneManager};
