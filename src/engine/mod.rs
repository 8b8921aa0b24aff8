//! Game execution over a compiled spec.
//!
//! - [`init`]: build the initial state and run the setup plan
//! - [`step`]: apply one action, all-or-nothing
//! - [`evaluate_victory`]: decide whether the game is over
//!
//! Every operation is a synchronous function of its inputs. States are
//! never edited after they are returned; each call works on a clone.

pub mod init;
pub mod invariants;
pub mod payload;
pub mod step;
pub mod victory;

pub use init::{init, InitInput, InitOutput, Overrides, RESERVED_SEATS};
pub use payload::validate_payload;
pub use step::{advance_turn, step, StepOutput, Transition};
pub use victory::{evaluate_victory, VictoryOutcome, VictoryResult};
