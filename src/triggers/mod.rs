//! Trigger pipelines run after actions.
//!
//! A rule document may attach one or more pipelines to an action; they run
//! after the action's own pipeline, on the same working state and within
//! the same RNG budget.
//!
//! ## Key Components
//!
//! - [`TriggerKey`]: `after:{action}` index key
//! - [`TriggerRegistry`]: lookup and execution over the compiled spec

mod registry;

pub use registry::{TriggerKey, TriggerRegistry, TriggerTiming};
