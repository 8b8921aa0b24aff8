//! Expression language used by preconditions, victory rules and filters.
//!
//! - `ast`: the closed set of expression shapes and operators
//! - `path`: the variable path grammar and its resolver
//! - `eval`: evaluation with an optional node/iteration budget

pub mod ast;
pub mod eval;
pub mod path;

pub use ast::{Expr, Operator};
pub use eval::{loose_eq, truthy, EvalContext, Evaluator, ITEM_BINDING};
pub use path::{Path, PathRoot, Segment};
