//! Rule documents as authors write them.
//!
//! [`validate`] checks a raw JSON document and produces either a typed
//! [`Document`] or every structural problem found, each as a `SCHEMA_ERROR`
//! issue located by JSON pointer.

pub mod document;
pub mod validate;

pub use document::{
    ActionDecl, Document, EntityDecl, Metadata, PerSeatDecl, PhaseDecl, SeatRange, StateDecl,
    TransitionDecl, VictoryDecl, VictoryRuleDecl, ZoneDecl,
};
pub use validate::validate;
