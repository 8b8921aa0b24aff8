//! Error taxonomy for compilation, initialization and execution.
//!
//! ## Compile time
//!
//! Compilation never fails with a Rust error. Problems are collected as
//! [`Issue`] values (code, JSON-pointer path, message) and the compiler keeps
//! going, dropping only the offending action or step.
//!
//! ## Run time
//!
//! - [`StepError`]: why a call was rejected. The caller's state is untouched.
//! - [`ExecError`]: raised by an effect executor. Resource conditions
//!   (shortage, capacity, occupied cells) are recoverable; anything else
//!   means the compiled spec and the state disagree and is a defect.
//! - [`EvalError`]: malformed or over-budget expressions.
//! - [`InitError`]: the initial state could not be built.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Severity level of an error, used for logging and retry decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// The rules say no right now: retry with a different action or payload.
    Recoverable,

    /// The caller sent something malformed.
    Validation,

    /// The compiled spec and the state disagree. Indicates a bug.
    Internal,
}

impl ErrorSeverity {
    /// Human-readable name of this severity level.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Recoverable => "recoverable",
            Self::Validation => "validation",
            Self::Internal => "internal",
        }
    }

    /// Returns true if this error indicates an internal bug.
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal)
    }
}

// =============================================================================
// Compile-time issues
// =============================================================================

/// Diagnostic code attached to a compile-time [`Issue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    SchemaError,
    RefNotFound,
    KindUnsupported,
    EffectUnsupported,
    InitUnsupported,
}

impl IssueCode {
    /// Wire name of the code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaError => "SCHEMA_ERROR",
            Self::RefNotFound => "REF_NOT_FOUND",
            Self::KindUnsupported => "KIND_UNSUPPORTED",
            Self::EffectUnsupported => "EFFECT_UNSUPPORTED",
            Self::InitUnsupported => "INIT_UNSUPPORTED",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compile-time diagnostic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub code: IssueCode,
    /// JSON-pointer style location, e.g. `/actions/draw/effect/0/count`.
    pub path: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Issue {
    #[must_use]
    pub fn new(code: IssueCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            path: path.into(),
            message: message.into(),
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.code, self.path, self.message)
    }
}

// =============================================================================
// Invariants and payload checks
// =============================================================================

/// Which state invariant was breached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationCode {
    #[serde(rename = "INVARIANT_PER_SEAT_KEYS")]
    PerSeatKeys,
    #[serde(rename = "INVARIANT_ENTITY_LOC_UNIQUE")]
    EntityLocUnique,
    #[serde(rename = "INVARIANT_ZONE_CAPACITY")]
    ZoneCapacity,
}

/// One breached invariant, located by path into the state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub code: ViolationCode,
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// One mismatch between a payload and the action's declared input shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Location inside the payload, `""` for the payload itself.
    pub path: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Run-time errors
// =============================================================================

/// Failure while producing canonical text for hashing.
#[derive(Debug, thiserror::Error)]
#[error("canonical serialization failed: {0}")]
pub struct CanonicalError(#[from] serde_json::Error);

/// Expression parse or evaluation failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("malformed expression: {0}")]
    Malformed(String),

    #[error("malformed path '{path}': {reason}")]
    BadPath { path: String, reason: String },

    #[error("operator '{op}' expects {expected} argument(s), got {got}")]
    Arity {
        op: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("path '{0}' uses 'by' but the call has no actor")]
    MissingActor(String),

    #[error("expression has {nodes} nodes, limit is {limit}")]
    TooManyNodes { nodes: usize, limit: usize },

    #[error("any() over {len} items exceeds the iteration limit {limit}")]
    TooManyIterations { len: usize, limit: usize },
}

/// Failure raised by an effect executor.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    // === Resource conditions ===
    #[error("zone '{zone}' owner '{owner}': need {need}, have {have}")]
    Shortage {
        zone: String,
        owner: String,
        need: usize,
        have: usize,
    },

    #[error("zone '{zone}' owner '{owner}' would exceed capacity {capacity}")]
    CapacityExceeded {
        zone: String,
        owner: String,
        capacity: usize,
    },

    #[error("cell ({x},{y}) of zone '{zone}' is occupied")]
    CellOccupied { zone: String, x: i64, y: i64 },

    #[error("cell ({x},{y}) of zone '{zone}' is empty")]
    CellEmpty { zone: String, x: i64, y: i64 },

    #[error("cell ({x},{y}) is outside zone '{zone}'")]
    OutOfBounds { zone: String, x: i64, y: i64 },

    #[error("entity '{entity}' is not in zone '{zone}' owner '{owner}'")]
    EntityNotInZone {
        entity: String,
        zone: String,
        owner: String,
    },

    #[error("invalid count: {0}")]
    InvalidCount(String),

    // === Defects ===
    #[error("zone '{0}' not found")]
    ZoneNotFound(String),

    #[error("owner '{owner}' not found in zone '{zone}'")]
    OwnerNotFound { zone: String, owner: String },

    #[error("cannot resolve owner token '{0}'")]
    UnresolvedOwner(String),

    #[error("zone '{zone}' of kind '{kind}' does not support {op}")]
    KindMismatch {
        zone: String,
        kind: String,
        op: &'static str,
    },

    #[error("entity definition '{0}' not found")]
    UnknownEntity(String),

    #[error("entity reference must resolve to a string, got {0}")]
    BadEntityRef(String),

    #[error("cell coordinate must resolve to an integer, got {0}")]
    BadCoordinate(String),

    #[error("invalid rng state '{0}'")]
    RngState(String),

    #[error("more than {limit} rng-consuming operations in one step")]
    RngBudgetExceeded { limit: u32 },

    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl ExecError {
    /// Classify this error for logging and retry decisions.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Shortage { .. }
            | Self::CapacityExceeded { .. }
            | Self::CellOccupied { .. }
            | Self::CellEmpty { .. }
            | Self::OutOfBounds { .. }
            | Self::EntityNotInZone { .. } => ErrorSeverity::Recoverable,
            Self::InvalidCount(_) | Self::BadEntityRef(_) | Self::BadCoordinate(_) => {
                ErrorSeverity::Validation
            }
            Self::ZoneNotFound(_)
            | Self::OwnerNotFound { .. }
            | Self::UnresolvedOwner(_)
            | Self::KindMismatch { .. }
            | Self::UnknownEntity(_)
            | Self::RngState(_)
            | Self::RngBudgetExceeded { .. }
            | Self::Eval(_) => ErrorSeverity::Internal,
        }
    }
}

/// Why a step call was rejected.
///
/// In every case the caller keeps its prior state.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("sequence must be last_seq + 1 (last_seq {last_seq}, got {got})")]
    DuplicateSeq { last_seq: u64, got: u64 },

    #[error("'{actual}' is not the active seat")]
    IllegalAction {
        expected: Option<String>,
        actual: String,
    },

    #[error("action '{0}' is not defined")]
    UnknownAction(String),

    #[error("payload rejected: {}", join(.0))]
    BadPayload(Vec<FieldError>),

    #[error("precondition of '{0}' not met")]
    RequireFailed(String),

    #[error("state invariants violated: {}", join(.0))]
    InvariantFailed(Vec<Violation>),

    #[error("effect failed: {0}")]
    Exec(#[from] ExecError),

    #[error("expression failed: {0}")]
    Eval(#[from] EvalError),

    #[error("state serialization failed: {0}")]
    Serialization(String),
}

impl From<CanonicalError> for StepError {
    fn from(err: CanonicalError) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl StepError {
    /// Wire code of this error.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicateSeq { .. } => "DUPLICATE_SEQ",
            Self::IllegalAction { .. } => "ILLEGAL_ACTION",
            Self::UnknownAction(_) => "UNKNOWN_ACTION",
            Self::BadPayload(_) => "BAD_PAYLOAD",
            Self::RequireFailed(_) => "REQUIRE_FAILED",
            Self::InvariantFailed(_) => "INVARIANT_FAILED",
            Self::Exec(_) => "EXEC_ERROR",
            Self::Eval(_) => "EVAL_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Classify this error for logging and retry decisions.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::RequireFailed(_) | Self::InvariantFailed(_) => ErrorSeverity::Recoverable,
            Self::DuplicateSeq { .. }
            | Self::IllegalAction { .. }
            | Self::UnknownAction(_)
            | Self::BadPayload(_) => ErrorSeverity::Validation,
            Self::Exec(err) => err.severity(),
            Self::Eval(_) | Self::Serialization(_) => ErrorSeverity::Internal,
        }
    }

    /// Structured detail for the error record.
    pub fn details(&self) -> Value {
        match self {
            Self::DuplicateSeq { last_seq, got } => json!({ "last_seq": last_seq, "got": got }),
            Self::IllegalAction { expected, actual } => {
                json!({ "expected": expected, "actual": actual })
            }
            Self::UnknownAction(action) | Self::RequireFailed(action) => json!({ "action": action }),
            Self::BadPayload(fields) => json!({ "errors": fields }),
            Self::InvariantFailed(violations) => json!({ "errors": violations }),
            Self::Exec(err) => json!({ "severity": err.severity().as_str() }),
            Self::Eval(_) | Self::Serialization(_) => Value::Null,
        }
    }

    /// Serializable `{code, message, details}` record.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

/// Plain-data view of a rejected call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

/// Failure building the initial state.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("seat '{0}' is listed twice")]
    DuplicateSeat(String),

    #[error("'{0}' is reserved and cannot be used as a seat id")]
    ReservedSeat(String),

    #[error("{count} seats given, the rules allow {min} to {max}")]
    SeatCount { count: usize, min: u32, max: u32 },

    #[error("setup plan failed: {0}")]
    Setup(#[from] ExecError),

    #[error("initial state violates invariants: {}", join(.0))]
    InvariantFailedAtInit(Vec<Violation>),

    #[error("state serialization failed: {0}")]
    Serialization(String),
}

impl From<CanonicalError> for InitError {
    fn from(err: CanonicalError) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl InitError {
    /// Wire code of this error.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicateSeat(_) | Self::ReservedSeat(_) | Self::SeatCount { .. } => "BAD_SEATS",
            Self::Setup(_) => "INIT_SETUP_FAILED",
            Self::InvariantFailedAtInit(_) => "INVARIANT_FAILED_AT_INIT",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}
