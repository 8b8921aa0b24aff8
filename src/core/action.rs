//! Action calls and replay events.
//!
//! Three shapes travel around the engine:
//! - [`ActionCall`]: a candidate produced by enumeration (`{action, by, payload}`)
//! - [`StepAction`]: what a caller submits to the step engine, with its sequence number
//! - [`Event`]: the replay record returned for an applied step
//!
//! Payloads are open JSON objects; their shape is checked against the
//! action's declared input when stepping.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::SeatId;

/// Payload of an action call.
pub type Payload = Map<String, Value>;

/// A performable action candidate.
///
/// ## Example
///
/// ```
/// use rulekit::core::ActionCall;
/// use serde_json::json;
///
/// let call = ActionCall::new("play", "A").with_field("card", json!("c3"));
/// let step = call.into_step(1);
/// assert_eq!(step.id, "play");
/// assert_eq!(step.payload["card"], "c3");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCall {
    pub action: String,
    pub by: SeatId,
    #[serde(default)]
    pub payload: Payload,
}

impl ActionCall {
    /// Create a call with an empty payload.
    #[must_use]
    pub fn new(action: impl Into<String>, by: impl Into<SeatId>) -> Self {
        Self {
            action: action.into(),
            by: by.into(),
            payload: Payload::new(),
        }
    }

    /// Set a payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Turn this candidate into a step request with the given sequence number.
    #[must_use]
    pub fn into_step(self, seq: u64) -> StepAction {
        StepAction {
            id: self.action,
            by: self.by,
            payload: self.payload,
            seq,
        }
    }
}

/// A step request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAction {
    pub id: String,
    pub by: SeatId,
    #[serde(default)]
    pub payload: Payload,
    pub seq: u64,
}

impl StepAction {
    #[must_use]
    pub fn new(id: impl Into<String>, by: impl Into<SeatId>, seq: u64) -> Self {
        Self {
            id: id.into(),
            by: by.into(),
            payload: Payload::new(),
            seq,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }
}

/// Replay record of an applied step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub by: SeatId,
    pub id: String,
    pub payload: Payload,
    /// Logical timestamp; equal to `seq` for applied steps, 0 for setup.
    pub ts_logical: u64,
}

impl Event {
    /// The event recorded for an applied step.
    #[must_use]
    pub fn for_step(action: &StepAction) -> Self {
        Self {
            seq: action.seq,
            by: action.by.clone(),
            id: action.id.clone(),
            payload: action.payload.clone(),
            ts_logical: action.seq,
        }
    }

    /// The single event recorded at initialization.
    #[must_use]
    pub fn setup() -> Self {
        Self {
            seq: 0,
            by: super::SYSTEM_SEAT.to_string(),
            id: "setup".to_string(),
            payload: Payload::new(),
            ts_logical: 0,
        }
    }
}
