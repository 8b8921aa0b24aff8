//! Enumeration knobs.

use serde::{Deserialize, Serialize};

/// Limits on how many candidates the enumerator keeps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caps {
    /// Payload variants kept per action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_action: Option<usize>,
    /// Candidates kept overall.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

/// How candidates for actions without `input_enum` are produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumerationMode {
    /// One empty-payload candidate, kept if `require` holds.
    #[default]
    RequireOnly,
    /// One candidate per feasible `count` of the first resource op.
    Simulate,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerateOptions {
    #[serde(default)]
    pub caps: Caps,
    #[serde(default)]
    pub mode: EnumerationMode,
}

impl EnumerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_per_action_cap(mut self, cap: usize) -> Self {
        self.caps.per_action = Some(cap);
        self
    }

    #[must_use]
    pub fn with_total_cap(mut self, cap: usize) -> Self {
        self.caps.total = Some(cap);
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: EnumerationMode) -> Self {
        self.mode = mode;
        self
    }
}
