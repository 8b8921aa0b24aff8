//! Trigger registry.
//!
//! The registry is a read-only view over the compiled spec's
//! `triggers_index`. The step engine asks it for the pipelines registered
//! after an action and runs them through the same resolver as the action's
//! own pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compiler::spec::CompiledSpec;
use crate::core::error::ExecError;
use crate::core::state::GameState;
use crate::effects::{EffectResolver, Pipeline};

/// When, relative to an action, a trigger fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerTiming {
    /// After the action's pipeline succeeded.
    #[default]
    After,
}

impl TriggerTiming {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::After => "after",
        }
    }
}

/// Index key of a trigger list, written `after:{action}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TriggerKey {
    pub timing: TriggerTiming,
    pub action: String,
}

impl TriggerKey {
    #[must_use]
    pub fn after(action: impl Into<String>) -> Self {
        Self {
            timing: TriggerTiming::After,
            action: action.into(),
        }
    }

    /// Parse an index key. Unknown timings yield `None`.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let (timing, action) = key.split_once(':')?;
        match timing {
            "after" if !action.is_empty() => Some(Self::after(action)),
            _ => None,
        }
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.timing.as_str(), self.action)
    }
}

/// Lookup of compiled trigger pipelines.
#[derive(Clone, Copy, Debug)]
pub struct TriggerRegistry<'a> {
    index: &'a BTreeMap<String, Vec<Pipeline>>,
}

impl<'a> TriggerRegistry<'a> {
    #[must_use]
    pub fn new(spec: &'a CompiledSpec) -> Self {
        Self {
            index: &spec.triggers_index,
        }
    }

    /// Pipelines registered under a key, in registration order.
    #[must_use]
    pub fn pipelines(&self, key: &TriggerKey) -> &'a [Pipeline] {
        self.index
            .get(&key.to_string())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Run every pipeline registered after `action`.
    ///
    /// Returns how many pipelines ran.
    pub fn fire_after(
        &self,
        action: &str,
        resolver: &mut EffectResolver<'_>,
        state: &mut GameState,
    ) -> Result<usize, ExecError> {
        let key = TriggerKey::after(action);
        let pipelines = self.pipelines(&key);
        for pipeline in pipelines {
            resolver.run(state, pipeline)?;
        }
        if !pipelines.is_empty() {
            debug!(trigger = %key, pipelines = pipelines.len(), "triggers fired");
        }
        Ok(pipelines.len())
    }
}
