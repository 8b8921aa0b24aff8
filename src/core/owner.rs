//! Owner tokens and instance-key resolution.
//!
//! Every op that names a zone instance carries an owner token:
//!
//! - `by`: the acting seat of the current call
//! - `active`: the state's active seat
//! - `seat`: every seat, in seat order (only meaningful to ops that iterate)
//! - anything else: a literal seat id, used as-is
//!
//! Tokens are kept verbatim in the compiled spec and resolved only when an
//! op executes. Public zones ignore the owner and always use the `"_"` instance.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::error::ExecError;
use super::state::{GameState, ZoneScope};
use super::{SeatId, PUBLIC_OWNER};

/// Concrete instance keys an op applies to, in application order.
pub type Owners = SmallVec<[SeatId; 4]>;

/// An unresolved owner reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OwnerToken {
    By,
    Active,
    Seat,
    Literal(SeatId),
}

impl OwnerToken {
    /// Parse a token as written in the document.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        match token {
            "by" => Self::By,
            "active" => Self::Active,
            "seat" => Self::Seat,
            other => Self::Literal(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::By => "by",
            Self::Active => "active",
            Self::Seat => "seat",
            Self::Literal(seat) => seat,
        }
    }

    /// True for the seat-iteration marker.
    #[must_use]
    pub fn is_each_seat(&self) -> bool {
        matches!(self, Self::Seat)
    }

    /// Resolve to a single seat.
    ///
    /// `seat` cannot resolve to one seat and is rejected; callers that
    /// iterate must use [`OwnerToken::expand`].
    pub fn resolve(&self, by: Option<&str>, state: &GameState) -> Result<SeatId, ExecError> {
        match self {
            Self::By => by
                .map(str::to_string)
                .ok_or_else(|| ExecError::UnresolvedOwner(self.as_str().to_string())),
            Self::Active => state
                .active_seat
                .clone()
                .ok_or_else(|| ExecError::UnresolvedOwner(self.as_str().to_string())),
            Self::Seat => Err(ExecError::UnresolvedOwner(self.as_str().to_string())),
            Self::Literal(seat) => Ok(seat.clone()),
        }
    }

    /// Resolve to every seat the token stands for.
    pub fn expand(&self, by: Option<&str>, state: &GameState) -> Result<Owners, ExecError> {
        match self {
            Self::Seat => Ok(state.seats.iter().cloned().collect()),
            _ => Ok(SmallVec::from_elem(self.resolve(by, state)?, 1)),
        }
    }

    /// Resolve to the instance key of a zone with the given scope.
    pub fn instance_key(
        &self,
        scope: ZoneScope,
        by: Option<&str>,
        state: &GameState,
    ) -> Result<SeatId, ExecError> {
        match scope {
            ZoneScope::Public => Ok(PUBLIC_OWNER.to_string()),
            ZoneScope::PerSeat => self.resolve(by, state),
        }
    }
}

/// Map a resolved seat onto the instance key of a zone with the given scope.
#[must_use]
pub fn instance_key_for(scope: ZoneScope, seat: &str) -> SeatId {
    match scope {
        ZoneScope::Public => PUBLIC_OWNER.to_string(),
        ZoneScope::PerSeat => seat.to_string(),
    }
}

impl Default for OwnerToken {
    fn default() -> Self {
        Self::By
    }
}

impl From<String> for OwnerToken {
    fn from(token: String) -> Self {
        Self::parse(&token)
    }
}

impl From<&str> for OwnerToken {
    fn from(token: &str) -> Self {
        Self::parse(token)
    }
}

impl From<OwnerToken> for String {
    fn from(token: OwnerToken) -> Self {
        token.as_str().to_string()
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
