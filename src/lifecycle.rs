//! Entity lifecycle state machines.
//!
//! Every status-bearing entity (account, card, booking, ...) models its status
//! as an enum with an explicit successor table. Operations never assign a
//! status directly; they ask [`ensure_transition`] first, which rejects any
//! transition missing from the table, including re-requesting the current
//! state.

use std::fmt;

use crate::error::ToolError;

/// A finite status set with an allowed-transition table.
pub trait Lifecycle: Copy + Eq + fmt::Debug + 'static {
    /// Entity kind used in error messages.
    const ENTITY: &'static str;

    /// Wire name of this status.
    fn name(self) -> &'static str;

    /// Statuses reachable from this one in a single operation.
    fn successors(self) -> &'static [Self];

    /// Terminal statuses have no successors.
    fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    /// Returns true if `next` is listed as a successor.
    fn can_transition_to(self, next: Self) -> bool {
        self.successors().contains(&next)
    }
}

/// Fails unless `from -> to` is in the entity's transition table.
pub fn ensure_transition<S: Lifecycle>(id: &str, from: S, to: S) -> Result<(), ToolError> {
    if from.can_transition_to(to) {
        return Ok(());
    }
    Err(ToolError::InvalidTransition {
        kind: S::ENTITY,
        id: id.to_string(),
        from: from.name().to_string(),
        to: to.name().to_string(),
    })
}

/// Fails unless the entity is currently in `required`.
pub fn ensure_status<S: Lifecycle>(
    id: &str,
    current: S,
    required: S,
    reason: &str,
) -> Result<(), ToolError> {
    if current == required {
        return Ok(());
    }
    Err(ToolError::WrongState {
        kind: S::ENTITY,
        id: id.to_string(),
        state: current.name().to_string(),
        reason: reason.to_string(),
    })
}

/// Fails if the entity is in a terminal status.
pub fn ensure_not_terminal<S: Lifecycle>(id: &str, current: S) -> Result<(), ToolError> {
    if !current.is_terminal() {
        return Ok(());
    }
    Err(ToolError::WrongState {
        kind: S::ENTITY,
        id: id.to_string(),
        state: current.name().to_string(),
        reason: "no further changes are allowed".to_string(),
    })
}
