//! Worker lifecycle states.

use crate::error::{NetfirstError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an interceptor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Constructed, install not yet run.
    #[default]
    Parsed,
    /// Install in progress.
    Installing,
    /// Installed, waiting to activate.
    Installed,
    /// Activation (stale namespace cleanup) in progress.
    Activating,
    /// Active and intercepting fetches.
    Activated,
    /// Replaced or failed; never intercepts again.
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }

    /// Whether fetches are routed through the interceptor in this state.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }

    /// Validate a transition and return the new state.
    pub fn transition(self, to: WorkerState) -> Result<WorkerState> {
        if is_valid_transition(self, to) {
            Ok(to)
        } else {
            Err(NetfirstError::InvalidState {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_valid_transition(from: WorkerState, to: WorkerState) -> bool {
    use WorkerState::*;

    matches!(
        (from, to),
        (Parsed, Installing)
            | (Installing, Installed)
            | (Installing, Redundant)
            | (Installed, Activating)
            // Retrying after a failed cleanup
            | (Activating, Activating)
            | (Activating, Activated)
            | (Activating, Redundant)
            | (Activated, Redundant)
    )
}
