//! Node lifecycle states.
//!
//! Each node kind has a closed set of states. Every state-gated operation goes
//! through [`require`], so the check and its error are uniform.

use std::fmt;

use crate::error::{QueueError, Result};

/// A node lifecycle.
pub trait Lifecycle: Copy + Eq + fmt::Debug {
    /// Lower-case state name used in errors and logs.
    fn name(self) -> &'static str;
}

/// Client lifecycle: `Inactive -> Connected -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not yet connected
    Inactive,
    /// Linked to a parent
    Connected,
    /// Closed, cannot be reused
    Closed,
}

/// Server lifecycle: `Inactive -> Ready <-> Connected -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not yet bound
    Inactive,
    /// Bound, no peers
    Ready,
    /// Bound with at least one peer
    Connected,
    /// Closed, cannot be reused
    Closed,
}

impl Lifecycle for ClientState {
    fn name(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

impl Lifecycle for ServerState {
    fn name(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Ready => "ready",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fail with `StateMismatch` unless `state` is one of `allowed`.
pub(crate) fn require<S: Lifecycle>(
    state: S,
    allowed: &[S],
    operation: &'static str,
) -> Result<()> {
    if allowed.contains(&state) {
        Ok(())
    } else {
        Err(QueueError::StateMismatch { operation, state: state.name() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_state_passes() {
        assert!(require(ClientState::Connected, &[ClientState::Connected], "get").is_ok());
        assert!(
            require(ServerState::Ready, &[ServerState::Ready, ServerState::Connected], "accept")
                .is_ok()
        );
    }

    #[test]
    fn other_state_reports_operation_and_state() {
        let err = require(ServerState::Inactive, &[ServerState::Connected], "poll").unwrap_err();
        assert!(matches!(
            err,
            QueueError::StateMismatch { operation: "poll", state: "inactive" }
        ));
        assert_eq!(err.to_string(), "cannot poll while inactive");
    }
}
