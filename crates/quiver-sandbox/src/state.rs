//! Sandbox lifecycle.
//!
//! ```text
//! Starting ──► Running ──► Completing ──┐
//!    │            ├──────► Cancelling ──┼──► Terminated
//!    │            └──────► TimedOut ────┘
//!    ├──► Cancelling (cancelled before spawn)
//!    └──► Terminated (spawn failure)
//! ```

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::error::{SandboxError, SandboxResult};

/// One state of a sandboxed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    /// Process being prepared.
    Starting,
    /// Process running.
    Running,
    /// Process exited on its own; output being collected.
    Completing,
    /// Host cancelled; cleanup in progress.
    Cancelling,
    /// Wall-clock limit hit; cleanup in progress.
    TimedOut,
    /// Done. The only terminal state.
    Terminated,
}

impl SandboxState {
    /// Whether `next` may follow this state.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Starting, Self::Running | Self::Cancelling | Self::Terminated)
                | (
                    Self::Running,
                    Self::Completing | Self::Cancelling | Self::TimedOut
                )
                | (
                    Self::Completing | Self::Cancelling | Self::TimedOut,
                    Self::Terminated
                )
        )
    }

    /// Whether this is the terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Terminated
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Completing => "completing",
            Self::Cancelling => "cancelling",
            Self::TimedOut => "timed_out",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Tracks the current state and every state visited.
#[derive(Debug, Clone)]
pub struct StateMachine {
    visited: Vec<SandboxState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// A machine in `Starting`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            visited: vec![SandboxState::Starting],
        }
    }

    /// Current state.
    #[must_use]
    pub fn current(&self) -> SandboxState {
        self.visited
            .last()
            .copied()
            .unwrap_or(SandboxState::Starting)
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::IllegalTransition`] and stays put when the
    /// lifecycle does not allow it.
    pub fn transition(&mut self, next: SandboxState) -> SandboxResult<()> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(SandboxError::IllegalTransition { from, to: next });
        }
        debug!(from = %from, to = %next, "sandbox state transition");
        self.visited.push(next);
        Ok(())
    }

    /// States visited so far, in order.
    #[must_use]
    pub fn visited(&self) -> &[SandboxState] {
        &self.visited
    }

    /// Consume the machine, returning the visited states.
    #[must_use]
    pub fn into_visited(self) -> Vec<SandboxState> {
        self.visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SandboxState::*;

    #[test]
    fn test_happy_path() {
        let mut sm = StateMachine::new();
        sm.transition(Running).unwrap();
        sm.transition(Completing).unwrap();
        sm.transition(Terminated).unwrap();
        assert_eq!(sm.visited(), &[Starting, Running, Completing, Terminated]);
        assert!(sm.current().is_terminal());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut sm = StateMachine::new();
        assert!(matches!(
            sm.transition(Completing),
            Err(SandboxError::IllegalTransition {
                from: Starting,
                to: Completing
            })
        ));
        assert_eq!(sm.current(), Starting);

        sm.transition(Running).unwrap();
        sm.transition(TimedOut).unwrap();
        assert!(sm.transition(Cancelling).is_err());
        sm.transition(Terminated).unwrap();
        for next in [Starting, Running, Completing, Cancelling, TimedOut, Terminated] {
            assert!(sm.transition(next).is_err());
        }
    }

    #[test]
    fn test_cancel_before_spawn() {
        let mut sm = StateMachine::new();
        sm.transition(Cancelling).unwrap();
        sm.transition(Terminated).unwrap();
        assert_eq!(sm.into_visited(), vec![Starting, Cancelling, Terminated]);
    }
}
